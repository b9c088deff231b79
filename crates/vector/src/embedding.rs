//! Typed embedding decode.
//!
//! The embedding column arrives in whatever shape the crawler or the database
//! driver produced: a JSON array of numbers, or pgvector's text form
//! (`"[0.1,0.2,...]"`). [`Embedding::decode`] is the only place that looks at
//! that shape. It either yields a finite `f32` vector of exactly the expected
//! dimension or a [`DecodeError`] saying what was wrong.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a raw embedding was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported embedding kind: {kind}")]
    UnsupportedKind { kind: &'static str },
    #[error("element {index} is not numeric")]
    NonNumeric { index: usize },
    #[error("element {index} is not finite")]
    NonFinite { index: usize },
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// A validated, fixed-length embedding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Decode a raw embedding column into a vector of `dimensions` finite floats.
    ///
    /// # Example
    /// ```
    /// use vector::Embedding;
    /// use serde_json::json;
    ///
    /// let e = Embedding::decode(&json!([0.5, -0.25, 1]), 3).unwrap();
    /// assert_eq!(e.as_slice(), &[0.5, -0.25, 1.0]);
    ///
    /// let e = Embedding::decode(&json!("[0.5,-0.25,1]"), 3).unwrap();
    /// assert_eq!(e.dimension(), 3);
    ///
    /// assert!(Embedding::decode(&json!([0.5, "x", 1]), 3).is_err());
    /// ```
    pub fn decode(raw: &Value, dimensions: usize) -> Result<Self, DecodeError> {
        let values = match raw {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.as_f64()
                        .map(|v| v as f32)
                        .ok_or(DecodeError::NonNumeric { index })
                })
                .collect::<Result<Vec<f32>, _>>()?,
            Value::String(text) => parse_vector_literal(text)?,
            Value::Null => return Err(DecodeError::UnsupportedKind { kind: "null" }),
            Value::Bool(_) => return Err(DecodeError::UnsupportedKind { kind: "bool" }),
            Value::Number(_) => return Err(DecodeError::UnsupportedKind { kind: "number" }),
            Value::Object(_) => return Err(DecodeError::UnsupportedKind { kind: "object" }),
        };
        Self::from_vec(values, dimensions)
    }

    /// Validate an already numeric vector.
    pub fn from_vec(values: Vec<f32>, dimensions: usize) -> Result<Self, DecodeError> {
        if values.len() != dimensions {
            return Err(DecodeError::DimensionMismatch {
                expected: dimensions,
                got: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DecodeError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Parse pgvector's text representation: `[1,2.5,-3]`.
fn parse_vector_literal(text: &str) -> Result<Vec<f32>, DecodeError> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or(DecodeError::UnsupportedKind { kind: "string" })?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .enumerate()
        .map(|(index, part)| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| DecodeError::NonNumeric { index })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_wrong_length() {
        let err = Embedding::decode(&json!([1.0, 2.0]), 3).unwrap_err();
        assert_eq!(
            err,
            DecodeError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        );
        let err = Embedding::decode(&json!("[]"), 3).unwrap_err();
        assert!(matches!(err, DecodeError::DimensionMismatch { got: 0, .. }));
    }

    #[test]
    fn rejects_non_numeric_elements() {
        let err = Embedding::decode(&json!([1.0, null, 2.0]), 3).unwrap_err();
        assert_eq!(err, DecodeError::NonNumeric { index: 1 });
        let err = Embedding::decode(&json!("[1.0, abc, 2.0]"), 3).unwrap_err();
        assert_eq!(err, DecodeError::NonNumeric { index: 1 });
    }

    #[test]
    fn rejects_other_json_kinds() {
        for (raw, kind) in [
            (json!(null), "null"),
            (json!(true), "bool"),
            (json!(1.5), "number"),
            (json!({"v": [1, 2, 3]}), "object"),
            (json!("1,2,3"), "string"),
        ] {
            assert_eq!(
                Embedding::decode(&raw, 3).unwrap_err(),
                DecodeError::UnsupportedKind { kind }
            );
        }
    }

    #[test]
    fn rejects_values_outside_f32() {
        let err = Embedding::decode(&json!([1.0, 1e300, 2.0]), 3).unwrap_err();
        assert_eq!(err, DecodeError::NonFinite { index: 1 });
        let err = Embedding::from_vec(vec![0.0, f32::NAN], 2).unwrap_err();
        assert_eq!(err, DecodeError::NonFinite { index: 1 });
    }

    #[test]
    fn accepts_integers_and_vector_literals() {
        let e = Embedding::decode(&json!([1, 0, -1]), 3).unwrap();
        assert_eq!(e.as_slice(), &[1.0, 0.0, -1.0]);
        let e = Embedding::decode(&json!(" [0.25, 0.5 ,0.75] "), 3).unwrap();
        assert_eq!(e.into_inner(), vec![0.25, 0.5, 0.75]);
    }
}
