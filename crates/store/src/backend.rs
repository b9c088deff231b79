use crate::StoreError;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Logical tables held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Article records keyed by article id.
    Articles,
    /// Enriched cluster mappings keyed by `hours:min_similarity`.
    ClusterCache,
    /// Projection point lists keyed by `hours:min_similarity`.
    ProjectionCache,
    /// Empty values keyed by `{last_seen_at_millis:020}:{id}` for every article
    /// that carries an embedding. Lets recency reads range-scan instead of
    /// decoding the whole article table.
    ArticlesBySeen,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Articles,
        Table::ClusterCache,
        Table::ProjectionCache,
        Table::ArticlesBySeen,
    ];

    /// Name of the table in persistent backends.
    pub fn name(self) -> &'static str {
        match self {
            Table::Articles => "news_items",
            Table::ClusterCache => "news_clusters",
            Table::ProjectionCache => "news_umap",
            Table::ArticlesBySeen => "news_items_by_seen",
        }
    }
}

/// One mutation inside a [`StoreBackend::write_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Table, String, Vec<u8>),
    Delete(Table, String),
}

impl WriteOp {
    fn table(&self) -> Table {
        match self {
            WriteOp::Put(table, _, _) | WriteOp::Delete(table, _) => *table,
        }
    }
}

/// Trait for a key-value storage backend for the store.
/// This allows for different storage implementations (e.g., in-memory, Redb).
pub trait StoreBackend: Send + Sync {
    /// Retrieve a value by key.
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Insert or update a key-value pair.
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.write_batch(vec![WriteOp::Put(table, key.to_string(), value.to_vec())])
    }
    /// Delete a key-value pair.
    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.write_batch(vec![WriteOp::Delete(table, key.to_string())])
    }
    /// Apply the operations in order. Either every operation lands or none does.
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
    /// Insert or update multiple key-value pairs in one batch.
    fn batch_put(&self, entries: Vec<(Table, String, Vec<u8>)>) -> Result<(), StoreError> {
        self.write_batch(
            entries
                .into_iter()
                .map(|(table, key, value)| WriteOp::Put(table, key, value))
                .collect(),
        )
    }
    /// Visit the keys of `table` that sort at or after `from`, largest first.
    /// Stops early when the visitor returns `false`.
    fn keys_desc_from(
        &self,
        table: Table,
        from: &str,
        visitor: &mut dyn FnMut(&str) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (pure Rust, on disk)
/// let config = BackendConfig::redb("/data/newsmap.redb");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Use Redb for storage. The `path` is the file path for the database.
    ///
    /// Requires the `backend-redb` feature (enabled by default).
    Redb { path: String },
    /// Use an in-memory map for storage. Contents vanish with the process.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend based on the configuration.
    pub fn build(&self) -> Result<Box<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

type TableMap = HashMap<Table, BTreeMap<String, Vec<u8>>>;

/// An in-memory backend using a `RwLock` around one ordered map per table.
pub struct InMemoryBackend {
    tables: RwLock<TableMap>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for InMemoryBackend {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(&table).and_then(|rows| rows.get(key)).cloned())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        // One write lock for the whole batch, so readers never observe half of it.
        let mut guard = self
            .tables
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for op in ops {
            let rows = guard.entry(op.table()).or_default();
            match op {
                WriteOp::Put(_, key, value) => {
                    rows.insert(key, value);
                }
                WriteOp::Delete(_, key) => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn keys_desc_from(
        &self,
        table: Table,
        from: &str,
        visitor: &mut dyn FnMut(&str) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        if let Some(rows) = guard.get(&table) {
            for key in rows.range::<str, _>((std::ops::Bound::Included(from), std::ops::Bound::Unbounded)).rev().map(|(key, _)| key) {
                if !visitor(key)? {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// The Redb backend implementation.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;
