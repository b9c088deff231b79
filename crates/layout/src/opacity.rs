use chrono::{DateTime, Utc};

/// Opacity of an article seen within the last [`FRESH_FOR_HOURS`].
pub const MAX_OPACITY: f32 = 0.8;
/// Opacity of an article not seen for [`FADED_AFTER_HOURS`] or more.
pub const MIN_OPACITY: f32 = 0.2;
pub const FRESH_FOR_HOURS: f64 = 1.0;
pub const FADED_AFTER_HOURS: f64 = 24.0;

/// Display opacity for an article last seen at `last_seen`.
///
/// Full strength for the first hour, fading linearly to the floor at 24 hours.
/// Timestamps in the future count as fresh.
///
/// ```
/// use chrono::{Duration, Utc};
/// use layout::recency_opacity;
///
/// let now = Utc::now();
/// assert_eq!(recency_opacity(now, now), 0.8);
/// assert_eq!(recency_opacity(now, now - Duration::hours(30)), 0.2);
/// ```
pub fn recency_opacity(now: DateTime<Utc>, last_seen: DateTime<Utc>) -> f32 {
    let hours_old = (now - last_seen).num_milliseconds() as f64 / 3_600_000.0;
    if hours_old <= FRESH_FOR_HOURS {
        MAX_OPACITY
    } else if hours_old >= FADED_AFTER_HOURS {
        MIN_OPACITY
    } else {
        let faded = (hours_old - FRESH_FOR_HOURS) / (FADED_AFTER_HOURS - FRESH_FOR_HOURS);
        (f64::from(MAX_OPACITY) - f64::from(MAX_OPACITY - MIN_OPACITY) * faded) as f32
    }
}
