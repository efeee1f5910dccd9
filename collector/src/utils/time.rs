//! Time utility functions

use chrono::{DateTime, Utc};

/// Convert a systemd realtime stamp (microseconds since Unix epoch) to DateTime<Utc>.
///
/// systemd reports 0 for "never"; that and out-of-range values give `None`.
pub fn usec_to_datetime(usec: u64) -> Option<DateTime<Utc>> {
    if usec == 0 {
        return None;
    }
    let micros = i64::try_from(usec).ok()?;
    let dt = DateTime::from_timestamp_micros(micros);
    if dt.is_none() {
        tracing::warn!(usec, "Invalid bus timestamp, ignoring");
    }
    dt
}
