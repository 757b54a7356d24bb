//! Timestamp formatting helpers.

use chrono::{TimeZone, Utc};

/// Format a unix timestamp as the `YYYYMMDD-HHMMSS` (UTC) fragment used
/// in conflict copy names.
pub fn format_conflict_stamp(modification_s: i64) -> String {
    Utc.timestamp(modification_s, 0)
        .format("%Y%m%d-%H%M%S")
        .to_string()
}
