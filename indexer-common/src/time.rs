//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

/// Convert a configured millisecond value to a duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format a filesystem timestamp as RFC 3339 UTC with millisecond precision
///
/// e.g. `2024-03-01T12:30:05.250Z`, the form the ingestion API stores.
pub fn to_rfc3339_millis(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}
