//! UTC timestamps with millisecond precision.
//!
//! Documents and the record file both carry times as
//! `YYYY-MM-DDTHH:MM:SS.mmmZ`. Parsed instants are truncated to milliseconds so
//! that a value read from a document compares equal to the same value read
//! back from the record file.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use kbsync_core::{AppError, AppResult};

/// Output format of persisted timestamps.
const MILLIS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse an ISO-8601 timestamp as a UTC instant.
///
/// Accepts a trailing `Z`, an explicit offset, or no zone at all (read as UTC).
pub fn parse_utc(value: &str) -> AppResult<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc).trunc_subsecs(3));
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(naive, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().trunc_subsecs(3))
        .ok_or_else(|| {
            AppError::FrontMatter(format!("'{}' is not an ISO-8601 timestamp", value))
        })
}

/// Format an instant the way the record file stores it.
pub fn format_millis(value: &DateTime<Utc>) -> String {
    value.format(MILLIS_FORMAT).to_string()
}

/// Serde adapter for `DateTime<Utc>` fields in the record file.
pub mod millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_millis(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_utc(&raw).map_err(de::Error::custom)
    }
}
