//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Get current UTC timestamp, truncated to milliseconds
///
/// Recorded timestamps round-trip through [`to_iso`] text, which keeps
/// milliseconds only.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Format a timestamp as ISO-8601 with millisecond precision and a `Z` suffix
/// (`2024-05-01T12:30:00.250Z`).
pub fn to_iso(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter writing timestamps as [`to_iso`] text.
///
/// Parsing accepts any RFC 3339 timestamp and truncates it to milliseconds,
/// so a stored value and a re-sent copy of it always compare equal.
pub mod iso_millis {
    use chrono::{DateTime, SubsecRound, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(3))
            .map_err(|e| D::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}
