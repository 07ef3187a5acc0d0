//! Persisted emotion records.

use chrono::{NaiveDateTime, ParseError, Timelike};
use serde::{Deserialize, Serialize};

/// Canonical stored timestamp format: fixed width, second resolution,
/// lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An emotion observation as written to the event store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    /// Store-assigned surrogate key; never used for ordering
    pub id: i64,
    pub label: String,
    pub confidence: f64,
    #[serde(with = "timestamp_serde")]
    pub observed_at: NaiveDateTime,
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmotionRecord {
    pub label: String,
    pub confidence: f64,
    pub observed_at: NaiveDateTime,
}

impl NewEmotionRecord {
    pub fn new(label: impl Into<String>, confidence: f64, observed_at: NaiveDateTime) -> Self {
        Self {
            label: label.into(),
            confidence,
            observed_at: truncate_to_second(observed_at),
        }
    }

    pub fn with_id(self, id: i64) -> EmotionRecord {
        EmotionRecord {
            id,
            label: self.label,
            confidence: self.confidence,
            observed_at: self.observed_at,
        }
    }
}

/// Drop sub-second precision so the value survives a store round trip unchanged.
pub fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Also accepts the ISO `T` separator and
/// fractional seconds, which externally written rows sometimes carry.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(truncate_to_second)
}

pub(crate) mod timestamp_serde {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod optional_timestamp_serde {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => serializer.serialize_some(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_timestamp(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
