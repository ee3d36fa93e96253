//! Serde adapters for timestamps stored as milliseconds since the unix epoch.
//!
//! Documents written by older tooling carry these values either as JSON
//! numbers or as numeric strings, and use `""` for "not set", so reading is
//! lenient while writing always produces an integer.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(timestamp.timestamp_millis())
}

/// An empty value reads as the epoch.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(parse(&value).map_err(D::Error::custom)?.unwrap_or_default())
}

pub mod option {
    use super::{parse, DateTime, Deserialize, Deserializer, Serializer, Utc, Value};
    use serde::de::Error as _;

    pub fn serialize<S: Serializer>(
        timestamp: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match timestamp {
            Some(timestamp) => serializer.serialize_i64(timestamp.timestamp_millis()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse(&value).map_err(D::Error::custom)
    }
}

/// Current time, truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[allow(clippy::cast_possible_truncation)]
fn parse(value: &Value) -> Result<Option<DateTime<Utc>>, String> {
    let millis = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected epoch milliseconds, got {s:?}"))?,
        Value::Number(n) => match n.as_i64() {
            Some(millis) => millis,
            None => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f as i64)
                .ok_or_else(|| format!("expected epoch milliseconds, got {n}"))?,
        },
        other => return Err(format!("expected epoch milliseconds, got {other}")),
    };

    DateTime::from_timestamp_millis(millis)
        .map(Some)
        .ok_or_else(|| format!("epoch milliseconds {millis} out of range"))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_numbers_numeric_strings_and_empty_values() {
        let expected = DateTime::from_timestamp_millis(1_700_000_000_123);

        assert_eq!(parse(&json!(1_700_000_000_123_i64)).unwrap(), expected);
        assert_eq!(parse(&json!("1700000000123")).unwrap(), expected);
        assert_eq!(parse(&json!("")).unwrap(), None);
        assert_eq!(parse(&Value::Null).unwrap(), None);
        assert!(parse(&json!(true)).is_err());
        assert!(parse(&json!("yesterday")).is_err());
    }
}
