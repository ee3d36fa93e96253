use chrono::{DateTime, Utc};
use derive_more::{Display, From, Into};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::Avatar;
use crate::errors::MalformedDataError;
use crate::types::epoch_millis;

/// Stable player key (the friend code in the live feed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerIdentifier(String);

impl PlayerIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_string(str: &str) -> Result<Self, MalformedDataError> {
        if str.is_empty() {
            Err(MalformedDataError::MissingField("fc"))
        } else if !str.is_ascii() || str.chars().any(|c| c.is_ascii_whitespace() || c.is_ascii_control())
        {
            Err(MalformedDataError::InvalidIdentifier(str.to_owned()))
        } else {
            Ok(Self(str.to_owned()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into, Serialize)]
#[serde(transparent)]
pub struct Rating(u32);

impl Rating {
    /// Ratings above this are rejected as garbage rather than treated as
    /// suspicious values.
    pub const UPPER_BOUND: Self = Self(1_000_000);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn abs_diff(self, other: Self) -> u32 {
        self.0.abs_diff(other.0)
    }

    /// Reads a rating the way the live feed sends it: a JSON integer or a
    /// numeric string.
    pub fn try_from_value(value: &Value) -> Result<Self, MalformedDataError> {
        let invalid = || MalformedDataError::InvalidRating(value.to_string());

        u32::try_from(parse_non_negative(value).ok_or_else(invalid)?)
            .ok()
            .map(Self)
            .filter(|rating| *rating <= Self::UPPER_BOUND)
            .ok_or_else(invalid)
    }
}

fn parse_non_negative(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

// Stored records went through validation when they were admitted, so reading
// them back only requires a non-negative integer. Out-of-range values saturate
// instead of failing the whole document.
impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse_non_negative(&value)
            .map(|raw| Self(u32::try_from(raw).unwrap_or(u32::MAX)))
            .ok_or_else(|| D::Error::custom(MalformedDataError::InvalidRating(value.to_string())))
    }
}

/// One entry of the stored ranking.
///
/// Field names follow the live feed's vocabulary so that the stored document
/// stays readable by consumers of the feed. Fields the feed sends that are not
/// interpreted here are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "fc")]
    pub identifier: PlayerIdentifier,
    #[serde(rename = "ev")]
    pub rating: Rating,
    #[serde(default)]
    pub banned: bool,
    #[serde(
        default,
        with = "epoch_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ban_date: Option<DateTime<Utc>>,
    #[serde(
        rename = "first_max_vr",
        default,
        with = "epoch_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_max_rating_at: Option<DateTime<Utc>>,
    /// A record without a usable `lastupdated` reads as last seen at the
    /// epoch, which makes it eligible for pruning.
    #[serde(rename = "lastupdated", default, with = "epoch_millis")]
    pub last_updated_at: DateTime<Utc>,
    #[serde(rename = "mii", default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Avatar>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerRecord {
    /// Banned records are frozen: reconciliation never touches them again.
    pub const fn is_frozen(&self) -> bool {
        self.banned
    }
}
