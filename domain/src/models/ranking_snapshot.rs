use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{PlayerIdentifier, PlayerRecord};
use crate::types::epoch_millis;

const RECORDS_KEY: &str = "records";
const LAST_REFRESH_KEY: &str = "last_refresh";

/// The full persisted ranking.
///
/// Records are kept in a sorted map so that the serialized document is stable
/// between cycles and store revisions only differ where players changed.
///
/// Two document layouts are read: the current one with a `records` object, and
/// the flat one written by earlier deployments where each record sits at the
/// top level next to `last_refresh`. Only the current layout is written.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RankingSnapshot {
    pub records: BTreeMap<PlayerIdentifier, PlayerRecord>,
    #[serde(
        rename = "last_refresh",
        with = "epoch_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_refresh_at: Option<DateTime<Utc>>,
}

impl RankingSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identifier: &PlayerIdentifier) -> Option<&PlayerRecord> {
        self.records.get(identifier)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NestedLayout {
    #[serde(default)]
    records: BTreeMap<PlayerIdentifier, PlayerRecord>,
    #[serde(rename = "last_refresh", default, with = "epoch_millis::option")]
    last_refresh_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct FlatLayout {
    #[serde(rename = "last_refresh", default, with = "epoch_millis::option")]
    last_refresh_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    records: BTreeMap<PlayerIdentifier, PlayerRecord>,
}

impl<'de> Deserialize<'de> for RankingSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(fields) = &value else {
            return Err(D::Error::custom(format!(
                "expected a snapshot object, found {value}"
            )));
        };

        let is_flat = !fields.contains_key(RECORDS_KEY)
            && fields.keys().any(|key| key != LAST_REFRESH_KEY);

        if is_flat {
            let flat = FlatLayout::deserialize(value).map_err(D::Error::custom)?;
            if let Some(mismatch) = flat
                .records
                .iter()
                .find(|(key, record)| **key != record.identifier)
            {
                return Err(D::Error::custom(format!(
                    "record stored under {} carries identifier {}",
                    mismatch.0, mismatch.1.identifier
                )));
            }
            Ok(Self {
                records: flat.records,
                last_refresh_at: flat.last_refresh_at,
            })
        } else {
            let nested = NestedLayout::deserialize(value).map_err(D::Error::custom)?;
            Ok(Self {
                records: nested.records,
                last_refresh_at: nested.last_refresh_at,
            })
        }
    }
}
