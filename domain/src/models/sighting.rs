use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Avatar, AvatarRef, PlayerIdentifier, Rating};
use crate::errors::{EnrichmentFailure, MalformedDataError};

/// Keys that reconciliation owns on a stored record. Copies of them arriving
/// from the feed are discarded instead of being passed through.
const RESERVED_RECORD_KEYS: [&str; 7] = [
    "fc",
    "ev",
    "mii",
    "banned",
    "ban_date",
    "first_max_vr",
    "lastupdated",
];

/// A player entry exactly as the live feed delivered it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSighting {
    #[serde(default)]
    pub fc: Option<Value>,
    #[serde(default)]
    pub ev: Option<Value>,
    #[serde(default)]
    pub mii: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A validated sighting whose avatar has not been resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub identifier: PlayerIdentifier,
    pub rating: Rating,
    pub avatar_ref: Option<AvatarRef>,
    pub extra: Map<String, Value>,
}

/// A validated sighting ready for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedSighting {
    pub identifier: PlayerIdentifier,
    pub rating: Rating,
    pub avatar: Option<Avatar>,
    pub extra: Map<String, Value>,
}

impl Sighting {
    /// Validates a raw sighting.
    ///
    /// Sightings without a rating carry nothing to reconcile and yield
    /// `Ok(None)`. Everything else must have a usable identifier and rating.
    pub fn try_from_raw(raw: RawSighting) -> Result<Option<Self>, MalformedDataError> {
        let rating = match raw.ev {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => Rating::try_from_value(&value)?,
        };

        let identifier = match raw.fc {
            None | Some(Value::Null) => return Err(MalformedDataError::MissingField("fc")),
            Some(Value::String(fc)) => PlayerIdentifier::from_string(&fc)?,
            Some(other) => return Err(MalformedDataError::InvalidIdentifier(other.to_string())),
        };

        let avatar_ref = match raw.mii {
            None | Some(Value::Null) => None,
            Some(mii) => avatar_ref_of(&mii)?,
        };

        let mut extra = raw.extra;
        extra.retain(|key, _| !RESERVED_RECORD_KEYS.contains(&key.as_str()));

        Ok(Some(Self {
            identifier,
            rating,
            avatar_ref,
            extra,
        }))
    }

    pub fn enrich(self, avatar: Option<Avatar>) -> EnrichedSighting {
        EnrichedSighting {
            identifier: self.identifier,
            rating: self.rating,
            avatar,
            extra: self.extra,
        }
    }
}

// The feed sends avatars as `[{ "data": "<encoded>", ... }, ...]`; only the
// first entry is meaningful.
fn avatar_ref_of(mii: &Value) -> Result<Option<AvatarRef>, MalformedDataError> {
    let Value::Array(entries) = mii else {
        return Err(MalformedDataError::InvalidAvatarReference(mii.to_string()));
    };

    match entries.first() {
        None => Ok(None),
        Some(entry) => match entry.get("data") {
            Some(Value::String(data)) if !data.is_empty() => Ok(Some(AvatarRef::from(data.clone()))),
            _ => Err(MalformedDataError::InvalidAvatarReference(entry.to_string())),
        },
    }
}

/// Avatar references of `sightings`, in order, skipping sightings without one.
pub fn avatar_refs(sightings: &[Sighting]) -> Vec<AvatarRef> {
    sightings
        .iter()
        .filter_map(|sighting| sighting.avatar_ref.clone())
        .collect()
}

/// Hands resolved avatars back to the sightings they were requested for.
///
/// `avatars` must correspond position by position to [`avatar_refs`] of the
/// same sightings. A batch of the wrong size is an enrichment failure, since
/// there is no way to tell which avatar belongs to whom.
pub fn attach_avatars(
    sightings: Vec<Sighting>,
    avatars: Vec<Avatar>,
) -> Result<Vec<EnrichedSighting>, EnrichmentFailure> {
    let expected = sightings.iter().filter(|s| s.avatar_ref.is_some()).count();
    if avatars.len() != expected {
        return Err(EnrichmentFailure::Incomplete {
            expected,
            received: avatars.len(),
        });
    }

    let mut avatars = avatars.into_iter();
    Ok(sightings
        .into_iter()
        .map(|sighting| {
            let avatar = sighting.avatar_ref.as_ref().and_then(|_| avatars.next());
            sighting.enrich(avatar)
        })
        .collect())
}
