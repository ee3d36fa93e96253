use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encoded avatar blob as it appears in the live feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Into, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvatarRef(String);

impl AvatarRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Decoded avatar as returned by the enrichment service. Kept opaque.
#[derive(Debug, Clone, PartialEq, From, Into, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Avatar(Value);
