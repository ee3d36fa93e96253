use thiserror::Error;

use crate::types::VersionToken;

/// A sighting that cannot be turned into a player record.
///
/// These are dropped one by one; they never abort a refresh cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedDataError {
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("{0:?} is not a valid player identifier")]
    InvalidIdentifier(String),
    #[error("{0} is not a non-negative integer rating within bounds")]
    InvalidRating(String),
    #[error("{0} is not a valid avatar reference")]
    InvalidAvatarReference(String),
}

/// The store refused a write because its current revision differs from the
/// one the write was based on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("snapshot store rejected write based on revision {}", revision_label(.attempted))]
pub struct ConflictError {
    pub attempted: Option<VersionToken>,
}

fn revision_label(version: &Option<VersionToken>) -> &str {
    version.as_ref().map_or("<none>", VersionToken::as_str)
}

#[derive(Debug, Error)]
pub enum WriteSnapshotError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The avatar batch could not be resolved as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnrichmentFailure {
    #[error("avatar enrichment transport error: {0}")]
    Transport(String),
    #[error("avatar enrichment rejected the batch ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("avatar enrichment response could not be parsed: {0}")]
    Parse(String),
    #[error("avatar enrichment resolved {received} of {expected} avatars")]
    Incomplete { expected: usize, received: usize },
}
