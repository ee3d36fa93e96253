//! Admission, ban and retention rules applied by reconciliation.
//!
//! Two rule sets are in use. They share the same merge skeleton and only
//! differ in the values below.
//!
//! | | low-rating intake | open intake |
//! |---|---|---|
//! | admission of new players | rating below 10000 | always |
//! | ban on admission | never | rating above 30000 |
//! | ban on update | rating moved by more than 1000 | same |
//! | `lastupdated` on update | always | only when not banned |
//! | pruning | inactive for over 7 days and rating below 10000 | none |

use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use serde::Deserialize;

use crate::models::{PlayerRecord, Rating};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyName {
    #[display(fmt = "low-rating-intake")]
    LowRatingIntake,
    #[display(fmt = "open-intake")]
    OpenIntake,
}

/// Decides what happens to a player the snapshot has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admit unbanned, but only below the given rating.
    Below(Rating),
    /// Admit everyone; those above `ban_above` start out banned.
    Always { ban_above: Rating },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Reject,
    Admit { banned: bool },
}

impl Admission {
    pub fn decide(self, rating: Rating) -> AdmissionDecision {
        match self {
            Self::Below(limit) if rating < limit => AdmissionDecision::Admit { banned: false },
            Self::Below(_) => AdmissionDecision::Reject,
            Self::Always { ban_above } => AdmissionDecision::Admit {
                banned: rating > ban_above,
            },
        }
    }
}

/// Whether an update that ends in a ban still refreshes `lastupdated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTouch {
    Always,
    UnlessBanned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pruning {
    pub retention: TimeDelta,
    /// Records at or above this rating are never evicted.
    pub contender_rating: Rating,
}

impl Pruning {
    pub fn evicts(&self, record: &PlayerRecord, now: DateTime<Utc>) -> bool {
        now - record.last_updated_at > self.retention && record.rating < self.contender_rating
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub name: PolicyName,
    pub admission: Admission,
    /// A single-cycle rating change strictly larger than this bans the player.
    pub ban_delta: u32,
    pub max_rating: Rating,
    pub update_touch: UpdateTouch,
    pub pruning: Option<Pruning>,
}

pub const BAN_DELTA: u32 = 1000;
pub const MAX_RATING: Rating = Rating::new(30000);
pub const CONTENDER_RATING: Rating = Rating::new(10000);
pub const RETENTION_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

impl Policy {
    pub fn low_rating_intake() -> Self {
        Self {
            name: PolicyName::LowRatingIntake,
            admission: Admission::Below(CONTENDER_RATING),
            ban_delta: BAN_DELTA,
            max_rating: MAX_RATING,
            update_touch: UpdateTouch::Always,
            pruning: Some(Pruning {
                retention: TimeDelta::milliseconds(RETENTION_MILLIS),
                contender_rating: CONTENDER_RATING,
            }),
        }
    }

    pub fn open_intake() -> Self {
        Self {
            name: PolicyName::OpenIntake,
            admission: Admission::Always {
                ban_above: MAX_RATING,
            },
            ban_delta: BAN_DELTA,
            max_rating: MAX_RATING,
            update_touch: UpdateTouch::UnlessBanned,
            pruning: None,
        }
    }

    pub fn is_anomalous_jump(&self, previous: Rating, current: Rating) -> bool {
        previous.abs_diff(current) > self.ban_delta
    }

    pub fn reaches_max_rating(&self, rating: Rating) -> bool {
        rating >= self.max_rating
    }
}

impl From<PolicyName> for Policy {
    fn from(name: PolicyName) -> Self {
        match name {
            PolicyName::LowRatingIntake => Self::low_rating_intake(),
            PolicyName::OpenIntake => Self::open_intake(),
        }
    }
}
