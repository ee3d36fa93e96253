//! Merging a cycle's sightings into the stored ranking.
//!
//! Everything here is a pure function of its arguments; the caller supplies
//! `now` so that a cycle stamps every record with the same instant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{EnrichedSighting, PlayerIdentifier, PlayerRecord, RankingSnapshot};
use crate::policy::{AdmissionDecision, Policy, UpdateTouch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub admitted: usize,
    pub updated: usize,
    pub rejected: usize,
    pub skipped_frozen: usize,
    /// Records that became banned during this merge.
    pub banned: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub snapshot: RankingSnapshot,
    pub stats: MergeStats,
    pub evicted: Vec<PlayerIdentifier>,
}

/// Merges `sightings` into `old`.
///
/// Sightings are applied in order, so a player sighted twice in one cycle is
/// compared against the result of the first sighting.
pub fn merge(
    old: &RankingSnapshot,
    sightings: &[EnrichedSighting],
    policy: &Policy,
    now: DateTime<Utc>,
) -> RankingSnapshot {
    merge_counting(old, sightings, policy, now).0
}

/// Drops records the policy considers stale. Returns the retained snapshot and
/// the identifiers of the evicted records.
pub fn prune(
    snapshot: RankingSnapshot,
    policy: &Policy,
    now: DateTime<Utc>,
) -> (RankingSnapshot, Vec<PlayerIdentifier>) {
    let Some(pruning) = &policy.pruning else {
        return (snapshot, Vec::new());
    };

    let (evicted, records): (BTreeMap<_, _>, BTreeMap<_, _>) = snapshot
        .records
        .into_iter()
        .partition(|(_, record)| pruning.evicts(record, now));

    (
        RankingSnapshot {
            records,
            last_refresh_at: snapshot.last_refresh_at,
        },
        evicted.into_keys().collect(),
    )
}

/// Merge, then prune, then stamp the refresh time.
pub fn reconcile(
    old: &RankingSnapshot,
    sightings: &[EnrichedSighting],
    policy: &Policy,
    now: DateTime<Utc>,
) -> Reconciliation {
    let (merged, stats) = merge_counting(old, sightings, policy, now);
    let (mut snapshot, evicted) = prune(merged, policy, now);
    snapshot.last_refresh_at = Some(now);

    Reconciliation {
        snapshot,
        stats,
        evicted,
    }
}

fn merge_counting(
    old: &RankingSnapshot,
    sightings: &[EnrichedSighting],
    policy: &Policy,
    now: DateTime<Utc>,
) -> (RankingSnapshot, MergeStats) {
    let mut records = old.records.clone();
    let mut stats = MergeStats::default();

    for sighting in sightings {
        let next = match records.get(&sighting.identifier) {
            Some(existing) if existing.is_frozen() => {
                stats.skipped_frozen += 1;
                None
            }
            Some(existing) => {
                stats.updated += 1;
                Some(updated_record(existing, sighting, policy, now))
            }
            None => match policy.admission.decide(sighting.rating) {
                AdmissionDecision::Admit { banned } => {
                    stats.admitted += 1;
                    Some(admitted_record(sighting, banned, policy, now))
                }
                AdmissionDecision::Reject => {
                    stats.rejected += 1;
                    None
                }
            },
        };

        if let Some(record) = next {
            if record.banned {
                stats.banned += 1;
            }
            records.insert(record.identifier.clone(), record);
        }
    }

    (
        RankingSnapshot {
            records,
            last_refresh_at: old.last_refresh_at,
        },
        stats,
    )
}

fn updated_record(
    existing: &PlayerRecord,
    sighting: &EnrichedSighting,
    policy: &Policy,
    now: DateTime<Utc>,
) -> PlayerRecord {
    let banned = policy.is_anomalous_jump(existing.rating, sighting.rating);

    // never move lastupdated backwards, even if the clock does
    let touched = existing.last_updated_at.max(now);
    let last_updated_at = match policy.update_touch {
        UpdateTouch::UnlessBanned if banned => existing.last_updated_at,
        UpdateTouch::Always | UpdateTouch::UnlessBanned => touched,
    };

    PlayerRecord {
        identifier: sighting.identifier.clone(),
        rating: sighting.rating,
        banned,
        ban_date: banned.then_some(now),
        first_max_rating_at: existing
            .first_max_rating_at
            .or_else(|| policy.reaches_max_rating(sighting.rating).then_some(now)),
        last_updated_at,
        avatar: sighting.avatar.clone().or_else(|| existing.avatar.clone()),
        extra: sighting.extra.clone(),
    }
}

fn admitted_record(
    sighting: &EnrichedSighting,
    banned: bool,
    policy: &Policy,
    now: DateTime<Utc>,
) -> PlayerRecord {
    PlayerRecord {
        identifier: sighting.identifier.clone(),
        rating: sighting.rating,
        banned,
        ban_date: banned.then_some(now),
        first_max_rating_at: policy.reaches_max_rating(sighting.rating).then_some(now),
        last_updated_at: now,
        avatar: sighting.avatar.clone(),
        extra: sighting.extra.clone(),
    }
}
