use chrono::{DateTime, Utc};
use derive_more::Display;
use domain::errors::{ConflictError, EnrichmentFailure, WriteSnapshotError};
use domain::models::{attach_avatars, avatar_refs, RawSighting, Sighting};
use domain::policy::Policy;
use domain::reconciliation::{reconcile, MergeStats, Reconciliation};
use domain::repositories::{
    AvatarEnrichmentRepository, LiveFeedRepository, RankingSnapshotRepository,
};
use domain::types::Versioned;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CycleStage {
    #[display(fmt = "read the snapshot")]
    ReadSnapshot,
    #[display(fmt = "fetch the live feed")]
    FetchLiveFeed,
    #[display(fmt = "write the snapshot")]
    WriteSnapshot,
}

/// Why a cycle ended without persisting anything.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to {stage}")]
    Fetch {
        stage: CycleStage,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub unrated: usize,
    pub malformed: usize,
    pub merge: MergeStats,
    pub evicted: usize,
    pub records: usize,
}

/// One read → fetch → enrich → reconcile → write pass.
///
/// Holds no state between passes: the snapshot and its version token are read
/// fresh every time and handed back to the store unchanged.
pub struct RefreshCycle<'a, Store, Feed, Enrichment> {
    store: &'a Store,
    feed: &'a Feed,
    enrichment: &'a Enrichment,
    policy: Policy,
}

impl<'a, Store, Feed, Enrichment> RefreshCycle<'a, Store, Feed, Enrichment>
where
    Store: RankingSnapshotRepository + Sync,
    Feed: LiveFeedRepository + Sync,
    Enrichment: AvatarEnrichmentRepository + Sync,
{
    pub fn new(
        store: &'a Store,
        feed: &'a Feed,
        enrichment: &'a Enrichment,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            feed,
            enrichment,
            policy,
        }
    }

    #[tracing::instrument(skip(self), fields(policy = %self.policy.name))]
    pub async fn execute_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let Versioned {
            data: old_snapshot,
            version,
        } = self
            .store
            .read_snapshot()
            .await
            .map_err(|source| CycleError::Fetch {
                stage: CycleStage::ReadSnapshot,
                source,
            })?;

        let raw_sightings = self
            .feed
            .fetch_sightings()
            .await
            .map_err(|source| CycleError::Fetch {
                stage: CycleStage::FetchLiveFeed,
                source,
            })?;
        let fetched = raw_sightings.len();
        let Validated {
            sightings,
            unrated,
            malformed,
        } = validate(raw_sightings);

        let avatars = self
            .enrichment
            .resolve_avatars(avatar_refs(&sightings))
            .await?;
        let sightings = attach_avatars(sightings, avatars)?;

        let Reconciliation {
            snapshot,
            stats,
            evicted,
        } = reconcile(&old_snapshot, &sightings, &self.policy, now);
        let records = snapshot.len();

        self.store
            .write_snapshot(Versioned {
                data: snapshot,
                version,
            })
            .await
            .map_err(|e| match e {
                WriteSnapshotError::Conflict(conflict) => CycleError::Conflict(conflict),
                WriteSnapshotError::Other(source) => CycleError::Fetch {
                    stage: CycleStage::WriteSnapshot,
                    source,
                },
            })?;

        let report = CycleReport {
            fetched,
            unrated,
            malformed,
            merge: stats,
            evicted: evicted.len(),
            records,
        };
        tracing::info!(?report, "refresh cycle committed");

        Ok(report)
    }
}

struct Validated {
    sightings: Vec<Sighting>,
    unrated: usize,
    malformed: usize,
}

fn validate(raw_sightings: Vec<RawSighting>) -> Validated {
    let mut validated = Validated {
        sightings: Vec::with_capacity(raw_sightings.len()),
        unrated: 0,
        malformed: 0,
    };

    for raw in raw_sightings {
        match Sighting::try_from_raw(raw) {
            Ok(Some(sighting)) => validated.sightings.push(sighting),
            Ok(None) => validated.unrated += 1,
            Err(e) => {
                tracing::warn!("dropping malformed sighting: {e}");
                validated.malformed += 1;
            }
        }
    }

    validated
}

#[cfg(test)]
mod test {
    use super::*;
    use domain::models::{
        Avatar, AvatarRef, PlayerIdentifier, PlayerRecord, RankingSnapshot, Rating,
    };
    use domain::types::VersionToken;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    const T0: i64 = 1_700_000_000_000;
    const NOW: i64 = T0 + 180_000;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn id(fc: &str) -> PlayerIdentifier {
        PlayerIdentifier::from_string(fc).unwrap()
    }

    struct StoredState {
        snapshot: RankingSnapshot,
        revision: u64,
        writes: usize,
    }

    /// Versioned in-memory store. `edited_concurrently` makes every read be
    /// followed by a foreign write, so the next write based on it is stale.
    struct InMemoryStore {
        state: Mutex<StoredState>,
        edited_concurrently: bool,
        unreachable: bool,
    }

    impl InMemoryStore {
        fn with(records: impl IntoIterator<Item = PlayerRecord>) -> Self {
            Self {
                state: Mutex::new(StoredState {
                    snapshot: RankingSnapshot {
                        records: records
                            .into_iter()
                            .map(|record| (record.identifier.clone(), record))
                            .collect(),
                        last_refresh_at: Some(at(T0)),
                    },
                    revision: 1,
                    writes: 0,
                }),
                edited_concurrently: false,
                unreachable: false,
            }
        }

        fn snapshot(&self) -> RankingSnapshot {
            self.state.lock().unwrap().snapshot.clone()
        }

        fn writes(&self) -> usize {
            self.state.lock().unwrap().writes
        }
    }

    #[async_trait::async_trait]
    impl RankingSnapshotRepository for InMemoryStore {
        async fn read_snapshot(&self) -> anyhow::Result<Versioned<RankingSnapshot>> {
            if self.unreachable {
                anyhow::bail!("store unreachable");
            }

            let mut state = self.state.lock().unwrap();
            let read = Versioned {
                data: state.snapshot.clone(),
                version: Some(VersionToken::from(state.revision.to_string())),
            };
            if self.edited_concurrently {
                state.revision += 1;
            }
            Ok(read)
        }

        async fn write_snapshot(
            &self,
            snapshot: Versioned<RankingSnapshot>,
        ) -> Result<(), WriteSnapshotError> {
            let mut state = self.state.lock().unwrap();
            if snapshot.version != Some(VersionToken::from(state.revision.to_string())) {
                return Err(ConflictError {
                    attempted: snapshot.version,
                }
                .into());
            }

            state.snapshot = snapshot.data;
            state.revision += 1;
            state.writes += 1;
            Ok(())
        }
    }

    struct StaticFeed(anyhow::Result<Vec<Value>>);

    #[async_trait::async_trait]
    impl LiveFeedRepository for StaticFeed {
        async fn fetch_sightings(&self) -> anyhow::Result<Vec<RawSighting>> {
            match &self.0 {
                Ok(players) => Ok(players
                    .iter()
                    .map(|player| serde_json::from_value(player.clone()).unwrap())
                    .collect()),
                Err(e) => anyhow::bail!("feed down: {e}"),
            }
        }
    }

    struct DecodingEnrichment {
        fails: bool,
        requests: Mutex<Vec<Vec<AvatarRef>>>,
    }

    impl DecodingEnrichment {
        fn working() -> Self {
            Self {
                fails: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fails: true,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl AvatarEnrichmentRepository for DecodingEnrichment {
        async fn resolve_avatars(
            &self,
            references: Vec<AvatarRef>,
        ) -> Result<Vec<Avatar>, EnrichmentFailure> {
            self.requests.lock().unwrap().push(references.clone());
            if self.fails {
                return Err(EnrichmentFailure::Rejected {
                    status: 502,
                    message: "bad gateway".into(),
                });
            }

            Ok(references
                .iter()
                .map(|reference| Avatar::from(json!({ "decoded": reference.as_str() })))
                .collect())
        }
    }

    fn record(fc: &str, rating: u32) -> PlayerRecord {
        PlayerRecord {
            identifier: id(fc),
            rating: Rating::new(rating),
            banned: false,
            ban_date: None,
            first_max_rating_at: None,
            last_updated_at: at(T0),
            avatar: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn large_rating_jump_is_banned_and_committed() {
        let feed = StaticFeed(Ok(vec![json!({ "fc": "A", "ev": "2000" })]));
        let enrichment = DecodingEnrichment::working();

        for policy in [Policy::low_rating_intake(), Policy::open_intake()] {
            let store = InMemoryStore::with([record("A", 100)]);
            let cycle = RefreshCycle::new(&store, &feed, &enrichment, policy);

            cycle.execute_cycle(at(NOW)).await.unwrap();

            let snapshot = store.snapshot();
            let a = snapshot.get(&id("A")).unwrap();
            assert_eq!(a.rating, Rating::new(2000));
            assert!(a.banned);
            assert_eq!(a.ban_date, Some(at(NOW)));
            assert_eq!(snapshot.last_refresh_at, Some(at(NOW)));
            assert_eq!(store.writes(), 1);
        }
    }

    #[tokio::test]
    async fn malformed_and_unrated_sightings_are_dropped() {
        let store = InMemoryStore::with([]);
        let feed = StaticFeed(Ok(vec![
            json!({ "fc": "A", "ev": "5000" }),
            json!({ "ev": "5000" }),
            json!({ "fc": "C", "ev": "not a number" }),
            json!({ "fc": "D" }),
        ]));
        let enrichment = DecodingEnrichment::working();
        let cycle = RefreshCycle::new(&store, &feed, &enrichment, Policy::low_rating_intake());

        let report = cycle.execute_cycle(at(NOW)).await.unwrap();

        assert_eq!(report.fetched, 4);
        assert_eq!(report.malformed, 2);
        assert_eq!(report.unrated, 1);
        assert_eq!(report.merge.admitted, 1);
        assert_eq!(report.records, 1);
        assert!(store.snapshot().get(&id("A")).is_some());
    }

    #[tokio::test]
    async fn avatars_are_resolved_in_one_batch_and_stored() {
        let store = InMemoryStore::with([]);
        let feed = StaticFeed(Ok(vec![
            json!({ "fc": "A", "ev": 100, "mii": [{ "data": "blob-a" }] }),
            json!({ "fc": "B", "ev": 200 }),
            json!({ "fc": "C", "ev": 300, "mii": [{ "data": "blob-c" }] }),
        ]));
        let enrichment = DecodingEnrichment::working();
        let cycle = RefreshCycle::new(&store, &feed, &enrichment, Policy::open_intake());

        cycle.execute_cycle(at(NOW)).await.unwrap();

        assert_eq!(
            *enrichment.requests.lock().unwrap(),
            vec![vec![
                AvatarRef::from("blob-a".to_owned()),
                AvatarRef::from("blob-c".to_owned())
            ]]
        );
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.get(&id("A")).unwrap().avatar,
            Some(Avatar::from(json!({ "decoded": "blob-a" })))
        );
        assert_eq!(snapshot.get(&id("B")).unwrap().avatar, None);
        assert_eq!(
            snapshot.get(&id("C")).unwrap().avatar,
            Some(Avatar::from(json!({ "decoded": "blob-c" })))
        );
    }

    #[tokio::test]
    async fn enrichment_failure_aborts_without_writing() {
        let store = InMemoryStore::with([record("A", 100)]);
        let feed = StaticFeed(Ok(vec![
            json!({ "fc": "A", "ev": 150, "mii": [{ "data": "blob-a" }] }),
        ]));
        let enrichment = DecodingEnrichment::failing();
        let cycle = RefreshCycle::new(&store, &feed, &enrichment, Policy::low_rating_intake());

        let result = cycle.execute_cycle(at(NOW)).await;

        assert!(matches!(result, Err(CycleError::Enrichment(_))));
        assert_eq!(store.writes(), 0);
        assert_eq!(store.snapshot().get(&id("A")).unwrap().rating, Rating::new(100));
    }

    #[tokio::test]
    async fn collaborator_failures_abort_the_cycle() {
        let enrichment = DecodingEnrichment::working();

        let store = InMemoryStore::with([record("A", 100)]);
        let feed = StaticFeed(Err(anyhow::anyhow!("503")));
        let cycle = RefreshCycle::new(&store, &feed, &enrichment, Policy::low_rating_intake());
        assert!(matches!(
            cycle.execute_cycle(at(NOW)).await,
            Err(CycleError::Fetch {
                stage: CycleStage::FetchLiveFeed,
                ..
            })
        ));
        assert_eq!(store.writes(), 0);

        let mut store = InMemoryStore::with([record("A", 100)]);
        store.unreachable = true;
        let feed = StaticFeed(Ok(vec![json!({ "fc": "A", "ev": 150 })]));
        let cycle = RefreshCycle::new(&store, &feed, &enrichment, Policy::low_rating_intake());
        assert!(matches!(
            cycle.execute_cycle(at(NOW)).await,
            Err(CycleError::Fetch {
                stage: CycleStage::ReadSnapshot,
                ..
            })
        ));
        assert!(enrichment.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_version_token_is_a_conflict_and_leaves_store_unchanged() {
        let mut store = InMemoryStore::with([record("A", 100)]);
        store.edited_concurrently = true;
        let before = store.snapshot();
        let feed = StaticFeed(Ok(vec![json!({ "fc": "A", "ev": 150 })]));
        let enrichment = DecodingEnrichment::working();

        {
            let cycle =
                RefreshCycle::new(&store, &feed, &enrichment, Policy::low_rating_intake());
            let result = cycle.execute_cycle(at(NOW)).await;

            assert!(matches!(result, Err(CycleError::Conflict(_))));
            assert_eq!(store.snapshot(), before);
            assert_eq!(store.writes(), 0);
        }

        // the next cycle reads the new revision and goes through
        store.edited_concurrently = false;
        let cycle = RefreshCycle::new(&store, &feed, &enrichment, Policy::low_rating_intake());
        cycle.execute_cycle(at(NOW)).await.unwrap();
        assert_eq!(store.snapshot().get(&id("A")).unwrap().rating, Rating::new(150));
    }
}
