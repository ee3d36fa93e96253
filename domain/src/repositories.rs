mod avatar_enrichment_repository;
mod live_feed_repository;
mod ranking_snapshot_repository;

pub use avatar_enrichment_repository::AvatarEnrichmentRepository;
pub use live_feed_repository::LiveFeedRepository;
pub use ranking_snapshot_repository::RankingSnapshotRepository;
