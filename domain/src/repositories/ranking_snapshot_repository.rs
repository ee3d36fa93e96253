use crate::errors::WriteSnapshotError;
use crate::models::RankingSnapshot;
use crate::types::Versioned;

#[async_trait::async_trait]
pub trait RankingSnapshotRepository {
    /// Reads the current snapshot along with the revision it was read at.
    async fn read_snapshot(&self) -> anyhow::Result<Versioned<RankingSnapshot>>;

    /// Replaces the stored snapshot, provided the store is still at
    /// `snapshot.version`. Otherwise nothing is written and
    /// [`WriteSnapshotError::Conflict`] is returned.
    async fn write_snapshot(
        &self,
        snapshot: Versioned<RankingSnapshot>,
    ) -> Result<(), WriteSnapshotError>;
}
