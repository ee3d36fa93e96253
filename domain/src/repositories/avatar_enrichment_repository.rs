use crate::errors::EnrichmentFailure;
use crate::models::{Avatar, AvatarRef};

#[async_trait::async_trait]
pub trait AvatarEnrichmentRepository {
    /// Resolves all `references` in one call. The result has one avatar per
    /// reference, in the same order; anything less is an error.
    async fn resolve_avatars(
        &self,
        references: Vec<AvatarRef>,
    ) -> Result<Vec<Avatar>, EnrichmentFailure>;
}
