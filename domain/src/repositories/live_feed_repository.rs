use crate::models::RawSighting;

#[async_trait::async_trait]
pub trait LiveFeedRepository {
    /// Every player sighting in the current window, flattened across rooms.
    async fn fetch_sightings(&self) -> anyhow::Result<Vec<RawSighting>>;
}
