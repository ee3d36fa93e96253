use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use config::{AvatarEnrichmentConfig, LiveFeedConfig};
use domain::errors::EnrichmentFailure;
use domain::models::{Avatar, AvatarRef, RawSighting};
use domain::repositories::{AvatarEnrichmentRepository, LiveFeedRepository};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

/// Talks to the game's public room listing and to the avatar decoding service.
#[derive(Debug)]
pub struct HttpUpstreamRepository {
    client: Client,
    rooms_url: String,
    avatar_endpoint_url: String,
}

impl HttpUpstreamRepository {
    pub fn try_new(
        live_feed: LiveFeedConfig,
        avatar_enrichment: AvatarEnrichmentConfig,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            rooms_url: live_feed.rooms_url,
            avatar_endpoint_url: avatar_enrichment.endpoint_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Room {
    #[serde(default)]
    players: Option<BTreeMap<String, Value>>,
}

fn flatten_rooms(rooms: Vec<Room>) -> Vec<RawSighting> {
    rooms
        .into_iter()
        .flat_map(|room| room.players.unwrap_or_default())
        .filter_map(|(key, player)| match serde_json::from_value::<RawSighting>(player) {
            Ok(sighting) => Some(sighting),
            Err(e) => {
                tracing::warn!(%key, "dropping player entry that is not an object: {e}");
                None
            }
        })
        .collect()
}

// The service answers with an object keyed by the position of each reference
// in the request ("0", "1", ...).
fn avatars_in_request_order(
    expected: usize,
    mut by_position: HashMap<String, Avatar>,
) -> Result<Vec<Avatar>, EnrichmentFailure> {
    let avatars = (0..expected)
        .map_while(|position| by_position.remove(&position.to_string()))
        .collect::<Vec<_>>();

    if avatars.len() == expected {
        Ok(avatars)
    } else {
        Err(EnrichmentFailure::Incomplete {
            expected,
            received: avatars.len(),
        })
    }
}

#[async_trait::async_trait]
impl LiveFeedRepository for HttpUpstreamRepository {
    #[tracing::instrument(skip(self))]
    async fn fetch_sightings(&self) -> anyhow::Result<Vec<RawSighting>> {
        let rooms = self
            .client
            .get(&self.rooms_url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Room>>()
            .await?;

        let room_count = rooms.len();
        let sightings = flatten_rooms(rooms);
        tracing::debug!(rooms = room_count, sightings = sightings.len(), "fetched live feed");

        Ok(sightings)
    }
}

#[async_trait::async_trait]
impl AvatarEnrichmentRepository for HttpUpstreamRepository {
    #[tracing::instrument(skip(self, references), fields(references = references.len()))]
    async fn resolve_avatars(
        &self,
        references: Vec<AvatarRef>,
    ) -> Result<Vec<Avatar>, EnrichmentFailure> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.avatar_endpoint_url)
            .json(&references)
            .send()
            .await
            .map_err(|e| EnrichmentFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EnrichmentFailure::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let by_position = response
            .json::<HashMap<String, Avatar>>()
            .await
            .map_err(|e| EnrichmentFailure::Parse(e.to_string()))?;

        avatars_in_request_order(references.len(), by_position)
    }
}
