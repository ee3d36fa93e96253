use std::time::Duration;

use anyhow::anyhow;
use config::SnapshotStoreConfig;
use domain::errors::{ConflictError, WriteSnapshotError};
use domain::models::RankingSnapshot;
use domain::repositories::RankingSnapshotRepository;
use domain::types::{VersionToken, Versioned};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};

use crate::contents_api::{decode_document, encode_document, ContentsResponse, UpdateContentsRequest};

mod contents_api;

/// Snapshot store backed by a single JSON file in a git repository, read and
/// written through the GitHub contents API. The blob sha of the file serves as
/// the version token.
#[derive(Debug)]
pub struct GitHubContentsRepository {
    client: Client,
    config: SnapshotStoreConfig,
}

impl GitHubContentsRepository {
    pub fn try_new(config: SnapshotStoreConfig, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repository,
            self.config.path.trim_start_matches('/'),
        )
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("player-ranking-refresher"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", self.config.access_token))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        Ok(headers)
    }

    async fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(bytes.to_vec())
    }
}

// Without a sha the API can only create the file; if someone created it in
// the meantime it answers 422 rather than 409.
fn is_conflict(status: StatusCode, based_on_existing_revision: bool) -> bool {
    status == StatusCode::CONFLICT
        || (!based_on_existing_revision && status == StatusCode::UNPROCESSABLE_ENTITY)
}

/// Where the stored document lives, as told by a contents API read.
#[derive(Debug, PartialEq)]
enum StoredDocument {
    Absent,
    Inline { sha: String, document: Vec<u8> },
    Remote { sha: String, download_url: String },
}

fn stored_document(status: StatusCode, body: &[u8]) -> anyhow::Result<StoredDocument> {
    if status == StatusCode::NOT_FOUND {
        return Ok(StoredDocument::Absent);
    }
    if !status.is_success() {
        return Err(anyhow!(
            "snapshot store read failed ({status}): {}",
            String::from_utf8_lossy(body)
        ));
    }

    let contents: ContentsResponse = serde_json::from_slice(body)?;
    match (contents.inline_document()?, contents.download_url) {
        (Some(document), _) => Ok(StoredDocument::Inline {
            sha: contents.sha,
            document,
        }),
        (None, Some(download_url)) => Ok(StoredDocument::Remote {
            sha: contents.sha,
            download_url,
        }),
        (None, None) => Err(anyhow!(
            "snapshot document is neither inlined nor downloadable"
        )),
    }
}

fn versioned_snapshot(sha: String, document: &[u8]) -> anyhow::Result<Versioned<RankingSnapshot>> {
    Ok(Versioned {
        data: decode_document(document)?,
        version: Some(VersionToken::from(sha)),
    })
}

#[async_trait::async_trait]
impl RankingSnapshotRepository for GitHubContentsRepository {
    #[tracing::instrument(skip(self))]
    async fn read_snapshot(&self) -> anyhow::Result<Versioned<RankingSnapshot>> {
        let response = self
            .client
            .get(self.contents_url())
            .query(&[("ref", &self.config.branch)])
            .headers(self.headers()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        let snapshot = match stored_document(status, &body)? {
            StoredDocument::Absent => {
                tracing::warn!(
                    path = %self.config.path,
                    "snapshot document does not exist yet, starting from an empty snapshot"
                );
                return Ok(Versioned {
                    data: RankingSnapshot::default(),
                    version: None,
                });
            }
            StoredDocument::Inline { sha, document } => versioned_snapshot(sha, &document)?,
            StoredDocument::Remote { sha, download_url } => {
                versioned_snapshot(sha, &self.download(&download_url).await?)?
            }
        };

        tracing::debug!(
            records = snapshot.data.len(),
            sha = ?snapshot.version,
            "read snapshot"
        );
        Ok(snapshot)
    }

    #[tracing::instrument(skip(self, snapshot), fields(records = snapshot.data.len()))]
    async fn write_snapshot(
        &self,
        snapshot: Versioned<RankingSnapshot>,
    ) -> Result<(), WriteSnapshotError> {
        let request = UpdateContentsRequest {
            message: &self.config.commit_message,
            content: encode_document(&snapshot.data)?,
            sha: snapshot.version.as_ref().map(VersionToken::as_str),
            branch: &self.config.branch,
        };

        let response = self
            .client
            .put(self.contents_url())
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(anyhow::Error::from)?;

        let status = response.status();
        if is_conflict(status, snapshot.version.is_some()) {
            return Err(ConflictError {
                attempted: snapshot.version,
            }
            .into());
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(anyhow!("snapshot store rejected write ({status}): {message}").into());
        }

        tracing::debug!(%status, "wrote snapshot");
        Ok(())
    }
}
