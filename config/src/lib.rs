use std::fmt::{Debug, Formatter};
use std::time::Duration;

use anyhow::Result;
use domain::policy::PolicyName;
use envy::Error;
use serde::Deserialize;

pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, Error>;
}

trait FromEnvLikeKeyValuePairs: Sized {
    fn from_iter(iter: impl Iterator<Item = (String, String)> + Clone) -> Result<Self, Error>;
}

impl<T: FromEnvLikeKeyValuePairs> FromEnv for T {
    fn from_env() -> Result<Self, Error> {
        // std::env::Vars is not Clone
        Self::from_iter(std::env::vars().collect::<Vec<_>>().into_iter())
    }
}

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    pub snapshot_store: SnapshotStoreConfig,
    pub live_feed: LiveFeedConfig,
    pub avatar_enrichment: AvatarEnrichmentConfig,
    pub refresh: RefreshConfig,
}

impl FromEnvLikeKeyValuePairs for AppConfig {
    fn from_iter(iter: impl Iterator<Item = (String, String)> + Clone) -> Result<Self, Error> {
        Ok(Self {
            snapshot_store: SnapshotStoreConfig::from_iter(iter.clone())?,
            live_feed: LiveFeedConfig::from_iter(iter.clone())?,
            avatar_enrichment: AvatarEnrichmentConfig::from_iter(iter.clone())?,
            refresh: RefreshConfig::from_iter(iter)?,
        })
    }
}

/// Location of the snapshot document in a GitHub-style contents API.
#[derive(Deserialize, Clone)]
pub struct SnapshotStoreConfig {
    pub access_token: String,
    pub owner: String,
    pub repository: String,
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Debug for SnapshotStoreConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStoreConfig")
            .field("access_token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .field("api_base_url", &self.api_base_url)
            .field("commit_message", &self.commit_message)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LiveFeedConfig {
    pub rooms_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AvatarEnrichmentConfig {
    pub endpoint_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_policy")]
    pub policy: PolicyName,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_max_run_seconds")]
    pub max_run_seconds: u64,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl RefreshConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub const fn max_run(&self) -> Duration {
        Duration::from_secs(self.max_run_seconds)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_branch() -> String {
    "main".to_owned()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_owned()
}

fn default_commit_message() -> String {
    "Refresh player rankings".to_owned()
}

const fn default_policy() -> PolicyName {
    PolicyName::LowRatingIntake
}

const fn default_interval_seconds() -> u64 {
    180
}

const fn default_max_run_seconds() -> u64 {
    3600
}

const fn default_request_timeout_seconds() -> u64 {
    30
}

impl FromEnvLikeKeyValuePairs for SnapshotStoreConfig {
    fn from_iter(iter: impl Iterator<Item = (String, String)>) -> Result<Self, Error> {
        envy::prefixed("SNAPSHOT_STORE_").from_iter(iter)
    }
}

impl FromEnvLikeKeyValuePairs for LiveFeedConfig {
    fn from_iter(iter: impl Iterator<Item = (String, String)>) -> Result<Self, Error> {
        envy::prefixed("LIVE_FEED_").from_iter(iter)
    }
}

impl FromEnvLikeKeyValuePairs for AvatarEnrichmentConfig {
    fn from_iter(iter: impl Iterator<Item = (String, String)>) -> Result<Self, Error> {
        envy::prefixed("AVATAR_ENRICHMENT_").from_iter(iter)
    }
}

impl FromEnvLikeKeyValuePairs for RefreshConfig {
    fn from_iter(iter: impl Iterator<Item = (String, String)>) -> Result<Self, Error> {
        envy::prefixed("REFRESH_").from_iter(iter)
    }
}
