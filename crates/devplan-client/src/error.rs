use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not authorized (HTTP {status}): check your API key")]
    Unauthorized { status: u16 },

    #[error("service unavailable at {url}: {detail}")]
    ServiceUnavailable {
        url: String,
        detail: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no API token available: {0}")]
    Token(String),

    #[error("could not resolve repositories: {}", .0.join(", "))]
    UnresolvedRepos(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Core(#[from] devplan_core::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// One failure inside a sync run. Runs never abort on these; they are
/// collected into [`crate::syncer::SyncResult::errors`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to discover specs in {}: {source}", .dir.display())]
    Discover {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch spec manifest: {0}")]
    Manifest(#[source] ClientError),

    #[error("failed to upload {name}: {source}")]
    Transport {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("sync run did not finish: {0}")]
    Interrupted(#[source] tokio::task::JoinError),
}
