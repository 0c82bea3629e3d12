use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("invalid branch name: '{0}'")]
    InvalidBranchName(String),

    #[error("failed to clone {repo}: {hint}")]
    CloneFailed {
        repo: String,
        hint: String,
        #[source]
        source: Box<Error>,
    },

    #[error("unsupported repository host for {0}: only GitHub and Bitbucket are supported")]
    UnsupportedHost(String),

    #[error("worktree already exists at {}", .0.display())]
    WorktreeExists(PathBuf),

    #[error("worktree at {} is already registered: {detail}", .path.display())]
    WorktreeRegistered { path: PathBuf, detail: String },

    #[error("failed to create worktree at {}", .path.display())]
    WorktreeCreateFailed {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("worktree already exists at {}: pass an assistant to reuse it", .0.display())]
    WorktreeReuseWithoutAssistant(PathBuf),

    #[error("failed to write metadata in {}", .path.display())]
    MetadataWriteFailed {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("git not installed: install git and make sure it is on PATH")]
    GitNotInstalled,

    #[error("git {op} failed: {detail}")]
    Git { op: String, detail: String },

    #[error("cannot derive a workspace directory name from '{0}'")]
    InvalidWorkspaceName(String),

    #[error("no repositories to prepare")]
    NoRepositories,

    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("invalid remote URL: {0}")]
    InvalidRemoteUrl(String),

    #[error("task id must not be empty")]
    EmptyTaskId,

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
