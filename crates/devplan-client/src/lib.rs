//! `devplan-client`: the devplan service seen from the CLI.
//!
//! ```text
//! ServiceClient (trait)
//!     ├── HttpClient       ← reqwest, api/v1 routes, status → ClientError
//!     └── InMemoryService  ← tests
//!
//! Syncer          ← task dir → manifest diff → concurrent uploads
//! WorklogReporter ← submit_worklog + recent activity
//! repos           ← document repo names → RepoRef
//! ```
//!
//! Workspace preparation itself lives in `devplan-core` and never talks to
//! the service.

pub mod api;
pub mod error;
pub mod http;
pub mod memory;
pub mod repos;
pub mod specs;
pub mod syncer;
pub mod types;
pub mod worklog;

#[cfg(test)]
mod tests;

pub use api::{ServiceClient, StaticToken, TokenProvider};
pub use error::{ClientError, Result, SyncError};
pub use http::HttpClient;
pub use memory::InMemoryService;
pub use syncer::{SyncResult, Syncer, DEFAULT_SYNC_INTERVAL};
pub use worklog::WorklogReporter;
