pub mod branch;
pub mod error;
pub mod git;
pub mod io;
pub mod listing;
pub mod metadata;
pub mod paths;
pub mod prefs;
pub mod recent_activity;
pub mod remote_url;
pub mod types;
pub mod workspace;

#[cfg(test)]
mod fake_git;

pub use error::{Error, Result};
