pub mod clean;
pub mod config;
pub mod list;
pub mod start;
pub mod sync;
pub mod worklog;
