//! Deterministic branch setup: track the remote branch, else check out the
//! local one, else create it from HEAD.

use crate::error::Result;
use crate::git::{validate_branch_name, GitDriver, WorktreeStart, DEFAULT_REMOTE};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchAction {
    TrackRemote,
    CheckoutLocal,
    CreateFromHead,
}

impl BranchAction {
    /// Where a worktree for this branch should start.
    pub fn worktree_start(self) -> WorktreeStart {
        match self {
            BranchAction::TrackRemote => WorktreeStart::Remote(DEFAULT_REMOTE.to_string()),
            BranchAction::CheckoutLocal => WorktreeStart::Local,
            BranchAction::CreateFromHead => WorktreeStart::Head,
        }
    }
}

/// Remote beats local beats new.
pub fn decide(remote_exists: bool, local_exists: bool) -> BranchAction {
    if remote_exists {
        BranchAction::TrackRemote
    } else if local_exists {
        BranchAction::CheckoutLocal
    } else {
        BranchAction::CreateFromHead
    }
}

/// Probe the repository at `path` and pick an action for `name` without
/// changing the checkout.
///
/// Fetches `origin` once. A failed fetch (offline, no remote) is not fatal;
/// the remote branch then simply counts as absent.
pub fn plan(git: &dyn GitDriver, path: &Path, name: &str) -> Result<BranchAction> {
    validate_branch_name(name)?;
    let remote_exists = match git.fetch_remote(path, DEFAULT_REMOTE) {
        Ok(()) => git.remote_branch_exists(path, name)?,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "fetch failed, ignoring remote branches");
            false
        }
    };
    let local_exists = if remote_exists {
        false
    } else {
        git.local_branch_exists(path, name)?
    };
    Ok(decide(remote_exists, local_exists))
}

/// [`plan`] then apply the action to the checkout at `path`.
pub fn setup(git: &dyn GitDriver, path: &Path, name: &str) -> Result<BranchAction> {
    let action = plan(git, path, name)?;
    match action {
        BranchAction::TrackRemote => git.checkout_remote_tracking(path, name, DEFAULT_REMOTE)?,
        BranchAction::CheckoutLocal => git.checkout_local_branch(path, name)?,
        BranchAction::CreateFromHead => git.create_and_checkout_branch(path, name)?,
    }
    debug!(branch = name, ?action, "branch ready");
    Ok(action)
}
