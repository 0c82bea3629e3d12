//! Enumerate and remove prepared workspaces under `features/`.

use crate::error::{Error, Result};
use crate::git::{self, GitDriver};
use crate::io;
use crate::metadata::{self, Metadata};
use crate::paths::Layout;
use crate::remote_url::full_name_from_url;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceRepo {
    pub path: PathBuf,
    pub full_name: Option<String>,
    pub dirty: bool,
    pub metadata: Option<Metadata>,
}

/// A task worktree, or the parent directory of a multi-repo feature.
#[derive(Debug, Clone, Serialize)]
pub struct ClonedWorkspace {
    pub project: String,
    pub name: String,
    pub path: PathBuf,
    pub is_feature_workspace: bool,
    pub repos: Vec<WorkspaceRepo>,
    pub metadata: Option<Metadata>,
}

impl ClonedWorkspace {
    pub fn has_changes(&self) -> bool {
        self.repos.iter().any(|r| r.dirty)
    }

    /// `project/name`, the handle used on the command line.
    pub fn id(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }

    /// Task or feature title from metadata, falling back to the directory.
    pub fn title(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| {
                [&m.task_name, &m.story_name]
                    .into_iter()
                    .find(|s| !s.is_empty())
            })
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

fn read_meta(path: &Path) -> Option<Metadata> {
    metadata::read_metadata(path).unwrap_or_else(|e| {
        debug!(path = %path.display(), error = %e, "unreadable metadata");
        None
    })
}

fn describe_repo(git: &dyn GitDriver, path: &Path) -> WorkspaceRepo {
    let full_name = git
        .remote_urls(path)
        .ok()
        .and_then(|urls| urls.into_iter().next())
        .and_then(|url| full_name_from_url(&url).ok());
    let dirty = git.has_uncommitted_changes(path).unwrap_or_else(|e| {
        debug!(path = %path.display(), error = %e, "status failed");
        false
    });
    WorkspaceRepo {
        path: path.to_path_buf(),
        full_name,
        dirty,
        metadata: read_meta(path),
    }
}

/// All workspaces under the layout's features directory, in path order.
/// Main clones are skipped.
pub fn list_workspaces(layout: &Layout, git: &dyn GitDriver) -> Result<Vec<ClonedWorkspace>> {
    let features = layout.features_dir();
    if !features.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for project_dir in sorted_subdirs(&features)? {
        let project = dir_name(&project_dir);
        for dir in sorted_subdirs(&project_dir)? {
            if git::is_main_clone(&dir) {
                continue;
            }
            let (is_feature_workspace, repos) = if git.is_worktree(&dir) {
                (false, vec![describe_repo(git, &dir)])
            } else {
                let children: Vec<WorkspaceRepo> = sorted_subdirs(&dir)?
                    .into_iter()
                    .filter(|c| git.is_worktree(c) || git::is_repo(c))
                    .map(|c| describe_repo(git, &c))
                    .collect();
                if children.is_empty() {
                    continue;
                }
                (true, children)
            };
            out.push(ClonedWorkspace {
                project: project.clone(),
                name: dir_name(&dir),
                metadata: read_meta(&dir),
                path: dir,
                is_feature_workspace,
                repos,
            });
        }
    }
    Ok(out)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Find a workspace by `project/name`, bare `name` or full path.
pub fn find_workspace<'a>(workspaces: &'a [ClonedWorkspace], key: &str) -> Option<&'a ClonedWorkspace> {
    let key_path = Path::new(key);
    workspaces
        .iter()
        .find(|w| w.id() == key || w.path == key_path)
        .or_else(|| {
            let mut by_name = workspaces.iter().filter(|w| w.name == key);
            match (by_name.next(), by_name.next()) {
                (Some(w), None) => Some(w),
                _ => None,
            }
        })
}

/// Unregister every worktree of `ws` from its main clone and delete the
/// directory. Main clones are left alone.
pub fn remove_workspace(git: &dyn GitDriver, ws: &ClonedWorkspace) -> Result<()> {
    if git::is_main_clone(&ws.path) {
        return Err(Error::Git {
            op: "clean".into(),
            detail: format!("{} is a main clone", ws.path.display()),
        });
    }
    for repo in &ws.repos {
        if !git.is_worktree(&repo.path) {
            continue;
        }
        match git.main_repo_path(&repo.path) {
            Ok(main) => {
                if let Err(e) = git.remove_worktree(&main, &repo.path) {
                    debug!(path = %repo.path.display(), error = %e, "worktree remove failed");
                }
                if let Err(e) = git.prune_worktrees(&main) {
                    debug!(error = %e, "worktree prune failed");
                }
            }
            Err(e) => debug!(path = %repo.path.display(), error = %e, "main clone not found"),
        }
    }
    io::remove_dir_all_if_exists(&ws.path)
}
