//! Provenance sidecar stored in `<workspace>/.devplan/`.

use crate::error::{Error, Result};
use crate::io;
use crate::types::{RepoRef, Target};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const META_DIR: &str = ".devplan";
pub const META_FILE: &str = "meta.json";
pub const GITIGNORE_FILE: &str = ".gitignore";
pub const GITIGNORE_CONTENT: &str = "*\n";
/// Generated task specs live under the sidecar so git ignores them.
pub const SPECS_DIR: &str = "specs";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_numeric_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub story_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub story_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub story_numeric_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_numeric_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_name: String,
}

fn numeric(id: Option<i64>) -> String {
    id.map(|n| n.to_string()).unwrap_or_default()
}

impl Metadata {
    fn project_only(target: &Target) -> Self {
        Self {
            project_id: target.project.id.clone(),
            project_name: target.project.title.clone(),
            project_numeric_id: numeric(target.project.numeric_id),
            ..Default::default()
        }
    }

    fn with_story(mut self, target: &Target) -> Self {
        if let Some(feature) = &target.feature {
            self.story_id = feature.id.clone();
            self.story_name = feature.title.clone();
            self.story_numeric_id = numeric(feature.numeric_id);
        }
        self
    }

    fn with_repo(mut self, repo: &RepoRef) -> Self {
        self.repo_url = repo.primary_url().to_string();
        self.repo_name = repo.full_name.clone();
        self
    }

    /// Main clones only record the project and repository.
    pub fn for_main_clone(target: &Target, repo: &RepoRef) -> Self {
        Self::project_only(target).with_repo(repo)
    }

    pub fn for_worktree(target: &Target, repo: &RepoRef) -> Self {
        let mut meta = Self::project_only(target).with_story(target).with_repo(repo);
        if let Some(task) = &target.task {
            meta.task_id = task.id.clone();
            meta.task_name = task.title.clone();
            meta.task_numeric_id = numeric(task.numeric_id);
        }
        meta
    }

    /// Parent directory of a multi-repo feature workspace.
    pub fn for_feature_parent(target: &Target) -> Self {
        Self::project_only(target).with_story(target)
    }
}

pub fn meta_dir(workspace: &Path) -> PathBuf {
    workspace.join(META_DIR)
}

pub fn specs_dir(workspace: &Path) -> PathBuf {
    meta_dir(workspace).join(SPECS_DIR)
}

pub fn meta_path(workspace: &Path) -> PathBuf {
    meta_dir(workspace).join(META_FILE)
}

/// Write `meta.json` with two-space indentation, replacing any previous file
/// atomically.
pub fn write_metadata(workspace: &Path, meta: &Metadata) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    io::atomic_write(&meta_path(workspace), json.as_bytes())
}

/// Returns `None` when the workspace has no metadata yet.
pub fn read_metadata(workspace: &Path) -> Result<Option<Metadata>> {
    let path = meta_path(workspace);
    let data = match std::fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

/// Keep the sidecar out of version control. Only rewrites the ignore file
/// when its content differs.
pub fn ensure_gitignore(workspace: &Path) -> Result<()> {
    let path = meta_dir(workspace).join(GITIGNORE_FILE);
    io::write_if_changed(&path, GITIGNORE_CONTENT.as_bytes())?;
    Ok(())
}

/// Create the sidecar, write `meta` and the ignore file.
///
/// The workspace directory itself must already exist.
pub fn ensure_metadata_setup(workspace: &Path, meta: &Metadata) -> Result<()> {
    let wrap = |source: Error| Error::MetadataWriteFailed {
        path: workspace.to_path_buf(),
        source: Box::new(source),
    };
    if !workspace.is_dir() {
        return Err(wrap(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "workspace directory does not exist",
        ))));
    }
    io::ensure_dir(&meta_dir(workspace)).map_err(wrap)?;
    write_metadata(workspace, meta).map_err(wrap)?;
    ensure_gitignore(workspace).map_err(wrap)?;
    Ok(())
}
