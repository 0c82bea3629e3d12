//! Workspace preparation: main clone, worktree on a branch, metadata.
//!
//! ```text
//! S1 slugs + branch        S4 branch plan (one fetch)
//! S2 ensure main clone     S5 create worktree (recover registered once)
//! S3 reuse existing dir    S6 write metadata
//! ```
//!
//! Every exit path after S5 starts either leaves a valid worktree or removes
//! the directory.

use crate::branch::{self, BranchAction};
use crate::error::{Error, Result};
use crate::git::{self, CloneOptions, GitDriver, NoProgress, Progress, WorktreeStart};
use crate::io;
use crate::metadata::{self, Metadata};
use crate::paths::{sanitize_name, Layout};
use crate::prefs::{GitProtocol, Preferences};
use crate::types::{github_url, HostClass, RepoRef, Target};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const FEATURE_BRANCH_PREFIX: &str = "feature/";

// ---------------------------------------------------------------------------
// Confirmation capability
// ---------------------------------------------------------------------------

/// Answers yes/no questions. Declining aborts the current step.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Declines everything; used when no one can be asked.
pub struct Decline;

impl Confirm for Decline {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub target: Target,
    pub repo: RepoRef,
    /// Defaults to the task slug.
    pub branch: Option<String>,
    /// Empty means "prepare only"; an existing workspace is then an error.
    pub assistant: Option<String>,
    pub yes: bool,
}

#[derive(Debug, Clone)]
pub struct FeaturePrepareRequest {
    pub target: Target,
    pub repos: Vec<RepoRef>,
    /// Defaults to `feature/<feature slug>`.
    pub branch: Option<String>,
    pub assistant: Option<String>,
    pub yes: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparedWorkspace {
    pub path: PathBuf,
    pub main_path: PathBuf,
    pub repo: RepoRef,
    pub branch: String,
    /// The worktree already existed and was reused.
    pub reused: bool,
    /// The main clone was created by this call.
    pub cloned: bool,
    /// A stale worktree registration had to be cleaned up first.
    pub recovered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparedFeature {
    pub path: PathBuf,
    pub branch: String,
    pub repos: Vec<PreparedWorkspace>,
}

/// Everything S2..S6 needs for one repository.
struct RepoJob<'a> {
    target: &'a Target,
    repo: &'a RepoRef,
    project_slug: &'a str,
    main_path: PathBuf,
    worktree_path: PathBuf,
    branch: &'a str,
    assistant: Option<&'a str>,
    yes: bool,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<G: GitDriver> {
    layout: Layout,
    git: G,
    prefs: Arc<Preferences>,
    confirm: Arc<dyn Confirm>,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
}

impl<G: GitDriver> Orchestrator<G> {
    pub fn new(layout: Layout, git: G, prefs: Arc<Preferences>) -> Self {
        Self {
            layout,
            git,
            prefs,
            confirm: Arc::new(Decline),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Cancellation is observed between steps; a running git command is
    /// allowed to finish.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Single repository
    // -----------------------------------------------------------------------

    /// Prepare the worktree for one repository and return where it lives.
    pub fn prepare(&self, req: &PrepareRequest) -> Result<PreparedWorkspace> {
        self.check_cancelled()?;

        // S1
        let project_slug = slug_for(&req.target.project.title)?;
        let task_slug = slug_for(req.target.display_title())?;
        let main_path = self.layout.main_repo_dir(&project_slug, req.repo.slug());
        let worktree_path = self.layout.worktree_dir(&project_slug, &task_slug);
        if main_path == worktree_path {
            return Err(Error::InvalidWorkspaceName(
                req.target.display_title().to_string(),
            ));
        }
        let branch = req
            .branch
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or(task_slug);
        git::validate_branch_name(&branch)?;

        self.prepare_repo(RepoJob {
            target: &req.target,
            repo: &req.repo,
            project_slug: &project_slug,
            main_path,
            worktree_path,
            branch: &branch,
            assistant: req.assistant.as_deref(),
            yes: req.yes,
        })
    }

    fn prepare_repo(&self, job: RepoJob<'_>) -> Result<PreparedWorkspace> {
        // S2
        let cloned = self.ensure_main_clone(&job)?;
        self.check_cancelled()?;

        // S3
        if job.worktree_path.exists() {
            return self.reuse_worktree(&job, cloned);
        }

        // S4
        let action = branch::plan(&self.git, &job.main_path, job.branch)?;
        debug!(branch = job.branch, ?action, "branch plan");
        self.check_cancelled()?;

        // S5
        let recovered = self.create_worktree(&job, action)?;

        // S6
        let meta = Metadata::for_worktree(job.target, job.repo);
        metadata::ensure_metadata_setup(&job.worktree_path, &meta)?;

        info!(path = %job.worktree_path.display(), branch = job.branch, "workspace ready");
        Ok(PreparedWorkspace {
            path: job.worktree_path,
            main_path: job.main_path,
            repo: job.repo.clone(),
            branch: job.branch.to_string(),
            reused: false,
            cloned,
            recovered,
        })
    }

    /// Returns true if this call created the clone.
    fn ensure_main_clone(&self, job: &RepoJob<'_>) -> Result<bool> {
        if git::is_repo(&job.main_path) {
            return Ok(false);
        }
        let order = self.clone_order(job.repo)?;
        let created_dir = !job.main_path.exists();
        let mut last_err = None;

        for (url, protocol) in order {
            self.check_cancelled()?;
            info!(repo = %job.repo.full_name, url = %url, "cloning");
            let opts = CloneOptions {
                url: url.clone(),
                target: job.main_path.clone(),
                create_branch: Some(job.project_slug.to_string()),
                depth: self.prefs.clone_depth(),
            };
            match self.git.clone_repo(&opts, self.progress.as_ref()) {
                Ok(()) => {
                    if let Some(protocol) = protocol {
                        self.remember_protocol(protocol);
                    }
                    last_err = None;
                    break;
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "clone attempt failed");
                    if created_dir {
                        io::remove_dir_all_if_exists(&job.main_path)?;
                    }
                    last_err = Some(e);
                }
            }
        }

        if let Some(source) = last_err {
            return Err(Error::CloneFailed {
                repo: job.repo.full_name.clone(),
                hint: clone_hint(job.repo.host).to_string(),
                source: Box::new(source),
            });
        }

        let meta = Metadata::for_main_clone(job.target, job.repo);
        metadata::ensure_metadata_setup(&job.main_path, &meta)?;
        Ok(true)
    }

    /// URLs to try, in order, with the GitHub protocol each one represents.
    fn clone_order(&self, repo: &RepoRef) -> Result<Vec<(String, Option<GitProtocol>)>> {
        match repo.host {
            HostClass::Github => {
                let first = self.prefs.last_git_protocol();
                let second = match first {
                    GitProtocol::Https => GitProtocol::Ssh,
                    GitProtocol::Ssh => GitProtocol::Https,
                };
                Ok([first, second]
                    .into_iter()
                    .map(|p| (github_url(&repo.full_name, p), Some(p)))
                    .collect())
            }
            HostClass::Bitbucket if !repo.urls.is_empty() => {
                Ok(repo.urls.iter().map(|u| (u.clone(), None)).collect())
            }
            _ => Err(Error::UnsupportedHost(repo.full_name.clone())),
        }
    }

    fn remember_protocol(&self, protocol: GitProtocol) {
        if self.prefs.last_git_protocol() == protocol {
            return;
        }
        if let Err(e) = self.prefs.set_last_git_protocol(protocol) {
            warn!(error = %e, "failed to save git protocol preference");
        }
    }

    fn reuse_worktree(&self, job: &RepoJob<'_>, cloned: bool) -> Result<PreparedWorkspace> {
        let path = &job.worktree_path;
        if job.assistant.map_or(true, str::is_empty) {
            return Err(Error::WorktreeReuseWithoutAssistant(path.clone()));
        }
        let prompt = format!("Workspace already exists at {}. Reuse it?", path.display());
        if !job.yes && !self.confirm.confirm(&prompt) {
            return Err(Error::WorktreeExists(path.clone()));
        }
        self.check_cancelled()?;

        let repo = self
            .git
            .remote_urls(path)
            .and_then(RepoRef::from_urls)
            .unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "keeping requested repo info");
                job.repo.clone()
            });
        let meta = Metadata::for_worktree(job.target, &repo);
        metadata::ensure_metadata_setup(path, &meta)?;

        info!(path = %path.display(), "reusing workspace");
        Ok(PreparedWorkspace {
            path: path.clone(),
            main_path: job.main_path.clone(),
            repo,
            branch: job.branch.to_string(),
            reused: true,
            cloned,
            recovered: false,
        })
    }

    /// Returns true if a stale registration had to be cleaned up.
    fn create_worktree(&self, job: &RepoJob<'_>, action: BranchAction) -> Result<bool> {
        let (main, wt) = (&job.main_path, &job.worktree_path);
        let start = action.worktree_start();

        match self.git.create_worktree(main, wt, job.branch, &start) {
            Ok(()) => Ok(false),
            Err(Error::WorktreeRegistered { path, detail }) => {
                let prompt = format!(
                    "Worktree {} is registered in git but unusable. Clean it up and recreate it?",
                    path.display()
                );
                if !job.yes && !self.confirm.confirm(&prompt) {
                    io::remove_dir_all_if_exists(wt)?;
                    return Err(Error::WorktreeRegistered { path, detail });
                }
                self.recover_registered(main, wt, job.branch, &start)?;
                let msg = format!("Worktree {} created successfully after cleanup", wt.display());
                info!("{msg}");
                self.progress.line(&msg);
                Ok(true)
            }
            Err(e) => {
                io::remove_dir_all_if_exists(wt)?;
                Err(Error::WorktreeCreateFailed {
                    path: wt.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Prune, remove, delete the directory and try exactly once more.
    fn recover_registered(
        &self,
        main: &Path,
        wt: &Path,
        branch: &str,
        start: &WorktreeStart,
    ) -> Result<()> {
        if let Err(e) = self.git.prune_worktrees(main) {
            debug!(error = %e, "worktree prune failed");
        }
        if let Err(e) = self.git.remove_worktree(main, wt) {
            debug!(error = %e, "worktree remove failed");
        }
        io::remove_dir_all_if_exists(wt)?;
        let retry = self
            .check_cancelled()
            .and_then(|()| self.git.create_worktree(main, wt, branch, start));
        if let Err(e) = retry {
            io::remove_dir_all_if_exists(wt)?;
            return Err(Error::WorktreeCreateFailed {
                path: wt.to_path_buf(),
                source: Box::new(e),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Multi-repository features
    // -----------------------------------------------------------------------

    /// Prepare one worktree per repository under
    /// `features/<project>/<feature>/<repo>`. Repositories are handled
    /// concurrently; the parent's metadata is written only once all of them
    /// succeeded.
    pub fn prepare_feature(&self, req: &FeaturePrepareRequest) -> Result<PreparedFeature> {
        self.check_cancelled()?;
        let mut repos: Vec<&RepoRef> = Vec::new();
        for repo in &req.repos {
            if repos.iter().any(|r| r.slug() == repo.slug()) {
                warn!(repo = %repo.full_name, "skipping repository with duplicate directory name");
                continue;
            }
            repos.push(repo);
        }
        if repos.is_empty() {
            return Err(Error::NoRepositories);
        }

        let project_slug = slug_for(&req.target.project.title)?;
        let feature_slug = slug_for(req.target.display_title())?;
        let parent = self
            .layout
            .feature_workspace_dir(&project_slug, &feature_slug);
        if repos
            .iter()
            .any(|r| parent == self.layout.main_repo_dir(&project_slug, r.slug()))
        {
            return Err(Error::InvalidWorkspaceName(
                req.target.display_title().to_string(),
            ));
        }
        let branch = req
            .branch
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| format!("{FEATURE_BRANCH_PREFIX}{feature_slug}"));
        git::validate_branch_name(&branch)?;
        io::ensure_dir(&parent)?;

        let results: Vec<Result<PreparedWorkspace>> = std::thread::scope(|s| {
            let handles: Vec<_> = repos
                .iter()
                .map(|repo| {
                    let job = RepoJob {
                        target: &req.target,
                        repo,
                        project_slug: &project_slug,
                        main_path: self.layout.main_repo_dir(&project_slug, repo.slug()),
                        worktree_path: self.layout.feature_repo_dir(
                            &project_slug,
                            &feature_slug,
                            repo.slug(),
                        ),
                        branch: &branch,
                        assistant: req.assistant.as_deref(),
                        yes: req.yes,
                    };
                    s.spawn(move || self.prepare_repo(job))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                .collect()
        });

        let prepared = results.into_iter().collect::<Result<Vec<_>>>()?;
        metadata::ensure_metadata_setup(&parent, &Metadata::for_feature_parent(&req.target))?;
        info!(path = %parent.display(), repos = prepared.len(), "feature workspace ready");
        Ok(PreparedFeature {
            path: parent,
            branch,
            repos: prepared,
        })
    }

    // -----------------------------------------------------------------------
    // Existing checkouts
    // -----------------------------------------------------------------------

    /// Use an existing checkout at `path` as the workspace for `target`:
    /// optionally set up `branch` in place, then record metadata.
    pub fn adopt(
        &self,
        path: &Path,
        target: &Target,
        branch: Option<&str>,
    ) -> Result<PreparedWorkspace> {
        self.check_cancelled()?;
        if !git::is_repo(path) {
            return Err(Error::NotARepository(path.to_path_buf()));
        }
        let repo = RepoRef::from_urls(self.git.remote_urls(path)?)?;
        let branch = match branch.filter(|b| !b.is_empty()) {
            Some(b) => {
                branch::setup(&self.git, path, b)?;
                b.to_string()
            }
            None => String::new(),
        };
        self.check_cancelled()?;
        metadata::ensure_metadata_setup(path, &Metadata::for_worktree(target, &repo))?;
        let main_path = if self.git.is_worktree(path) {
            self.git.main_repo_path(path)?
        } else {
            path.to_path_buf()
        };
        Ok(PreparedWorkspace {
            path: path.to_path_buf(),
            main_path,
            repo,
            branch,
            reused: true,
            cloned: false,
            recovered: false,
        })
    }
}

fn slug_for(title: &str) -> Result<String> {
    let slug = sanitize_name(title);
    if slug.is_empty() {
        return Err(Error::InvalidWorkspaceName(title.to_string()));
    }
    Ok(slug)
}

fn clone_hint(host: HostClass) -> &'static str {
    match host {
        HostClass::Github => {
            "check your GitHub credentials (HTTPS) or SSH keys, and your network connection"
        }
        HostClass::Bitbucket => {
            "check your Bitbucket credentials (Git Credential Manager or app password) or SSH keys, and your network connection"
        }
        HostClass::Other => "check the repository URL, your credentials and your network connection",
    }
}
