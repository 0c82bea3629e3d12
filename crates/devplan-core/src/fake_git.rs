//! In-memory [`GitDriver`] used by unit tests. It touches the filesystem only
//! as far as callers observe it: clones and worktrees become directories.

use crate::error::{Error, Result};
use crate::git::{is_registered_failure, CloneOptions, GitDriver, Progress, WorktreeStart};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub remote_branches: HashSet<String>,
    pub local_branches: HashSet<String>,
    pub fail_fetch: bool,
    pub failing_clone_urls: HashSet<String>,
    /// Worktree paths git still has registered.
    pub registered: HashSet<PathBuf>,
    /// Number of upcoming `create_worktree` calls that fail with a generic error.
    pub worktree_failures: usize,
    /// Stderr of the next failing `create_worktree`, classified like git's.
    pub worktree_stderr: Option<String>,
    pub remote_urls: HashMap<PathBuf, Vec<String>>,
    pub main_of: HashMap<PathBuf, PathBuf>,
    pub dirty: HashSet<PathBuf>,
}

#[derive(Default)]
pub struct FakeGit {
    state: Mutex<FakeState>,
}

impl FakeGit {
    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    fn record(&self, call: String) {
        self.with_state(|s| s.calls.push(call));
    }
}

impl GitDriver for FakeGit {
    fn clone_repo(&self, opts: &CloneOptions, progress: &dyn Progress) -> Result<()> {
        self.record(format!("clone {}", opts.url));
        progress.line(&format!("Cloning into '{}'...", opts.target.display()));
        std::fs::create_dir_all(&opts.target)?;
        if self.with_state(|s| s.failing_clone_urls.contains(&opts.url)) {
            std::fs::write(opts.target.join("partial"), "x")?;
            return Err(Error::Git {
                op: "clone".into(),
                detail: "Authentication failed".into(),
            });
        }
        std::fs::create_dir_all(opts.target.join(".git"))?;
        let target = opts.target.clone();
        let url = opts.url.clone();
        self.with_state(|s| {
            s.remote_urls.insert(target, vec![url]);
            if let Some(b) = &opts.create_branch {
                s.local_branches.insert(b.clone());
            }
        });
        Ok(())
    }

    fn create_worktree(
        &self,
        main: &Path,
        worktree: &Path,
        branch: &str,
        start: &WorktreeStart,
    ) -> Result<()> {
        self.record(format!(
            "worktree-add {} {branch} {start:?}",
            worktree.display()
        ));
        if self.with_state(|s| s.registered.contains(worktree)) {
            return Err(Error::WorktreeRegistered {
                path: worktree.to_path_buf(),
                detail: "is a missing but already registered worktree".into(),
            });
        }
        if let Some(stderr) = self.with_state(|s| s.worktree_stderr.take()) {
            std::fs::create_dir_all(worktree)?;
            return Err(if is_registered_failure(&stderr) {
                Error::WorktreeRegistered {
                    path: worktree.to_path_buf(),
                    detail: stderr,
                }
            } else {
                Error::Git {
                    op: "worktree add".into(),
                    detail: stderr,
                }
            });
        }
        let fail = self.with_state(|s| {
            if s.worktree_failures > 0 {
                s.worktree_failures -= 1;
                true
            } else {
                false
            }
        });
        std::fs::create_dir_all(worktree)?;
        if fail {
            return Err(Error::Git {
                op: "worktree add".into(),
                detail: "fatal: simulated".into(),
            });
        }
        std::fs::write(worktree.join(".git"), "gitdir: fake\n")?;
        let (wt, main) = (worktree.to_path_buf(), main.to_path_buf());
        let branch = branch.to_string();
        self.with_state(|s| {
            let urls = s.remote_urls.get(&main).cloned().unwrap_or_default();
            s.remote_urls.insert(wt.clone(), urls);
            s.main_of.insert(wt.clone(), main);
            s.registered.insert(wt);
            s.local_branches.insert(branch);
        });
        Ok(())
    }

    fn remove_worktree(&self, _main: &Path, worktree: &Path) -> Result<()> {
        self.record(format!("worktree-remove {}", worktree.display()));
        let was_registered = self.with_state(|s| s.registered.remove(worktree));
        if !was_registered {
            return Err(Error::Git {
                op: "worktree remove".into(),
                detail: "is not a working tree".into(),
            });
        }
        std::fs::remove_dir_all(worktree).ok();
        Ok(())
    }

    fn prune_worktrees(&self, _main: &Path) -> Result<()> {
        self.record("worktree-prune".into());
        self.with_state(|s| s.registered.retain(|p| p.exists()));
        Ok(())
    }

    fn is_worktree(&self, path: &Path) -> bool {
        path.join(".git").is_file()
    }

    fn main_repo_path(&self, worktree: &Path) -> Result<PathBuf> {
        self.with_state(|s| s.main_of.get(worktree).cloned())
            .ok_or_else(|| Error::Git {
                op: "rev-parse".into(),
                detail: "not a git repository".into(),
            })
    }

    fn local_branch_exists(&self, _path: &Path, name: &str) -> Result<bool> {
        self.record(format!("local? {name}"));
        Ok(self.with_state(|s| s.local_branches.contains(name)))
    }

    fn remote_branch_exists(&self, _path: &Path, name: &str) -> Result<bool> {
        self.record(format!("remote? {name}"));
        Ok(self.with_state(|s| s.remote_branches.contains(name)))
    }

    fn fetch_remote(&self, _path: &Path, remote: &str) -> Result<()> {
        self.record(format!("fetch {remote}"));
        if self.with_state(|s| s.fail_fetch) {
            return Err(Error::Git {
                op: "fetch".into(),
                detail: "could not read from remote repository".into(),
            });
        }
        Ok(())
    }

    fn checkout_local_branch(&self, _path: &Path, name: &str) -> Result<()> {
        self.record(format!("checkout-local {name}"));
        Ok(())
    }

    fn checkout_remote_tracking(&self, _path: &Path, name: &str, remote: &str) -> Result<()> {
        self.record(format!("checkout-remote {remote}/{name}"));
        Ok(())
    }

    fn create_and_checkout_branch(&self, _path: &Path, name: &str) -> Result<()> {
        self.record(format!("create-branch {name}"));
        self.with_state(|s| s.local_branches.insert(name.to_string()));
        Ok(())
    }

    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        Ok(self.with_state(|s| s.dirty.contains(path)))
    }

    fn remote_urls(&self, path: &Path) -> Result<Vec<String>> {
        self.with_state(|s| s.remote_urls.get(path).cloned())
            .ok_or_else(|| Error::Git {
                op: "remote get-url".into(),
                detail: "No such remote 'origin'".into(),
            })
    }
}
