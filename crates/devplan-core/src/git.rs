//! Subprocess wrapper around the `git` binary.
//!
//! Only the operations workspace preparation needs are exposed, through the
//! [`GitDriver`] trait so the orchestrator can be driven by a fake in tests.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

pub const DEFAULT_REMOTE: &str = "origin";

/// Substrings of `git worktree add` failures that mean git still tracks a
/// worktree at the target path that a prune/remove would clear. A branch
/// checked out in some other worktree is not one of them.
const REGISTERED_MARKERS: &[&str] = &["already registered", "already exists"];

const STDERR_TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// Progress sink
// ---------------------------------------------------------------------------

/// Receives human-readable progress lines from long-running git commands.
pub trait Progress: Send + Sync {
    fn line(&self, line: &str);
}

/// Discards progress.
pub struct NoProgress;

impl Progress for NoProgress {
    fn line(&self, _line: &str) {}
}

// ---------------------------------------------------------------------------
// Driver interface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    pub url: String,
    pub target: PathBuf,
    /// Branch to create and check out right after the clone.
    pub create_branch: Option<String>,
    /// Shallow clone depth; `None` clones the full history.
    pub depth: Option<u32>,
}

/// Where a new worktree's branch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorktreeStart {
    /// Create the branch at the main clone's HEAD.
    Head,
    /// Check out the existing local branch.
    Local,
    /// Create the branch from `<remote>/<branch>` and track it.
    Remote(String),
}

pub trait GitDriver: Send + Sync {
    fn clone_repo(&self, opts: &CloneOptions, progress: &dyn Progress) -> Result<()>;

    /// `git worktree add -B <branch> <worktree>` run from `main`.
    fn create_worktree(
        &self,
        main: &Path,
        worktree: &Path,
        branch: &str,
        start: &WorktreeStart,
    ) -> Result<()>;

    fn remove_worktree(&self, main: &Path, worktree: &Path) -> Result<()>;
    fn prune_worktrees(&self, main: &Path) -> Result<()>;

    fn is_worktree(&self, path: &Path) -> bool;
    fn main_repo_path(&self, worktree: &Path) -> Result<PathBuf>;

    fn local_branch_exists(&self, path: &Path, name: &str) -> Result<bool>;
    /// Checks the `origin` remote-tracking ref; call [`fetch_remote`](Self::fetch_remote) first.
    fn remote_branch_exists(&self, path: &Path, name: &str) -> Result<bool>;
    fn fetch_remote(&self, path: &Path, remote: &str) -> Result<()>;

    fn checkout_local_branch(&self, path: &Path, name: &str) -> Result<()>;
    fn checkout_remote_tracking(&self, path: &Path, name: &str, remote: &str) -> Result<()>;
    fn create_and_checkout_branch(&self, path: &Path, name: &str) -> Result<()>;

    /// Tracked changes only; untracked files are ignored.
    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool>;
    fn remote_urls(&self, path: &Path) -> Result<Vec<String>>;
}

/// A main clone has a `.git` directory; worktrees have a `.git` file.
pub fn is_main_clone(path: &Path) -> bool {
    path.join(".git").is_dir()
}

pub fn is_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

// ---------------------------------------------------------------------------
// Branch names
// ---------------------------------------------------------------------------

/// Conservative subset of `git check-ref-format` rules.
pub fn is_valid_branch_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.starts_with('-') || name.starts_with('.') {
        return false;
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return false;
    }
    if name.contains("..") {
        return false;
    }
    !name
        .chars()
        .any(|c| matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
}

pub fn validate_branch_name(name: &str) -> Result<()> {
    if is_valid_branch_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidBranchName(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// System git
// ---------------------------------------------------------------------------

/// [`GitDriver`] that runs the `git` found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemGit {
    bin: PathBuf,
}

impl SystemGit {
    pub fn locate() -> Result<Self> {
        let bin = which::which("git").map_err(|_| Error::GitNotInstalled)?;
        Ok(Self { bin })
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.current_dir(dir).env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn output(&self, op: &str, cmd: &mut Command) -> Result<Output> {
        debug!(op, cmd = ?cmd, "running git");
        Ok(cmd.stdin(Stdio::null()).output()?)
    }

    /// Run and require success; returns trimmed stdout.
    fn run(&self, op: &str, cmd: &mut Command) -> Result<String> {
        let out = self.output(op, cmd)?;
        if !out.status.success() {
            return Err(git_error(op, &out));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// `show-ref --verify --quiet` exits 0 when the ref exists and 1 when not.
    fn ref_exists(&self, path: &Path, reference: &str) -> Result<bool> {
        let out = self.output(
            "show-ref",
            self.command(path)
                .args(["show-ref", "--verify", "--quiet"])
                .arg(reference),
        )?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(git_error("show-ref", &out)),
        }
    }
}

/// True when a `git worktree add` failure is a stale registration of the
/// target path.
pub(crate) fn is_registered_failure(stderr: &str) -> bool {
    REGISTERED_MARKERS.iter().any(|m| stderr.contains(m))
}

fn git_error(op: &str, out: &Output) -> Error {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        format!("exited with {}", out.status)
    } else {
        stderr
    };
    Error::Git {
        op: op.to_string(),
        detail,
    }
}

/// Split git's progress stream on both `\r` and `\n` and forward each
/// non-empty line. Returns the last few lines for error reporting.
fn forward_progress(mut stderr: impl Read, progress: &dyn Progress) -> std::io::Result<Vec<String>> {
    let mut tail: Vec<String> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    let emit = |bytes: &[u8], tail: &mut Vec<String>| {
        let line = String::from_utf8_lossy(bytes).trim().to_string();
        if line.is_empty() {
            return;
        }
        progress.line(&line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line);
    };
    loop {
        let n = stderr.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            if b == b'\n' || b == b'\r' {
                emit(&pending, &mut tail);
                pending.clear();
            } else {
                pending.push(b);
            }
        }
    }
    emit(&pending, &mut tail);
    Ok(tail)
}

impl GitDriver for SystemGit {
    fn clone_repo(&self, opts: &CloneOptions, progress: &dyn Progress) -> Result<()> {
        if let Some(branch) = &opts.create_branch {
            validate_branch_name(branch)?;
        }
        let parent = opts.target.parent().unwrap_or(Path::new("."));
        crate::io::ensure_dir(parent)?;

        let mut cmd = self.command(parent);
        cmd.args(["clone", "--progress"]);
        if let Some(depth) = opts.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        cmd.arg(&opts.url).arg(&opts.target);
        debug!(url = %opts.url, target = %opts.target.display(), "cloning");

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let tail = match child.stderr.take() {
            Some(stderr) => forward_progress(stderr, progress)?,
            None => Vec::new(),
        };
        let status = child.wait()?;
        if !status.success() {
            let detail = if tail.is_empty() {
                format!("exited with {status}")
            } else {
                tail.join("\n")
            };
            return Err(Error::Git {
                op: "clone".into(),
                detail,
            });
        }

        if let Some(branch) = &opts.create_branch {
            self.run(
                "checkout",
                self.command(&opts.target).args(["checkout", "-B", branch]),
            )?;
        }
        Ok(())
    }

    fn create_worktree(
        &self,
        main: &Path,
        worktree: &Path,
        branch: &str,
        start: &WorktreeStart,
    ) -> Result<()> {
        validate_branch_name(branch)?;
        let mut cmd = self.command(main);
        cmd.args(["worktree", "add"]);
        match start {
            WorktreeStart::Head => {
                cmd.args(["-B", branch]).arg(worktree);
            }
            WorktreeStart::Local => {
                cmd.arg(worktree).arg(branch);
            }
            WorktreeStart::Remote(remote) => {
                cmd.args(["--track", "-B", branch])
                    .arg(worktree)
                    .arg(format!("{remote}/{branch}"));
            }
        }
        let out = self.output("worktree add", &mut cmd)?;
        if out.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if is_registered_failure(&stderr) {
            return Err(Error::WorktreeRegistered {
                path: worktree.to_path_buf(),
                detail: stderr,
            });
        }
        Err(git_error("worktree add", &out))
    }

    fn remove_worktree(&self, main: &Path, worktree: &Path) -> Result<()> {
        self.run(
            "worktree remove",
            self.command(main)
                .args(["worktree", "remove", "--force"])
                .arg(worktree),
        )?;
        Ok(())
    }

    fn prune_worktrees(&self, main: &Path) -> Result<()> {
        self.run("worktree prune", self.command(main).args(["worktree", "prune"]))?;
        Ok(())
    }

    fn is_worktree(&self, path: &Path) -> bool {
        let dot_git = path.join(".git");
        dot_git.is_file()
            && std::fs::read_to_string(&dot_git)
                .map(|s| s.trim_start().starts_with("gitdir:"))
                .unwrap_or(false)
    }

    fn main_repo_path(&self, worktree: &Path) -> Result<PathBuf> {
        let common = self.run(
            "rev-parse",
            self.command(worktree)
                .args(["rev-parse", "--git-common-dir"]),
        )?;
        let common = PathBuf::from(common);
        let common = if common.is_absolute() {
            common
        } else {
            worktree.join(common)
        };
        let common = common.canonicalize()?;
        common
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Git {
                op: "rev-parse".into(),
                detail: format!("no parent for {}", common.display()),
            })
    }

    fn local_branch_exists(&self, path: &Path, name: &str) -> Result<bool> {
        validate_branch_name(name)?;
        self.ref_exists(path, &format!("refs/heads/{name}"))
    }

    fn remote_branch_exists(&self, path: &Path, name: &str) -> Result<bool> {
        validate_branch_name(name)?;
        self.ref_exists(path, &format!("refs/remotes/{DEFAULT_REMOTE}/{name}"))
    }

    fn fetch_remote(&self, path: &Path, remote: &str) -> Result<()> {
        self.run("fetch", self.command(path).args(["fetch", "--quiet", remote]))?;
        Ok(())
    }

    fn checkout_local_branch(&self, path: &Path, name: &str) -> Result<()> {
        validate_branch_name(name)?;
        self.run("checkout", self.command(path).args(["checkout", name]))?;
        Ok(())
    }

    fn checkout_remote_tracking(&self, path: &Path, name: &str, remote: &str) -> Result<()> {
        validate_branch_name(name)?;
        let upstream = format!("{remote}/{name}");
        if self.local_branch_exists(path, name)? {
            self.run("checkout", self.command(path).args(["checkout", name]))?;
            self.run(
                "branch",
                self.command(path)
                    .args(["branch", "--set-upstream-to"])
                    .arg(&upstream),
            )?;
        } else {
            self.run(
                "checkout",
                self.command(path)
                    .args(["checkout", "-b", name, "--track"])
                    .arg(&upstream),
            )?;
        }
        Ok(())
    }

    fn create_and_checkout_branch(&self, path: &Path, name: &str) -> Result<()> {
        validate_branch_name(name)?;
        self.run("checkout", self.command(path).args(["checkout", "-b", name]))?;
        Ok(())
    }

    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        let out = self.run(
            "status",
            self.command(path)
                .args(["status", "--porcelain", "--untracked-files=no"]),
        )?;
        Ok(!out.is_empty())
    }

    fn remote_urls(&self, path: &Path) -> Result<Vec<String>> {
        let out = self.run(
            "remote get-url",
            self.command(path)
                .args(["remote", "get-url", "--all", DEFAULT_REMOTE]),
        )?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::SystemGit;
    use std::path::Path;
    use std::process::Command;

    pub fn git() -> Option<SystemGit> {
        SystemGit::locate().ok()
    }

    pub fn sh(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .current_dir(dir)
            .args([
                "-c",
                "user.name=devplan",
                "-c",
                "user.email=devplan@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .output()
            .unwrap();
        assert!(
            status.status.success(),
            "git {args:?}: {}",
            String::from_utf8_lossy(&status.stderr)
        );
    }

    /// A repository on branch `main` with one commit.
    pub fn init_repo(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        sh(dir, &["init", "-q"]);
        sh(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        sh(dir, &["add", "README.md"]);
        sh(dir, &["commit", "-q", "-m", "init"]);
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{git, init_repo, sh};
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl Progress for Collect {
        fn line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn branch_name_validation() {
        for ok in ["feature-branch", "feature/my-branch", "branch123", "a.b"] {
            assert!(is_valid_branch_name(ok), "{ok}");
        }
        for bad in [
            "", "-x", ".x", "x.", "x.lock", "a b", "a~b", "a^b", "a:b", "a?b", "a*b", "a[b",
            "a\\b", "a..b",
        ] {
            assert!(!is_valid_branch_name(bad), "{bad:?}");
        }
    }

    #[test]
    fn only_stale_registrations_are_recoverable() {
        assert!(is_registered_failure(
            "fatal: '/w/x' is a missing but already registered worktree;\nuse 'add -f' to override"
        ));
        assert!(is_registered_failure("fatal: '/w/x' already exists"));
        assert!(!is_registered_failure(
            "fatal: 'add_login' is already checked out at '/w/other'"
        ));
        assert!(!is_registered_failure(
            "fatal: 'add_login' is already used by worktree at '/w/other'"
        ));
    }

    #[test]
    fn progress_splits_carriage_returns() {
        let sink = Collect::default();
        let input: &[u8] = b"Cloning into 'x'...\nReceiving objects:  50%\rReceiving objects: 100%\n";
        let tail = forward_progress(input, &sink).unwrap();
        let lines = sink.0.into_inner().unwrap();
        assert_eq!(
            lines,
            vec![
                "Cloning into 'x'...",
                "Receiving objects:  50%",
                "Receiving objects: 100%"
            ]
        );
        assert_eq!(tail.len(), 3);
    }

    #[test]
    fn invalid_branch_is_rejected_before_running_git() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        let err = git
            .checkout_local_branch(dir.path(), "bad..name")
            .unwrap_err();
        assert!(err.to_string().contains("invalid branch name"));
    }

    #[test]
    fn clone_creates_branch_and_reports_progress() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        let origin = dir.path().join("origin");
        init_repo(&origin);
        let target = dir.path().join("ws/proj/repo");

        let sink = Collect::default();
        git.clone_repo(
            &CloneOptions {
                url: origin.to_string_lossy().into_owned(),
                target: target.clone(),
                create_branch: Some("proj".into()),
                depth: None,
            },
            &sink,
        )
        .unwrap();

        assert!(is_main_clone(&target));
        assert!(git.local_branch_exists(&target, "proj").unwrap());
        assert!(!sink.0.into_inner().unwrap().is_empty());
        let urls = git.remote_urls(&target).unwrap();
        assert_eq!(urls, vec![origin.to_string_lossy().into_owned()]);
    }

    #[test]
    fn clone_failure_is_reported() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        let err = git
            .clone_repo(
                &CloneOptions {
                    url: dir.path().join("missing").to_string_lossy().into_owned(),
                    target: dir.path().join("target"),
                    create_branch: None,
                    depth: None,
                },
                &NoProgress,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Git { ref op, .. } if op == "clone"));
    }

    #[test]
    fn worktree_lifecycle() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main");
        init_repo(&main);
        let wt = dir.path().join("task");

        git.create_worktree(&main, &wt, "task", &WorktreeStart::Head)
            .unwrap();
        assert!(git.is_worktree(&wt));
        assert!(!git.is_worktree(&main));
        assert_eq!(
            git.main_repo_path(&wt).unwrap(),
            main.canonicalize().unwrap()
        );
        assert!(git.local_branch_exists(&main, "task").unwrap());
        assert!(!git.has_uncommitted_changes(&wt).unwrap());

        std::fs::write(wt.join("README.md"), "changed\n").unwrap();
        assert!(git.has_uncommitted_changes(&wt).unwrap());
        std::fs::write(wt.join("untracked.txt"), "x").unwrap();

        git.remove_worktree(&main, &wt).unwrap();
        assert!(!wt.exists());
    }

    #[test]
    fn untracked_files_are_not_changes() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();
        assert!(!git.has_uncommitted_changes(dir.path()).unwrap());
    }

    #[test]
    fn missing_registered_worktree_is_classified() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main");
        init_repo(&main);
        let wt = dir.path().join("task");

        git.create_worktree(&main, &wt, "task", &WorktreeStart::Head)
            .unwrap();
        std::fs::remove_dir_all(&wt).unwrap();

        let err = git
            .create_worktree(&main, &wt, "task", &WorktreeStart::Local)
            .unwrap_err();
        assert!(matches!(err, Error::WorktreeRegistered { .. }), "{err}");

        git.prune_worktrees(&main).unwrap();
        git.create_worktree(&main, &wt, "task", &WorktreeStart::Local)
            .unwrap();
        assert!(git.is_worktree(&wt));
    }

    #[test]
    fn remote_branch_visible_after_fetch() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        let origin = dir.path().join("origin");
        init_repo(&origin);
        let local = dir.path().join("local");
        git.clone_repo(
            &CloneOptions {
                url: origin.to_string_lossy().into_owned(),
                target: local.clone(),
                create_branch: None,
                depth: None,
            },
            &NoProgress,
        )
        .unwrap();

        sh(&origin, &["branch", "shared"]);
        assert!(!git.remote_branch_exists(&local, "shared").unwrap());
        git.fetch_remote(&local, DEFAULT_REMOTE).unwrap();
        assert!(git.remote_branch_exists(&local, "shared").unwrap());
        assert!(!git.local_branch_exists(&local, "shared").unwrap());

        git.checkout_remote_tracking(&local, "shared", DEFAULT_REMOTE)
            .unwrap();
        assert!(git.local_branch_exists(&local, "shared").unwrap());
    }

    #[test]
    fn fetch_from_unknown_remote_fails() {
        let Some(git) = git() else { return };
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        assert!(git.fetch_remote(dir.path(), "nope").is_err());
    }
}
