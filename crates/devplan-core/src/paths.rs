use crate::error::{Error, Result};
use crate::prefs::Preferences;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_DIR: &str = ".devplan";
pub const DEFAULT_WORKSPACE_DIR: &str = "devplan/workspace";
pub const FEATURES_DIR: &str = "features";

pub const MAX_SLUG_LEN: usize = 30;

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// Turn a display title into a directory-safe slug.
///
/// Lowercases, maps whitespace to `_`, drops anything outside `[a-z0-9_]`
/// and truncates to [`MAX_SLUG_LEN`]. Applying it twice is a no-op.
pub fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .take(MAX_SLUG_LEN)
        .collect()
}

/// Directory name for a repository: the last segment of `owner/name`.
pub fn repo_slug(full_name: &str) -> &str {
    full_name
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(full_name)
}

// ---------------------------------------------------------------------------
// Config dir
// ---------------------------------------------------------------------------

pub fn home_dir() -> Result<PathBuf> {
    home::home_dir().ok_or_else(|| {
        Error::ConfigUnavailable("home directory not found: set HOME environment variable".into())
    })
}

/// `$HOME/.devplan`, where preferences and the activity journal live.
pub fn default_config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(CONFIG_DIR))
}

// ---------------------------------------------------------------------------
// Workspace layout
// ---------------------------------------------------------------------------

/// Canonical on-disk layout under a workspace root:
///
/// ```text
/// <root>/features/<project>/<repo>/            main clone
/// <root>/features/<project>/<task>/            worktree
/// <root>/features/<project>/<feature>/<repo>/  per-repo worktree of a feature
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root from preferences, falling back to
    /// `$HOME/devplan/workspace`. The fallback is saved so later runs agree
    /// even if `$HOME` changes.
    pub fn resolve(prefs: &Preferences) -> Result<Self> {
        if let Some(dir) = prefs.workspace_dir() {
            return Ok(Self::new(dir));
        }
        let root = home_dir()?.join(DEFAULT_WORKSPACE_DIR);
        prefs.set_workspace_dir(&root)?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn features_dir(&self) -> PathBuf {
        self.root.join(FEATURES_DIR)
    }

    pub fn project_features_dir(&self, project_slug: &str) -> PathBuf {
        self.features_dir().join(project_slug)
    }

    pub fn main_repo_dir(&self, project_slug: &str, repo_slug: &str) -> PathBuf {
        self.project_features_dir(project_slug).join(repo_slug)
    }

    pub fn worktree_dir(&self, project_slug: &str, task_slug: &str) -> PathBuf {
        self.project_features_dir(project_slug).join(task_slug)
    }

    pub fn feature_workspace_dir(&self, project_slug: &str, feature_slug: &str) -> PathBuf {
        self.project_features_dir(project_slug).join(feature_slug)
    }

    pub fn feature_repo_dir(&self, project_slug: &str, feature_slug: &str, repo_slug: &str) -> PathBuf {
        self.feature_workspace_dir(project_slug, feature_slug)
            .join(repo_slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use tempfile::TempDir;

    #[test]
    fn sanitize_basic() {
        assert_eq!(sanitize_name("My Project"), "my_project");
        assert_eq!(sanitize_name("Add Login!"), "add_login");
        assert_eq!(sanitize_name("feat: OAuth2 (v2)"), "feat_oauth2_v2");
        assert_eq!(sanitize_name("tab\there"), "tab_here");
        assert_eq!(sanitize_name(""), "");
    }

    #[test]
    fn sanitize_drops_non_ascii() {
        assert_eq!(sanitize_name("Café Ünïcode"), "caf_ncode");
    }

    #[test]
    fn sanitize_is_stable() {
        let re = Regex::new(r"^[a-z0-9_]{0,30}$").unwrap();
        let inputs = [
            "My Project",
            "A very long task title that definitely exceeds the limit",
            "   leading and trailing   ",
            "CAPS_and-dashes.and.dots",
            "日本語のタイトル 123",
            "x".repeat(100).as_str(),
            "!!!",
        ]
        .map(str::to_string);
        for s in inputs {
            let once = sanitize_name(&s);
            assert!(re.is_match(&once), "{s:?} -> {once:?}");
            assert_eq!(sanitize_name(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn sanitize_truncates_after_filtering() {
        let long = "ab-".repeat(20);
        let slug = sanitize_name(&long);
        assert_eq!(slug.len(), MAX_SLUG_LEN);
        assert!(slug.chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn repo_slug_takes_last_segment() {
        assert_eq!(repo_slug("o/r"), "r");
        assert_eq!(repo_slug("o/sub/r"), "r");
        assert_eq!(repo_slug("r"), "r");
    }

    #[test]
    fn layout_paths() {
        let layout = Layout::new("/ws");
        assert_eq!(layout.features_dir(), PathBuf::from("/ws/features"));
        assert_eq!(
            layout.main_repo_dir("my_project", "r"),
            PathBuf::from("/ws/features/my_project/r")
        );
        assert_eq!(
            layout.worktree_dir("my_project", "add_login"),
            PathBuf::from("/ws/features/my_project/add_login")
        );
        assert_eq!(
            layout.feature_repo_dir("my_project", "checkout", "api"),
            PathBuf::from("/ws/features/my_project/checkout/api")
        );
    }

    #[test]
    fn resolve_uses_preference() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::open(dir.path()).unwrap();
        prefs.set_workspace_dir(Path::new("/custom/ws")).unwrap();
        let layout = Layout::resolve(&prefs).unwrap();
        assert_eq!(layout.root(), Path::new("/custom/ws"));
    }
}
