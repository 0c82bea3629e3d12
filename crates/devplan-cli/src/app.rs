use anyhow::{Context, Result};
use devplan_client::{http, HttpClient, ServiceClient, StaticToken};
use devplan_core::paths::{self, Layout};
use devplan_core::prefs::Preferences;
use devplan_core::recent_activity::RecentActivityStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Preferences and service access shared by every command.
pub struct App {
    config_dir: PathBuf,
    api_url: Option<String>,
    pub prefs: Arc<Preferences>,
}

impl App {
    pub fn load(config_dir: Option<PathBuf>, api_url: Option<String>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => paths::default_config_dir()?,
        };
        let prefs = Preferences::open(&config_dir)
            .with_context(|| format!("failed to read preferences in {}", config_dir.display()))?;
        Ok(Self {
            config_dir,
            api_url,
            prefs: Arc::new(prefs),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn layout(&self) -> Result<Layout> {
        Layout::resolve(&self.prefs).context("failed to resolve the workspace directory")
    }

    pub fn activity_store(&self) -> RecentActivityStore {
        RecentActivityStore::new(&self.config_dir)
    }

    pub fn base_url(&self) -> String {
        http::resolve_base_url(self.api_url.as_deref())
    }

    pub fn client(&self) -> Result<Arc<dyn ServiceClient>> {
        let key = self.prefs.api_key().context(
            "no API key configured: run `devplan config set-api-key <key>` or set DEVPLAN_APIKEY",
        )?;
        let client = HttpClient::new(self.base_url(), Arc::new(StaticToken::new(key)))?
            .with_version(env!("CARGO_PKG_VERSION"));
        Ok(Arc::new(client))
    }

    /// Company from the flag, else the last one used.
    pub fn company_id(&self, flag: Option<i64>) -> Result<i64> {
        flag.or_else(|| self.prefs.last_company_id())
            .context("no company given: pass --company")
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
