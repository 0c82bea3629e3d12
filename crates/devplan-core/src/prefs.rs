//! Persistent user preferences.
//!
//! Stored as a flat JSON object in `<config-dir>/config.json`. Any key can be
//! overridden for the current process with a `DEVPLAN_<KEY>` environment
//! variable (e.g. `DEVPLAN_WORKSPACE_DIR`). Overrides are read-only; setters
//! always write to the file.

use crate::error::Result;
use crate::io;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CONFIG_FILE: &str = "config.json";
pub const ENV_PREFIX: &str = "DEVPLAN_";

pub const KEY_WORKSPACE_DIR: &str = "workspace_dir";
pub const KEY_LAST_COMPANY_ID: &str = "last_company_id";
pub const KEY_LAST_PROJECT_ID: &str = "last_project_id";
pub const KEY_LAST_GIT_PROTOCOL: &str = "last_git_protocol";
pub const KEY_LAST_ASSISTANT: &str = "last_assistant";
pub const KEY_API_KEY: &str = "apikey";
pub const KEY_GIT_URLS: &str = "git_urls";
pub const KEY_CLONE_DEPTH: &str = "clone_depth";

/// Transport used for the last successful GitHub clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GitProtocol {
    #[default]
    Https,
    Ssh,
}

impl GitProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            GitProtocol::Https => "https",
            GitProtocol::Ssh => "ssh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "https" => Some(GitProtocol::Https),
            "ssh" => Some(GitProtocol::Ssh),
            _ => None,
        }
    }
}

impl std::fmt::Display for GitProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl Preferences {
    /// Load preferences from `config_dir`. A missing or empty file yields an
    /// empty store; the file is created on the first write.
    pub fn open(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        let values = match std::fs::read_to_string(&path) {
            Ok(s) if s.trim().is_empty() => Map::new(),
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn env_override(key: &str) -> Option<String> {
        let var = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(v) = Self::env_override(key) {
            return Some(v);
        }
        match self.lookup(key)? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        if let Some(v) = Self::env_override(key) {
            return v.trim().parse().ok();
        }
        match self.lookup(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        if let Some(v) = Self::env_override(key) {
            return v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        match self.lookup(key) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Set `key` and persist the whole store atomically.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        let data = serde_json::to_vec_pretty(&*values)?;
        io::atomic_replace(&self.path, &data)
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, Value::String(value.to_string()))
    }

    pub fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set(key, Value::from(value))
    }

    // ---------------------------------------------------------------------------
    // Typed accessors
    // ---------------------------------------------------------------------------

    pub fn workspace_dir(&self) -> Option<PathBuf> {
        self.get_string(KEY_WORKSPACE_DIR).map(PathBuf::from)
    }

    pub fn set_workspace_dir(&self, dir: &Path) -> Result<()> {
        self.set_string(KEY_WORKSPACE_DIR, &dir.to_string_lossy())
    }

    /// Defaults to HTTPS when unset or unrecognized.
    pub fn last_git_protocol(&self) -> GitProtocol {
        self.get_string(KEY_LAST_GIT_PROTOCOL)
            .and_then(|s| GitProtocol::parse(&s))
            .unwrap_or_default()
    }

    pub fn set_last_git_protocol(&self, protocol: GitProtocol) -> Result<()> {
        self.set_string(KEY_LAST_GIT_PROTOCOL, protocol.as_str())
    }

    pub fn last_company_id(&self) -> Option<i64> {
        self.get_i64(KEY_LAST_COMPANY_ID)
    }

    pub fn set_last_company_id(&self, id: i64) -> Result<()> {
        self.set_i64(KEY_LAST_COMPANY_ID, id)
    }

    pub fn last_project_id(&self) -> Option<String> {
        self.get_string(KEY_LAST_PROJECT_ID)
    }

    pub fn set_last_project_id(&self, id: &str) -> Result<()> {
        self.set_string(KEY_LAST_PROJECT_ID, id)
    }

    pub fn last_assistant(&self) -> Option<String> {
        self.get_string(KEY_LAST_ASSISTANT)
    }

    pub fn set_last_assistant(&self, assistant: &str) -> Result<()> {
        self.set_string(KEY_LAST_ASSISTANT, assistant)
    }

    pub fn api_key(&self) -> Option<String> {
        self.get_string(KEY_API_KEY)
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        self.set_string(KEY_API_KEY, key)
    }

    /// Repository URLs the user entered by hand, in insertion order.
    pub fn git_urls(&self) -> Vec<String> {
        self.get_strings(KEY_GIT_URLS)
    }

    /// Remember a manually entered repository URL. Returns false if it was
    /// already known.
    pub fn add_git_url(&self, url: &str) -> Result<bool> {
        let mut urls = self.git_urls();
        if urls.iter().any(|u| u == url) {
            return Ok(false);
        }
        urls.push(url.to_string());
        self.set(KEY_GIT_URLS, Value::from(urls))?;
        Ok(true)
    }

    /// Shallow clone depth; `None` means a full clone.
    pub fn clone_depth(&self) -> Option<u32> {
        self.get_i64(KEY_CLONE_DEPTH)
            .filter(|d| *d > 0)
            .and_then(|d| u32::try_from(d).ok())
    }
}
