use crate::app::App;
use crate::output::{print_fields, print_json};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Set the directory workspaces are created in
    SetWorkspace {
        /// Workspace root; created if missing
        dir: PathBuf,
    },

    /// Store the API key used to talk to the service
    SetApiKey {
        key: String,
    },
}

#[derive(Serialize)]
struct ConfigView {
    config_dir: PathBuf,
    workspace_dir: PathBuf,
    api_url: String,
    api_key_set: bool,
    last_company_id: Option<i64>,
    last_project_id: Option<String>,
    last_assistant: Option<String>,
    git_protocol: String,
    git_urls: Vec<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(app: &App, subcmd: ConfigSubcommand, json: bool) -> Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(app, json),
        ConfigSubcommand::SetWorkspace { dir } => set_workspace(app, &dir),
        ConfigSubcommand::SetApiKey { key } => set_api_key(app, &key),
    }
}

fn show(app: &App, json: bool) -> Result<()> {
    let prefs = &app.prefs;
    let view = ConfigView {
        config_dir: app.config_dir().to_path_buf(),
        workspace_dir: app.layout()?.root().to_path_buf(),
        api_url: app.base_url(),
        api_key_set: prefs.api_key().is_some(),
        last_company_id: prefs.last_company_id(),
        last_project_id: prefs.last_project_id(),
        last_assistant: prefs.last_assistant(),
        git_protocol: prefs.last_git_protocol().to_string(),
        git_urls: prefs.git_urls(),
    };
    if json {
        return print_json(&view);
    }
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".into());
    print_fields(&[
        ("config dir", view.config_dir.display().to_string()),
        ("workspace", view.workspace_dir.display().to_string()),
        ("api url", view.api_url),
        ("api key", if view.api_key_set { "set" } else { "not set" }.to_string()),
        ("company", or_dash(view.last_company_id.map(|c| c.to_string()))),
        ("project", or_dash(view.last_project_id)),
        ("assistant", or_dash(view.last_assistant)),
        ("git protocol", view.git_protocol),
        ("extra git urls", view.git_urls.join(", ")),
    ]);
    Ok(())
}

fn set_workspace(app: &App, dir: &std::path::Path) -> Result<()> {
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    app.prefs.set_workspace_dir(&dir)?;
    println!("Workspace directory set to {}", dir.display());
    Ok(())
}

fn set_api_key(app: &App, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        bail!("API key must not be empty");
    }
    app.prefs.set_api_key(key)?;
    println!("API key saved to {}", app.prefs.path().display());
    Ok(())
}
