use crate::app::{self, App};
use crate::output::print_json;
use crate::prompt::{StderrProgress, TerminalConfirm};
use anyhow::{bail, Context, Result};
use clap::Args;
use devplan_client::repos::{resolve_repos, select_repo};
use devplan_client::specs::{persist_task_context, task_specs_dir};
use devplan_client::types::{Document, ProjectsResponse};
use devplan_client::{ServiceClient, Syncer, DEFAULT_SYNC_INTERVAL};
use devplan_core::git::SystemGit;
use devplan_core::recent_activity::SOURCE_SPEC_START;
use devplan_core::remote_url::is_url;
use devplan_core::types::{DocRef, Target};
use devplan_core::workspace::{FeaturePrepareRequest, Orchestrator, PrepareRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Args)]
pub struct StartArgs {
    /// Company id (default: the last one used)
    #[arg(short, long)]
    company: Option<i64>,

    /// Task to start; clones one repository into a worktree
    #[arg(short, long, conflicts_with = "feature", required_unless_present = "feature")]
    task: Option<String>,

    /// Feature to start; clones every referenced repository into one folder
    #[arg(short, long)]
    feature: Option<String>,

    /// Branch to work on (default: derived from the task or feature title)
    #[arg(short, long)]
    branch: Option<String>,

    /// Assistant the workspace is prepared for; allows reusing an existing one
    #[arg(short = 'i', long = "ide")]
    assistant: Option<String>,

    /// Use an existing checkout instead of cloning
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Repository name or URL, overriding the one on the task
    #[arg(short, long)]
    repo: Option<String>,

    /// Do not ask before reusing an existing workspace
    #[arg(short, long)]
    yes: bool,

    /// Keep uploading generated specs until interrupted
    #[arg(long)]
    watch: bool,
}

#[derive(Serialize)]
struct StartOutput {
    path: PathBuf,
    branch: String,
    repos: Vec<String>,
    reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    specs_dir: Option<PathBuf>,
}

pub fn run(app: &App, args: StartArgs, json: bool) -> Result<()> {
    let company_id = app.company_id(args.company)?;
    let rt = app::runtime()?;
    let client = app.client()?;
    let git = SystemGit::locate()?;
    let orchestrator = Orchestrator::new(app.layout()?, git, Arc::clone(&app.prefs))
        .with_confirm(Arc::new(TerminalConfirm))
        .with_progress(Arc::new(StderrProgress));

    let (activity_id, out) = match (&args.task, &args.feature) {
        (Some(task_id), _) => (
            task_id.clone(),
            start_task(app, &rt, &client, &orchestrator, company_id, task_id, &args)?,
        ),
        (None, Some(feature_id)) => (
            feature_id.clone(),
            start_feature(&rt, &client, &orchestrator, company_id, feature_id, &args)?,
        ),
        (None, None) => bail!("exactly one of --task or --feature is required"),
    };

    if let Err(e) = app.activity_store().record_task_activity(&activity_id, SOURCE_SPEC_START) {
        debug!(id = %activity_id, error = %e, "failed to record recent activity");
    }
    remember(app, company_id, args.assistant.as_deref());

    if json {
        print_json(&out)?;
    } else {
        let verb = if out.reused { "Reusing" } else { "Prepared" };
        eprintln!("{verb} workspace on branch {}", out.branch);
        if let Some(dir) = &out.specs_dir {
            eprintln!("Task specs in {}", dir.display());
        }
        println!("{}", out.path.display());
    }

    if args.watch {
        match (&args.task, &out.specs_dir) {
            (Some(task_id), Some(dir)) => watch(&rt, client, company_id, task_id, dir)?,
            _ => eprintln!("--watch only applies to tasks; not syncing"),
        }
    }
    Ok(())
}

fn remember(app: &App, company_id: i64, assistant: Option<&str>) {
    if let Err(e) = app.prefs.set_last_company_id(company_id) {
        debug!(error = %e, "failed to save last company");
    }
    if let Some(assistant) = assistant.filter(|a| !a.is_empty()) {
        if let Err(e) = app.prefs.set_last_assistant(assistant) {
            debug!(error = %e, "failed to save last assistant");
        }
    }
}

fn fetch_document(
    rt: &Runtime,
    client: &Arc<dyn ServiceClient>,
    company_id: i64,
    id: &str,
) -> Result<Document> {
    rt.block_on(client.get_document(company_id, id))
        .with_context(|| format!("failed to load document {id}"))?
        .document
        .with_context(|| format!("document {id} not found"))
}

fn project_ref(projects: &ProjectsResponse, project_id: &str) -> DocRef {
    match projects.find_project(project_id) {
        Some(p) => p.project.doc_ref(),
        None => DocRef::new(project_id, project_id),
    }
}

fn start_task(
    app: &App,
    rt: &Runtime,
    client: &Arc<dyn ServiceClient>,
    orchestrator: &Orchestrator<SystemGit>,
    company_id: i64,
    task_id: &str,
    args: &StartArgs,
) -> Result<StartOutput> {
    let task = fetch_document(rt, client, company_id, task_id)?;
    let projects = rt
        .block_on(client.get_company_projects(company_id))
        .context("failed to load projects")?;
    let feature = projects
        .find_project(&task.project_id)
        .and_then(|p| p.find_doc(&task.parent_id))
        .filter(|d| d.is_feature())
        .map(Document::doc_ref);
    let target = Target::task(
        company_id,
        project_ref(&projects, &task.project_id),
        feature,
        task.doc_ref(),
    );
    if let Err(e) = app.prefs.set_last_project_id(&task.project_id) {
        debug!(error = %e, "failed to save last project");
    }

    if let Some(path) = &args.path {
        let prepared = orchestrator
            .adopt(path, &target, args.branch.as_deref())
            .with_context(|| format!("failed to use {}", path.display()))?;
        let specs_dir = write_task_context(rt, client, company_id, task_id, &task, &prepared.path)?;
        return Ok(StartOutput {
            repos: vec![prepared.repo.full_name],
            path: prepared.path,
            branch: prepared.branch,
            reused: true,
            specs_dir: Some(specs_dir),
        });
    }

    let details = task.parsed_details().context("malformed task details")?;
    let hint = args.repo.clone().unwrap_or(details.repo_name);
    let repos = if is_url(&hint) {
        Vec::new()
    } else {
        rt.block_on(client.get_all_repos(company_id))
            .context("failed to list repositories")?
    };
    let repo = select_repo(&hint, &repos, &app.prefs.git_urls())?;
    if is_url(&hint) {
        app.prefs.add_git_url(hint.trim())?;
    }

    let prepared = orchestrator.prepare(&PrepareRequest {
        target,
        repo,
        branch: args.branch.clone(),
        assistant: args.assistant.clone(),
        yes: args.yes,
    })?;
    let specs_dir = write_task_context(rt, client, company_id, task_id, &task, &prepared.path)?;
    Ok(StartOutput {
        repos: vec![prepared.repo.full_name],
        path: prepared.path,
        branch: prepared.branch,
        reused: prepared.reused,
        specs_dir: Some(specs_dir),
    })
}

/// Resolve the task's spec directory inside `workspace` and write the task
/// description there. A manifest that cannot be loaded falls back to the
/// sidecar directory.
fn write_task_context(
    rt: &Runtime,
    client: &Arc<dyn ServiceClient>,
    company_id: i64,
    task_id: &str,
    task: &Document,
    workspace: &Path,
) -> Result<PathBuf> {
    let task_dir = match rt.block_on(client.get_task_specs(company_id, task_id)) {
        Ok(manifest) => manifest.task_dir(task_id).map(str::to_string),
        Err(e) => {
            warn!(task = %task_id, error = %e, "failed to load spec manifest");
            None
        }
    };
    let dir = task_specs_dir(workspace, task_dir.as_deref());
    persist_task_context(&dir, &task.title, &task.content)
        .with_context(|| format!("failed to write task context to {}", dir.display()))?;
    Ok(dir)
}

fn start_feature(
    rt: &Runtime,
    client: &Arc<dyn ServiceClient>,
    orchestrator: &Orchestrator<SystemGit>,
    company_id: i64,
    feature_id: &str,
    args: &StartArgs,
) -> Result<StartOutput> {
    let feature = fetch_document(rt, client, company_id, feature_id)?;
    let details = feature.parsed_details().context("malformed feature details")?;
    if details.repo_names.is_empty() {
        bail!("feature has no repositories configured");
    }

    if let Some(path) = &args.path {
        return Ok(StartOutput {
            path: path.clone(),
            branch: String::new(),
            repos: details.repo_names,
            reused: true,
            specs_dir: None,
        });
    }

    let projects = rt
        .block_on(client.get_company_projects(company_id))
        .context("failed to load projects")?;
    let all = rt
        .block_on(client.get_all_repos(company_id))
        .context("failed to list repositories")?;
    let repos = resolve_repos(&details.repo_names, &all)?;
    let target = Target::feature(
        company_id,
        project_ref(&projects, &feature.project_id),
        feature.doc_ref(),
    );

    let prepared = orchestrator.prepare_feature(&FeaturePrepareRequest {
        target,
        repos,
        branch: args.branch.clone(),
        assistant: args.assistant.clone(),
        yes: args.yes,
    })?;
    eprintln!("All {} repositories ready", prepared.repos.len());
    Ok(StartOutput {
        repos: prepared
            .repos
            .into_iter()
            .map(|r| r.repo.full_name)
            .collect(),
        path: prepared.path,
        branch: prepared.branch,
        reused: false,
        specs_dir: None,
    })
}

fn watch(
    rt: &Runtime,
    client: Arc<dyn ServiceClient>,
    company_id: i64,
    task_id: &str,
    dir: &Path,
) -> Result<()> {
    let syncer = Arc::new(Syncer::new(client, company_id, task_id, dir, DEFAULT_SYNC_INTERVAL));
    eprintln!("Watching {} for specs (Ctrl-C to stop)", dir.display());
    rt.block_on(async move {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&syncer).run_background(cancel.clone()));
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        cancel.cancel();
        handle.await.context("spec sync task failed")?;
        let last = syncer.trigger_once().await;
        eprintln!("Final sync: {} uploaded, {} failed", last.uploaded, last.failed);
        Ok::<(), anyhow::Error>(())
    })
}
