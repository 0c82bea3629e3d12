use crate::app::{self, App};
use crate::output::print_json;
use anyhow::{bail, Context, Result};
use clap::Args;
use devplan_client::specs::task_specs_dir;
use devplan_client::{SyncResult, Syncer};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct SyncArgs {
    /// Company id (default: the last one used)
    #[arg(short, long)]
    company: Option<i64>,

    /// Task whose specs are uploaded
    #[arg(short, long)]
    task: String,

    /// Directory holding the specs (default: the task's spec directory under
    /// the current directory, as reported by the service)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Seconds between runs
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Run once and exit
    #[arg(long)]
    once: bool,
}

#[derive(Serialize)]
struct SyncSummary {
    uploaded: usize,
    skipped: i64,
    failed: usize,
    errors: Vec<String>,
}

impl From<&SyncResult> for SyncSummary {
    fn from(r: &SyncResult) -> Self {
        Self {
            uploaded: r.uploaded,
            skipped: r.skipped,
            failed: r.failed,
            errors: r.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

pub fn run(app: &App, args: SyncArgs, json: bool) -> Result<()> {
    let company_id = app.company_id(args.company)?;
    let client = app.client()?;
    let rt = app::runtime()?;
    let dir = match args.dir {
        Some(dir) => dir,
        None => {
            let manifest = rt
                .block_on(client.get_task_specs(company_id, &args.task))
                .context("failed to load spec manifest")?;
            task_specs_dir(&std::env::current_dir()?, manifest.task_dir(&args.task))
        }
    };
    if !dir.is_dir() {
        bail!("spec directory {} does not exist", dir.display());
    }
    let syncer = Arc::new(Syncer::new(
        client,
        company_id,
        &args.task,
        &dir,
        Duration::from_secs(args.interval),
    ));

    if args.once {
        let result = rt.block_on(syncer.trigger_once());
        let summary = SyncSummary::from(&result);
        if json {
            print_json(&summary)?;
        } else {
            println!(
                "{} uploaded, {} unchanged, {} failed",
                summary.uploaded, summary.skipped, summary.failed
            );
            for e in &summary.errors {
                eprintln!("  {e}");
            }
        }
        if result.failed > 0 {
            bail!("{} spec(s) failed to sync", result.failed);
        }
        return Ok(());
    }

    eprintln!(
        "Syncing {} every {}s (Ctrl-C to stop)",
        dir.display(),
        syncer.interval().as_secs()
    );
    rt.block_on(async move {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&syncer).run_background(cancel.clone()));
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        cancel.cancel();
        handle.await.context("spec sync task failed")?;
        Ok::<(), anyhow::Error>(())
    })
}
