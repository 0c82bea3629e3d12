use crate::app::{self, App};
use crate::output::print_json;
use anyhow::{Context, Result};
use clap::Args;
use devplan_client::types::{WorklogItem, WorklogScope, WORKLOG_STAGES};
use devplan_client::WorklogReporter;
use std::sync::Arc;

#[derive(Args)]
pub struct WorklogArgs {
    /// Company id (default: the last one used)
    #[arg(short, long)]
    company: Option<i64>,

    /// Task the work belongs to
    #[arg(short, long, conflicts_with = "feature", required_unless_present = "feature")]
    task: Option<String>,

    /// Feature the work belongs to
    #[arg(short, long)]
    feature: Option<String>,

    /// What was done
    #[arg(short, long)]
    message: String,

    /// Kind of work, e.g. coding, review, planning
    #[arg(long = "type", value_name = "TYPE")]
    kind: Option<String>,

    /// Stage of the work
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(WORKLOG_STAGES.iter().copied()))]
    stage: Option<String>,

    /// Short description of the action taken
    #[arg(long)]
    action: Option<String>,

    /// Name of the agent doing the work
    #[arg(long)]
    agent: Option<String>,
}

pub fn run(app: &App, args: WorklogArgs, json: bool) -> Result<()> {
    let company_id = app.company_id(args.company)?;
    let scope = match (args.task, args.feature) {
        (Some(task), _) => WorklogScope::Task(task),
        (None, Some(feature)) => WorklogScope::Feature(feature),
        (None, None) => anyhow::bail!("exactly one of --task or --feature is required"),
    };

    let mut item = WorklogItem::new(company_id, scope, args.message);
    if let Some(kind) = &args.kind {
        item = item.with_type(kind);
    }
    if let Some(stage) = args.stage {
        item = item.with_stage(stage);
    }
    if let Some(action) = args.action {
        item = item.with_action(action);
    }
    if let Some(agent) = args.agent {
        item = item.with_agent(agent);
    }

    let reporter = WorklogReporter::new(app.client()?, Arc::new(app.activity_store()));
    app::runtime()?
        .block_on(reporter.report(&item))
        .context("failed to submit worklog")?;

    if json {
        print_json(&item)?;
    } else {
        println!("Worklog recorded for {}", item.activity_id());
    }
    Ok(())
}
