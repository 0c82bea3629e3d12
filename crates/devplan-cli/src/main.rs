mod app;
mod cmd;
mod output;
mod prompt;

use app::App;
use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, start::StartArgs, sync::SyncArgs, worklog::WorklogArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "devplan",
    about = "Prepare git workspaces for devplan tasks and features, and keep their specs in sync",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration directory (default: ~/.devplan)
    #[arg(long, global = true, env = "DEVPLAN_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// devplan service URL
    #[arg(long, global = true, env = "DEVPLAN_API_URL")]
    api_url: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a workspace for a task or feature
    Start(StartArgs),

    /// List prepared workspaces, most recently active first
    List,

    /// Remove a prepared workspace
    Clean {
        /// Workspace as `project/name`, bare name or path
        dir: String,

        /// Remove even with uncommitted changes, without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Upload generated task specs to the service
    Sync(SyncArgs),

    /// Submit a worklog entry for a task or feature
    Worklog(WorklogArgs),

    /// Show or change preferences
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if std::env::var_os("DEVPLAN_DEBUG").is_some() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = App::load(cli.config_dir, cli.api_url).and_then(|app| match cli.command {
        Commands::Start(args) => cmd::start::run(&app, args, cli.json),
        Commands::List => cmd::list::run(&app, cli.json),
        Commands::Clean { dir, yes } => cmd::clean::run(&app, &dir, yes),
        Commands::Sync(args) => cmd::sync::run(&app, args, cli.json),
        Commands::Worklog(args) => cmd::worklog::run(&app, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&app, subcommand, cli.json),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
