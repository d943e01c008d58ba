//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use kbsync_core::SyncEngine;
use kbsync_shared::{
    AppConfig, RoutingStrategy, SourceDocument, SyncAction, init_config, load_config,
    load_config_from,
};
use kbsync_state::StateStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbsync — synchronize fetched documentation into knowledge bases.
#[derive(Parser)]
#[command(
    name = "kbsync",
    version,
    about = "Push fetched documentation pages into remote knowledge bases, syncing only what changed.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one sync pass over fetched documents.
    Run {
        /// JSON-lines file of fetched documents ({"url": ..., "content": ...}).
        input: PathBuf,

        /// Config file path (defaults to ~/.kbsync/kbsync.toml).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the routing strategy: primary, all, or round_robin.
        #[arg(short, long)]
        strategy: Option<String>,

        /// Override the state file location.
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Show the persisted sync state.
    Status {
        /// Config file path (defaults to ~/.kbsync/kbsync.toml).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the state file location.
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbsync=info",
        1 => "kbsync=debug",
        _ => "kbsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            input,
            config,
            strategy,
            state,
        } => cmd_run(&input, config.as_deref(), strategy.as_deref(), state.as_deref()).await,
        Command::Status { config, state } => cmd_status(config.as_deref(), state.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    input: &Path,
    config_path: Option<&Path>,
    strategy: Option<&str>,
    state: Option<&Path>,
) -> Result<()> {
    let mut app_config = load_app_config(config_path)?;

    if let Some(strategy) = strategy {
        app_config.sync.strategy = strategy.parse::<RoutingStrategy>()?;
    }
    if let Some(state) = state {
        app_config.sync.state_file = state.to_string_lossy().into_owned();
    }

    let sync_config = app_config.sync_config()?;
    let documents = read_documents(input)?;

    info!(
        input = %input.display(),
        documents = documents.len(),
        strategy = %sync_config.strategy,
        targets = sync_config.knowledge_bases.len(),
        "starting sync run"
    );

    let engine = SyncEngine::new(sync_config)?;
    let summary = engine.run(&documents).await?;

    println!();
    println!("  Sync run {}", summary.run_id);
    println!("  Created: {}", summary.counts.created);
    println!("  Updated: {}", summary.counts.updated);
    println!("  Skipped: {}", summary.counts.skipped);
    println!("  Failed:  {}", summary.counts.failed);
    println!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());

    for result in summary.results.iter().filter(|r| r.action == SyncAction::Failed) {
        println!(
            "    failed: {} -> {} ({})",
            result.url,
            result.target_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!();

    match summary.fatal {
        Some(reason) => Err(eyre!("run aborted: {reason}")),
        None => Ok(()),
    }
}

async fn cmd_status(config_path: Option<&Path>, state: Option<&Path>) -> Result<()> {
    let app_config = load_app_config(config_path)?;
    let state_file = state
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&app_config.sync.state_file));

    let state = StateStore::new(&state_file).load()?;

    println!();
    println!("  State file:  {}", state_file.display());
    println!("  Documents:   {}", state.hashes.len());
    println!("  Last update: {}", state.last_update.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "  Last run:    {} created, {} updated, {} skipped, {} failed",
        state.last_summary.created,
        state.last_summary.updated,
        state.last_summary.skipped,
        state.last_summary.failed,
    );
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config file at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Input loading
// ---------------------------------------------------------------------------

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Read fetched documents from a JSON-lines file; blank lines are ignored.
fn read_documents(path: &Path) -> Result<Vec<SourceDocument>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read input file {}: {e}", path.display()))?;

    let mut documents = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let document: SourceDocument = serde_json::from_str(line)
            .map_err(|e| eyre!("invalid document on line {}: {e}", number + 1))?;
        documents.push(document);
    }

    if documents.is_empty() {
        return Err(eyre!("no documents found in {}", path.display()));
    }

    Ok(documents)
}
