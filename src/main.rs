use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use debugpilot::state::Coordinate;

mod cmd;

#[derive(Parser)]
#[command(name = "debugpilot")]
#[command(version, about = "Recursive root-cause localization for failing tests")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding .debugpilot/pilot.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// `<project> <bug>` identifying one debugging session.
#[derive(Args, Clone, Debug)]
pub struct SessionArgs {
    pub project: String,
    pub bug: String,
}

/// Reasoning service selection.
#[derive(Args, Clone, Debug, Default)]
pub struct OracleArgs {
    /// Model name (overrides pilot.toml and PILOT_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// OpenAI-compatible endpoint (overrides pilot.toml and PILOT_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Answer requests from a JSON array of canned replies instead of the network
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,
}

/// Force one decision and stop after the phase that takes it.
#[derive(Args, Clone, Debug, Default)]
#[group(multiple = false)]
pub struct OverrideArgs {
    /// Block id Selection must choose
    #[arg(long)]
    pub block: Option<usize>,

    /// Recorded call (1-based, in listing order) Localization must step into
    #[arg(long)]
    pub step_into: Option<usize>,

    /// Make Localization report the current block as the root cause
    #[arg(long)]
    pub root_cause: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start or resume an analysis; prints the result as JSON
    Run {
        #[command(flatten)]
        session: SessionArgs,
        /// Resume after this checkpoint, e.g. 1,2,1,7
        coord: Option<Coordinate>,
        #[command(flatten)]
        overrides: OverrideArgs,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Delete every checkpoint after COORD (all of them without one)
    Rewind {
        #[command(flatten)]
        session: SessionArgs,
        coord: Option<Coordinate>,
    },
    /// Discard an iteration and rerun from the last reliable checkpoint
    Reject {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        depth: u32,
        #[arg(long)]
        iteration: u32,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Add a hint to the context at COORD and rerun from there
    Insight {
        #[command(flatten)]
        session: SessionArgs,
        coord: Coordinate,
        text: String,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Replace an iteration's prediction and rerun its comparison
    OracleFix {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        depth: u32,
        #[arg(long)]
        iteration: u32,
        /// JSON array of {"name", "analysis", "expected"} objects
        #[arg(value_name = "JSON")]
        items: String,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Replace an iteration's block list and rerun its selection
    PartitionFix {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        depth: u32,
        #[arg(long)]
        iteration: u32,
        /// JSON array of {"id", "start_line", "end_line", "comment"} objects
        #[arg(value_name = "JSON")]
        blocks: String,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Ask a follow-up question about the conversation at COORD
    Ask {
        #[command(flatten)]
        session: SessionArgs,
        coord: Coordinate,
        question: String,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// List the checkpoints of a session
    States {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// View, validate or create pilot.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Create a default pilot.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let workspace_dir = match cli.workspace_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = match &cli.command {
        Commands::Config { .. } => None,
        _ => debugpilot::pilot_config::PilotConfig::new(workspace_dir.clone())
            .ok()
            .map(|config| config.log_dir()),
    };
    let _guard = debugpilot::logging::init(cli.verbose, log_dir.as_deref());

    match &cli.command {
        Commands::Run {
            session,
            coord,
            overrides,
            oracle,
        } => cmd::cmd_run(&cli, &workspace_dir, session, *coord, overrides, oracle).await?,
        Commands::Rewind { session, coord } => cmd::cmd_rewind(&cli, &workspace_dir, session, *coord)?,
        Commands::Reject {
            session,
            depth,
            iteration,
            oracle,
        } => cmd::cmd_reject(&cli, &workspace_dir, session, *depth, *iteration, oracle).await?,
        Commands::Insight {
            session,
            coord,
            text,
            oracle,
        } => cmd::cmd_insight(&cli, &workspace_dir, session, *coord, text, oracle).await?,
        Commands::OracleFix {
            session,
            depth,
            iteration,
            items,
            oracle,
        } => cmd::cmd_oracle_fix(&cli, &workspace_dir, session, *depth, *iteration, items, oracle).await?,
        Commands::PartitionFix {
            session,
            depth,
            iteration,
            blocks,
            oracle,
        } => cmd::cmd_partition_fix(&cli, &workspace_dir, session, *depth, *iteration, blocks, oracle).await?,
        Commands::Ask {
            session,
            coord,
            question,
            oracle,
        } => cmd::cmd_ask(&cli, &workspace_dir, session, *coord, question, oracle).await?,
        Commands::States { session } => cmd::cmd_states(&cli, &workspace_dir, session)?,
        Commands::Config { command } => cmd::cmd_config(&workspace_dir, command.clone())?,
    }

    Ok(())
}
