//! Controller entry points: `debugpilot run`, `reject`, `insight`,
//! `oracle-fix` and `partition-fix`.
//!
//! Each prints a JSON result and exits successfully even when the analysis
//! fails, so a driving tool only has to read stdout. The session lock is
//! taken before any store edit and held through the resumed run.

use anyhow::{Context, Result};
use std::path::Path;

use debugpilot::engine::{Controller, ManualOverride, RunOutcome, interaction};
use debugpilot::executor::LocalizeOverride;
use debugpilot::fixtures::DebugData;
use debugpilot::reply::{CodeBlock, OracleItem};
use debugpilot::state::{Coordinate, SessionLock};

use super::super::{Cli, OracleArgs, OverrideArgs, SessionArgs};
use super::{Workspace, error_json, print_json};

impl OverrideArgs {
    pub fn manual(&self) -> Option<ManualOverride> {
        if let Some(id) = self.block {
            Some(ManualOverride::Block(id))
        } else if let Some(index) = self.step_into {
            Some(ManualOverride::Localize(LocalizeOverride::StepInto(index)))
        } else if self.root_cause {
            Some(ManualOverride::Localize(LocalizeOverride::RootCause))
        } else {
            None
        }
    }
}

/// Load the collaborator data and run the controller once under `lock`.
async fn drive(
    workspace: &Workspace,
    lock: &SessionLock,
    session: &SessionArgs,
    oracle_args: &OracleArgs,
    resume: Option<Coordinate>,
    manual: Option<ManualOverride>,
) -> Result<RunOutcome> {
    let bug_dir = DebugData::bug_dir(&workspace.config.benchmark_dir(), &session.project, &session.bug);
    let data = DebugData::load(&bug_dir)?;
    let oracle = workspace.oracle(oracle_args)?;
    let prompts = workspace.config.prompts();

    let controller = Controller::new(
        &workspace.store,
        &data,
        oracle.as_ref(),
        &prompts,
        workspace.config.trace_options(),
    );
    Ok(controller.run_locked(lock, resume, manual).await)
}

fn report(result: Result<RunOutcome>) -> Result<()> {
    let value = match result {
        Ok(outcome) => outcome.to_json(),
        Err(e) => {
            tracing::error!("{:#}", e);
            error_json(&e)
        }
    };
    print_json(&value)
}

pub async fn cmd_run(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    coord: Option<Coordinate>,
    overrides: &OverrideArgs,
    oracle: &OracleArgs,
) -> Result<()> {
    report(try_run(cli, workspace_dir, session, coord, overrides.manual(), oracle).await)
}

async fn try_run(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    coord: Option<Coordinate>,
    manual: Option<ManualOverride>,
    oracle: &OracleArgs,
) -> Result<RunOutcome> {
    let workspace = Workspace::open(cli, workspace_dir, session, Some(oracle))?;
    let lock = workspace.store.lock()?;
    drive(&workspace, &lock, session, oracle, coord, manual).await
}

pub async fn cmd_reject(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    depth: u32,
    iteration: u32,
    oracle: &OracleArgs,
) -> Result<()> {
    report(try_reject(cli, workspace_dir, session, depth, iteration, oracle).await)
}

async fn try_reject(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    depth: u32,
    iteration: u32,
    oracle: &OracleArgs,
) -> Result<RunOutcome> {
    let workspace = Workspace::open(cli, workspace_dir, session, Some(oracle))?;
    let lock = workspace.store.lock()?;
    let restart = interaction::reject(&workspace.store, depth, iteration)?;
    drive(&workspace, &lock, session, oracle, restart.resume(), None).await
}

pub async fn cmd_insight(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    coord: Coordinate,
    text: &str,
    oracle: &OracleArgs,
) -> Result<()> {
    report(try_insight(cli, workspace_dir, session, coord, text, oracle).await)
}

async fn try_insight(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    coord: Coordinate,
    text: &str,
    oracle: &OracleArgs,
) -> Result<RunOutcome> {
    let workspace = Workspace::open(cli, workspace_dir, session, Some(oracle))?;
    let lock = workspace.store.lock()?;
    interaction::insight(&workspace.store, coord, text)?;
    drive(&workspace, &lock, session, oracle, Some(coord), None).await
}

pub async fn cmd_oracle_fix(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    depth: u32,
    iteration: u32,
    items: &str,
    oracle: &OracleArgs,
) -> Result<()> {
    report(try_oracle_fix(cli, workspace_dir, session, depth, iteration, items, oracle).await)
}

async fn try_oracle_fix(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    depth: u32,
    iteration: u32,
    items: &str,
    oracle: &OracleArgs,
) -> Result<RunOutcome> {
    let items: Vec<OracleItem> =
        serde_json::from_str(items).context("Prediction must be a JSON array of {name, analysis, expected}")?;
    let workspace = Workspace::open(cli, workspace_dir, session, Some(oracle))?;
    let lock = workspace.store.lock()?;
    let resume = interaction::oracle_fix(&workspace.store, depth, iteration, items)?;
    drive(&workspace, &lock, session, oracle, Some(resume), None).await
}

pub async fn cmd_partition_fix(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    depth: u32,
    iteration: u32,
    blocks: &str,
    oracle: &OracleArgs,
) -> Result<()> {
    report(try_partition_fix(cli, workspace_dir, session, depth, iteration, blocks, oracle).await)
}

async fn try_partition_fix(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    depth: u32,
    iteration: u32,
    blocks: &str,
    oracle: &OracleArgs,
) -> Result<RunOutcome> {
    let blocks: Vec<CodeBlock> = serde_json::from_str(blocks)
        .context("Block list must be a JSON array of {id, start_line, end_line, comment}")?;
    let workspace = Workspace::open(cli, workspace_dir, session, Some(oracle))?;
    let lock = workspace.store.lock()?;
    let resume = interaction::partition_fix(&workspace.store, depth, iteration, blocks)?;
    drive(&workspace, &lock, session, oracle, Some(resume), None).await
}
