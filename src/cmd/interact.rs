//! Store-level interaction: `debugpilot ask` and `debugpilot rewind`.

use anyhow::Result;
use serde_json::json;
use std::path::Path;

use debugpilot::engine::{AskReply, interaction};
use debugpilot::oracle::user_turns;
use debugpilot::state::Coordinate;

use super::super::{Cli, OracleArgs, SessionArgs};
use super::{Workspace, error_json, print_json};

pub async fn cmd_ask(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    coord: Coordinate,
    question: &str,
    oracle: &OracleArgs,
) -> Result<()> {
    let value = match try_ask(cli, workspace_dir, session, coord, question, oracle).await {
        Ok(AskReply::Answered { reply, messages }) => json!({
            "status": "success",
            "response": reply,
            "user_turns": user_turns(&messages),
        }),
        Ok(AskReply::Refused { message }) => json!({ "status": "refused", "response": message }),
        Err(e) => {
            tracing::error!("{:#}", e);
            error_json(&e)
        }
    };
    print_json(&value)
}

async fn try_ask(
    cli: &Cli,
    workspace_dir: &Path,
    session: &SessionArgs,
    coord: Coordinate,
    question: &str,
    oracle: &OracleArgs,
) -> Result<AskReply> {
    let workspace = Workspace::open(cli, workspace_dir, session, Some(oracle))?;
    let client = workspace.oracle(oracle)?;
    let reply = interaction::ask(
        &workspace.store,
        client.as_ref(),
        coord,
        question,
        workspace.config.max_user_turns(),
    )
    .await?;
    Ok(reply)
}

pub fn cmd_rewind(cli: &Cli, workspace_dir: &Path, session: &SessionArgs, coord: Option<Coordinate>) -> Result<()> {
    let workspace = Workspace::open(cli, workspace_dir, session, None)?;
    let _lock = workspace.store.lock()?;
    let removed = workspace.store.rewind(coord)?;

    match coord {
        Some(keep) => println!(
            "Removed {} state(s) after {} in {}",
            removed,
            keep,
            workspace.store.dir().display()
        ),
        None => println!(
            "Removed all {} state(s) in {}",
            removed,
            workspace.store.dir().display()
        ),
    }
    Ok(())
}
