//! Checkpoint listing: `debugpilot states`.

use anyhow::Result;
use std::path::Path;

use debugpilot::phase::{PhaseKind, PhaseRecord};

use super::super::{Cli, SessionArgs};
use super::Workspace;

pub fn cmd_states(cli: &Cli, workspace_dir: &Path, session: &SessionArgs) -> Result<()> {
    let workspace = Workspace::open(cli, workspace_dir, session, None)?;
    let coords = workspace.store.list()?;

    println!();
    if coords.is_empty() {
        println!("No states saved for {}_{}.", session.project, session.bug);
        println!();
        return Ok(());
    }

    println!(
        "{}",
        console::style(format!("States for {}_{}", session.project, session.bug))
            .bold()
            .cyan()
    );
    println!("{:<10} {:<14} {:<20} Result", "Coord", "Phase", "Method");
    println!("{:<10} {:<14} {:<20} ------", "-----", "-----", "------");

    for coord in coords {
        let phase = PhaseKind::from_coordinate(coord);
        match workspace.store.load::<PhaseRecord>(coord) {
            Some(state) => {
                let label = state.result.outcome.label();
                let label = if state.result.outcome.is_failed() {
                    console::style(label).red().to_string()
                } else {
                    console::style(label).dim().to_string()
                };
                println!(
                    "{:<10} {:<14} {:<20} {}",
                    coord.to_string(),
                    phase.name(),
                    state.result.session.method_name,
                    label
                );
            }
            None => println!(
                "{:<10} {:<14} {:<20} {}",
                coord.to_string(),
                phase.name(),
                "?",
                console::style("unreadable").yellow()
            ),
        }
    }
    println!();
    Ok(())
}
