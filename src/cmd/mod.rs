//! CLI command implementations.
//!
//! | Module     | Commands handled                                        |
//! |------------|---------------------------------------------------------|
//! | `run`      | `Run`, `Reject`, `Insight`, `OracleFix`, `PartitionFix` |
//! | `interact` | `Ask`, `Rewind`                                         |
//! | `states`   | `States`                                                |
//! | `config`   | `Config`                                                |

pub mod config;
pub mod interact;
pub mod run;
pub mod states;

pub use config::cmd_config;
pub use interact::{cmd_ask, cmd_rewind};
pub use run::{cmd_insight, cmd_oracle_fix, cmd_partition_fix, cmd_reject, cmd_run};
pub use states::cmd_states;

use anyhow::{Context, Result};
use std::path::Path;

use debugpilot::errors::OracleError;
use debugpilot::oracle::{OpenAiOracle, ReasoningOracle, ScriptedOracle};
use debugpilot::pilot_config::{CliOverrides, PilotConfig};
use debugpilot::state::StateStore;

use super::{Cli, OracleArgs, SessionArgs};

/// Configuration plus the checkpoint store of one `(project, bug)` session.
pub struct Workspace {
    pub config: PilotConfig,
    pub store: StateStore,
}

impl Workspace {
    pub fn open(cli: &Cli, workspace_dir: &Path, session: &SessionArgs, oracle: Option<&OracleArgs>) -> Result<Self> {
        let overrides = oracle
            .map(|args| CliOverrides {
                model: args.model.clone(),
                base_url: args.base_url.clone(),
            })
            .unwrap_or_default();
        let config = PilotConfig::with_cli_args(workspace_dir.to_path_buf(), cli.verbose, overrides)?;
        let store = StateStore::for_session(&config.result_dir(), &session.project, &session.bug);
        Ok(Self { config, store })
    }

    /// Replay file when given, otherwise the configured OpenAI-compatible service.
    pub fn oracle(&self, args: &OracleArgs) -> Result<Box<dyn ReasoningOracle>> {
        if let Some(path) = &args.replay {
            tracing::info!("replaying oracle replies from {}", path.display());
            return Ok(Box::new(ScriptedOracle::from_file(path)?));
        }

        let settings = self.config.oracle_settings();
        if settings.api_key.is_none() {
            return Err(OracleError::MissingApiKey {
                var: self.config.toml.oracle.api_key_env.clone(),
            }
            .into());
        }
        tracing::debug!(model = %settings.model, base_url = %settings.base_url, "using remote oracle");
        let oracle = OpenAiOracle::new(settings).context("Failed to create oracle client")?;
        Ok(Box::new(oracle))
    }
}

/// Print a command result on stdout.
pub fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode result")?;
    println!("{}", text);
    Ok(())
}

pub fn error_json(err: &anyhow::Error) -> serde_json::Value {
    serde_json::json!({ "status": "error", "message": format!("{:#}", err) })
}
