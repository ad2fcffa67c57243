//! Unified configuration for debugpilot.
//!
//! Settings are read from `.debugpilot/pilot.toml` under the workspace
//! directory, then layered:
//! 1. pilot.toml (every field has a default)
//! 2. Environment variables (`PILOT_MODEL`, `PILOT_BASE_URL`, `PILOT_API_KEY`
//!    or the configured key variable), after `.env` is loaded
//! 3. CLI flags
//!
//! # Configuration File Format
//!
//! ```toml
//! [oracle]
//! model = "gpt-4o"
//! base_url = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! timeout_secs = 60
//! max_attempts = 5
//! backoff_ms = 1000
//!
//! [paths]
//! result_dir = "result"
//! benchmark_dir = "benchmark"
//! prompt_dir = "prompt"
//!
//! [trace]
//! read_scope = 3
//! write_scope = 10
//!
//! [interaction]
//! max_user_turns = 20
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::executor::PromptSet;
use crate::oracle::OracleSettings;
use pilot_trace::ExtractOptions;

pub const PILOT_DIR: &str = ".debugpilot";
pub const CONFIG_FILE: &str = "pilot.toml";

/// Reasoning service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay, doubled after every failed attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Directories, relative paths resolved against the workspace directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
    #[serde(default = "default_benchmark_dir")]
    pub benchmark_dir: PathBuf,
    /// Optional `agent_<phase>.txt` overrides for the built-in templates
    #[serde(default = "default_prompt_dir")]
    pub prompt_dir: PathBuf,
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("result")
}

fn default_benchmark_dir() -> PathBuf {
    PathBuf::from("benchmark")
}

fn default_prompt_dir() -> PathBuf {
    PathBuf::from("prompt")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            result_dir: default_result_dir(),
            benchmark_dir: default_benchmark_dir(),
            prompt_dir: default_prompt_dir(),
        }
    }
}

/// Nesting limits for read/write extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_read_scope")]
    pub read_scope: i64,
    #[serde(default = "default_write_scope")]
    pub write_scope: i64,
}

fn default_read_scope() -> i64 {
    pilot_trace::extract::DEFAULT_READ_SCOPE
}

fn default_write_scope() -> i64 {
    pilot_trace::extract::DEFAULT_WRITE_SCOPE
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            read_scope: default_read_scope(),
            write_scope: default_write_scope(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// `ask` refuses once a transcript holds this many user messages
    #[serde(default = "default_max_user_turns")]
    pub max_user_turns: usize,
}

fn default_max_user_turns() -> usize {
    20
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            max_user_turns: default_max_user_turns(),
        }
    }
}

/// Contents of `pilot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotToml {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
}

impl PilotToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse pilot.toml")
    }

    /// Load `<pilot_dir>/pilot.toml`, or defaults when it does not exist.
    pub fn load_or_default(pilot_dir: &Path) -> Result<Self> {
        let config_path = pilot_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize pilot.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.oracle.model.trim().is_empty() {
            warnings.push("oracle.model is empty".to_string());
        }
        if !self.oracle.base_url.starts_with("http://") && !self.oracle.base_url.starts_with("https://") {
            warnings.push(format!(
                "Invalid oracle.base_url '{}': should start with http:// or https://",
                self.oracle.base_url
            ));
        }
        if self.oracle.max_attempts == 0 {
            warnings.push("oracle.max_attempts is 0; no request would ever be sent".to_string());
        }
        if self.oracle.timeout_secs == 0 {
            warnings.push("oracle.timeout_secs is 0".to_string());
        }
        if self.trace.read_scope < 0 || self.trace.write_scope < 0 {
            warnings.push(format!(
                "Trace scopes must not be negative (read_scope = {}, write_scope = {})",
                self.trace.read_scope, self.trace.write_scope
            ));
        }
        if self.interaction.max_user_turns == 0 {
            warnings.push("interaction.max_user_turns is 0; ask will always refuse".to_string());
        }

        warnings
    }
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// pilot.toml merged with environment and CLI settings.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub workspace_dir: PathBuf,
    pub pilot_dir: PathBuf,
    pub toml: PilotToml,
    pub verbose: bool,
    pub cli: CliOverrides,
}

impl PilotConfig {
    pub fn new(workspace_dir: PathBuf) -> Result<Self> {
        let workspace_dir = workspace_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace directory: {}", workspace_dir.display()))?;
        let pilot_dir = workspace_dir.join(PILOT_DIR);
        let toml = PilotToml::load_or_default(&pilot_dir)?;

        Ok(Self {
            workspace_dir,
            pilot_dir,
            toml,
            verbose: false,
            cli: CliOverrides::default(),
        })
    }

    pub fn with_cli_args(workspace_dir: PathBuf, verbose: bool, cli: CliOverrides) -> Result<Self> {
        let mut config = Self::new(workspace_dir)?;
        config.verbose = verbose;
        config.cli = cli;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.pilot_dir.join(CONFIG_FILE)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_dir.join(path)
        }
    }

    pub fn result_dir(&self) -> PathBuf {
        self.resolve(&self.toml.paths.result_dir)
    }

    pub fn benchmark_dir(&self) -> PathBuf {
        self.resolve(&self.toml.paths.benchmark_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.result_dir().join("logs")
    }

    /// Templates from the prompt directory when it exists, built-ins otherwise.
    pub fn prompts(&self) -> PromptSet {
        let dir = self.resolve(&self.toml.paths.prompt_dir);
        if dir.is_dir() {
            PromptSet::from_dir(dir)
        } else {
            PromptSet::builtin()
        }
    }

    pub fn trace_options(&self) -> ExtractOptions {
        ExtractOptions {
            read_scope: self.toml.trace.read_scope,
            write_scope: self.toml.trace.write_scope,
        }
    }

    pub fn max_user_turns(&self) -> usize {
        self.toml.interaction.max_user_turns
    }

    /// Oracle settings from the process environment.
    pub fn oracle_settings(&self) -> OracleSettings {
        self.oracle_settings_from(|key| std::env::var(key).ok())
    }

    /// Oracle settings, file -> `lookup` -> CLI.
    pub fn oracle_settings_from(&self, lookup: impl Fn(&str) -> Option<String>) -> OracleSettings {
        let file = &self.toml.oracle;
        let model = self
            .cli
            .model
            .clone()
            .or_else(|| lookup("PILOT_MODEL"))
            .unwrap_or_else(|| file.model.clone());
        let base_url = self
            .cli
            .base_url
            .clone()
            .or_else(|| lookup("PILOT_BASE_URL"))
            .unwrap_or_else(|| file.base_url.clone());
        let api_key = lookup("PILOT_API_KEY")
            .or_else(|| lookup(&file.api_key_env))
            .filter(|key| !key.trim().is_empty());

        OracleSettings {
            base_url,
            model,
            api_key,
            timeout_secs: file.timeout_secs,
            max_attempts: file.max_attempts,
            backoff_ms: file.backoff_ms,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
