//! specflow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::validation::CoveragePolicy;

/// Main specflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External agent process
    pub gateway: GatewayConfig,

    /// Retry and corrective re-prompt policy
    pub generation: GenerationConfig,

    /// Approval gate settings
    pub approval: ApprovalConfig,

    /// Validator settings
    pub validation: ValidationConfig,

    /// Where seeds, artifacts and state live, relative to the working directory
    pub layout: LayoutConfig,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.gateway.program.trim().is_empty() {
            return Err(eyre::eyre!("gateway.program must not be empty"));
        }
        if self.approval.preview_chars == 0 {
            return Err(eyre::eyre!("approval.preview-chars must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// explicit path > `<workdir>/.specflow.yml` > `~/.config/specflow/specflow.yml` > defaults
    pub fn load(config_path: Option<&PathBuf>, workdir: &Path) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = workdir.join(".specflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("specflow").join("specflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// External agent process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Program to spawn; receives the prompt on stdin
    pub program: String,

    pub args: Vec<String>,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["-p".to_string()],
            timeout_ms: 300_000,
        }
    }
}

/// Delay between failed gateway attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    None,
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum gateway calls per generation, at least 1
    #[serde(rename = "attempt-budget")]
    pub attempt_budget: u32,

    pub backoff: BackoffKind,

    #[serde(rename = "backoff-ms")]
    pub backoff_ms: u64,

    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,

    /// Re-prompt once with the violation list when validation fails
    #[serde(rename = "corrective-retry")]
    pub corrective_retry: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            attempt_budget: 3,
            backoff: BackoffKind::Fixed,
            backoff_ms: 2_000,
            backoff_max_ms: 30_000,
            corrective_retry: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Characters of the task list shown in the approval preview
    #[serde(rename = "preview-chars")]
    pub preview_chars: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { preview_chars: 500 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Whether missing implementation coverage is a warning or an error
    #[serde(rename = "coverage-policy")]
    pub coverage_policy: CoveragePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Principles (constitution) document
    pub principles: String,

    /// Specification document
    pub specification: String,

    /// Directory for generated artifacts, one subdirectory per run
    pub outputs: String,

    /// Subdirectory of a run's outputs for extracted files that name no directory
    #[serde(rename = "code-dir")]
    pub code_dir: String,

    /// Snapshots, approval ledger and prompt overrides
    #[serde(rename = "state-dir")]
    pub state_dir: String,
}

impl LayoutConfig {
    /// Paths owned by one run
    pub fn for_run(&self, run_id: Uuid) -> RunLayout<'_> {
        RunLayout { layout: self, run_id }
    }
}

/// Store-relative paths of one run's artifacts: `<outputs>/<run_id>/...`
#[derive(Debug, Clone, Copy)]
pub struct RunLayout<'a> {
    layout: &'a LayoutConfig,
    run_id: Uuid,
}

impl RunLayout<'_> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Directory holding every artifact of the run
    pub fn dir(&self) -> String {
        format!("{}/{}", self.layout.outputs.trim_end_matches('/'), self.run_id)
    }

    /// Path of a generated artifact
    pub fn output(&self, name: &str) -> String {
        format!("{}/{}", self.dir(), name)
    }

    /// Path of an extracted source file
    pub fn extracted(&self, file: &str) -> String {
        let file = file.trim_start_matches("./");
        if file.contains('/') {
            self.output(file)
        } else {
            self.output(&format!("{}/{}", self.layout.code_dir.trim_end_matches('/'), file))
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            principles: "constitution.md".to_string(),
            specification: "spec.md".to_string(),
            outputs: "outputs".to_string(),
            code_dir: "src".to_string(),
            state_dir: ".specflow".to_string(),
        }
    }
}
