use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use simsweep_core::{ErrorInfo, SweepError};

use crate::grid::Dimensions;

/// YAML-configurable settings for a sweep. Command-line flags override the
/// values loaded here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Base directory receiving one run directory per combination.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Ledger document path; defaults to `<output_dir>/ledger.json`.
    #[serde(default)]
    pub ledger: Option<PathBuf>,
    /// Dimensions used when no ledger exists yet.
    #[serde(default)]
    pub dimensions: Dimensions,
    /// External simulator invocation.
    #[serde(default)]
    pub simulator: SimulatorConfig,
    /// Worker scheduling.
    #[serde(default)]
    pub scheduler: Scheduler,
}

impl SweepConfig {
    /// Reads a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            SweepError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_yaml::from_str(&contents).map_err(|err| {
            SweepError::Config(
                ErrorInfo::new("config-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Returns the output directory or fails before any combination runs.
    pub fn require_output_dir(&self) -> Result<&Path, SweepError> {
        self.output_dir.as_deref().ok_or_else(|| {
            SweepError::Config(
                ErrorInfo::new("config-output-missing", "no output directory configured")
                    .with_hint("pass --out <DIR> or set output_dir in the config file"),
            )
        })
    }

    /// Resolves the ledger path, falling back to `<output_dir>/ledger.json`.
    pub fn ledger_path(&self) -> Result<PathBuf, SweepError> {
        match &self.ledger {
            Some(path) => Ok(path.clone()),
            None => Ok(self.require_output_dir()?.join("ledger.json")),
        }
    }
}

/// How the external simulator is invoked for each combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Simulator executable.
    #[serde(default)]
    pub program: Option<PathBuf>,
    /// Fixed leading arguments, e.g. the simulation script and workload.
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-combination arguments. Recognised placeholders: `{l1d_size}`,
    /// `{l1d_kib}`, `{predictor}`, `{i}`, `{j}`, `{k}`, `{matrix}`.
    #[serde(default = "SimulatorConfig::default_arg_template")]
    pub arg_template: Vec<String>,
    /// Redirect child stdout/stderr into the run directory.
    #[serde(default = "SimulatorConfig::default_capture_output")]
    pub capture_output: bool,
    /// Upper bound on one run's wall time; unbounded when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SimulatorConfig {
    fn default_arg_template() -> Vec<String> {
        vec![
            "--l1d_size={l1d_size}".to_string(),
            "--branch_predictor={predictor}".to_string(),
            "--options={matrix}".to_string(),
        ]
    }

    const fn default_capture_output() -> bool {
        true
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            arg_template: Self::default_arg_template(),
            capture_output: Self::default_capture_output(),
            timeout_secs: None,
        }
    }
}

/// Scheduler configuration controlling how many runs execute at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheduler {
    /// Runs executing at once; `1` keeps the sweep on the calling thread.
    #[serde(default = "Scheduler::default_parallelism")]
    pub parallelism: usize,
}

impl Scheduler {
    const fn default_parallelism() -> usize {
        1
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            parallelism: Self::default_parallelism(),
        }
    }
}
