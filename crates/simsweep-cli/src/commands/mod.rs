use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use simsweep_exp::SweepConfig;

pub mod single;
pub mod status;
pub mod sweep;

pub(crate) fn load_config(path: Option<&Path>) -> Result<SweepConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(SweepConfig::load(path)?),
        None => Ok(SweepConfig::default()),
    }
}

/// Applies command-line overrides shared by the run commands.
pub(crate) fn apply_simulator_overrides(
    config: &mut SweepConfig,
    program: Option<&PathBuf>,
    timeout_secs: Option<u64>,
    sim_args: &[String],
) {
    if let Some(program) = program {
        config.simulator.program = Some(program.clone());
    }
    if timeout_secs.is_some() {
        config.simulator.timeout_secs = timeout_secs;
    }
    config.simulator.args.extend(sim_args.iter().cloned());
}

pub(crate) fn write_json<P: AsRef<Path>, T: Serialize>(
    path: P,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
