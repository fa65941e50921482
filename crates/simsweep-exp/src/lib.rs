//! Resumable sweep orchestration: grid enumeration, the completion ledger,
//! run directory allocation and process-isolated execution.

mod config;
mod executor;
mod grid;
mod ledger;
mod orchestrator;
mod rundir;

pub use config::{Scheduler, SimulatorConfig, SweepConfig};
pub use executor::{
    execute, render_args, ExitClass, Launcher, ProcessLauncher, STDERR_FILE, STDOUT_FILE,
};
pub use grid::{Combinations, Dimensions};
pub use ledger::{Ledger, LedgerDocument, LedgerStatus};
pub use orchestrator::{Orchestrator, RunRecord, SweepEvent, SweepReport};
pub use rundir::{RunDir, RunDirAllocator, PARAMS_FILE};
