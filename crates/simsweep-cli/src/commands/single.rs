use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use simsweep_core::{CacheSizeKib, Combination, MatrixTriple, Predictor};
use simsweep_exp::{execute, ProcessLauncher, RunDirAllocator};

use super::{apply_simulator_overrides, load_config};

#[derive(Args, Debug)]
pub struct SingleArgs {
    /// Simulator executable.
    #[arg(long)]
    pub program: Option<PathBuf>,
    /// Base directory receiving the run directory.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// YAML file with simulator settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// L1 data cache size in KiB.
    #[arg(long = "l1d-size")]
    pub l1d_size: u32,
    /// Branch predictor: local, tourn or bi.
    #[arg(long, default_value = "local")]
    pub predictor: Predictor,
    /// Matrix size as I,J,K.
    #[arg(long)]
    pub matrix: MatrixTriple,
    /// Kill the run after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Extra leading arguments for the simulator (after `--`).
    #[arg(last = true)]
    pub sim_args: Vec<String>,
}

pub fn run(args: &SingleArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(out) = &args.out {
        config.output_dir = Some(out.clone());
    }
    apply_simulator_overrides(
        &mut config,
        args.program.as_ref(),
        args.timeout_secs,
        &args.sim_args,
    );
    let out_dir = config.require_output_dir()?.to_path_buf();
    let launcher = ProcessLauncher::new(config.simulator.clone())?;

    let combo = Combination::new(
        CacheSizeKib::from_raw(args.l1d_size),
        args.predictor,
        args.matrix,
    );
    let run_dir = RunDirAllocator::new(out_dir).allocate(&combo)?;
    eprintln!("[single] {combo}  started in {}", run_dir.path.display());
    execute(&launcher, &combo, &run_dir)?;
    eprintln!("[single] {combo}  done!");
    println!("{}", run_dir.path.display());
    Ok(())
}
