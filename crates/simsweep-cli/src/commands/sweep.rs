use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use simsweep_exp::{
    Ledger, Orchestrator, ProcessLauncher, RunDirAllocator, SweepEvent, SweepReport,
};

use super::{apply_simulator_overrides, load_config, write_json};

/// Report written into the output directory after a complete sweep.
pub const REPORT_FILE: &str = "sweep_report.json";

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Simulator executable launched once per combination.
    #[arg(long)]
    pub program: Option<PathBuf>,
    /// Base directory for run directories (and the default ledger).
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Ledger document; defaults to `<out>/ledger.json`.
    #[arg(long)]
    pub ledger: Option<PathBuf>,
    /// YAML file with dimensions, simulator and scheduler settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Number of combinations to run concurrently.
    #[arg(long)]
    pub jobs: Option<usize>,
    /// Kill a run that exceeds this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Only report failures and the final summary.
    #[arg(long)]
    pub quiet: bool,
    /// Extra leading arguments for the simulator (after `--`).
    #[arg(last = true)]
    pub sim_args: Vec<String>,
}

pub fn run(args: &SweepArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(out) = &args.out {
        config.output_dir = Some(out.clone());
    }
    if let Some(ledger) = &args.ledger {
        config.ledger = Some(ledger.clone());
    }
    if let Some(jobs) = args.jobs {
        config.scheduler.parallelism = jobs.max(1);
    }
    apply_simulator_overrides(
        &mut config,
        args.program.as_ref(),
        args.timeout_secs,
        &args.sim_args,
    );

    let out_dir = config.require_output_dir()?.to_path_buf();
    let ledger_path = config.ledger_path()?;
    let launcher = ProcessLauncher::new(config.simulator.clone())?;
    let ledger = Ledger::load(&ledger_path, &config.dimensions)?;
    eprintln!(
        "[sweep] ledger {} ({} of {} done)",
        ledger_path.display(),
        ledger.done_count(),
        ledger.dimensions().len()
    );

    let mut orchestrator = Orchestrator::new(
        ledger,
        RunDirAllocator::new(&out_dir),
        launcher,
        config.scheduler.clone(),
    );
    let quiet = args.quiet;
    let report = orchestrator.run(&mut |event| render_event(event, quiet))?;

    write_json(out_dir.join(REPORT_FILE), &report)?;
    print_summary(&report);
    Ok(())
}

fn render_event(event: &SweepEvent, quiet: bool) {
    match event {
        SweepEvent::Failed {
            index,
            total,
            identity,
            ..
        } => eprintln!("[sweep] {index}/{total} {identity}  failed"),
        _ if quiet => {}
        SweepEvent::Skipped {
            index,
            total,
            identity,
        } => eprintln!("[sweep] {index}/{total} {identity}  exists, skipped"),
        SweepEvent::Started {
            index,
            total,
            identity,
            run_dir,
        } => eprintln!(
            "[sweep] {index}/{total} {identity}  started in {}",
            run_dir.display()
        ),
        SweepEvent::Completed {
            index,
            total,
            identity,
            ..
        } => eprintln!("[sweep] {index}/{total} {identity}  done!"),
    }
}

fn print_summary(report: &SweepReport) {
    eprintln!(
        "[sweep] finished: {} executed, {} skipped, {} total",
        report.executed, report.skipped, report.total
    );
}
