use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};
use simsweep_core::{Combination, ErrorInfo, Identity, SweepError};

use crate::config::Scheduler;
use crate::executor::{execute, Launcher};
use crate::ledger::Ledger;
use crate::rundir::{RunDir, RunDirAllocator};

/// Observation emitted while a sweep progresses. `index` is 1-based and
/// follows grid enumeration order.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    /// Already in the done-set; no process was spawned.
    Skipped {
        index: usize,
        total: usize,
        identity: Identity,
    },
    /// A run directory was allocated and the simulator is about to start.
    Started {
        index: usize,
        total: usize,
        identity: Identity,
        run_dir: PathBuf,
    },
    /// The run succeeded and the ledger was persisted.
    Completed {
        index: usize,
        total: usize,
        identity: Identity,
        run_dir: PathBuf,
    },
    /// The run failed; the sweep halts.
    Failed {
        index: usize,
        total: usize,
        identity: Identity,
        error: SweepError,
    },
}

/// One combination executed during this invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// 1-based position in grid enumeration order.
    pub index: usize,
    /// Ledger identity of the combination.
    pub identity: Identity,
    /// Parameters the simulator was launched with.
    pub combination: Combination,
    /// Directory that holds the run's artifacts.
    pub run_dir: PathBuf,
    /// RFC 3339 allocation time of the run directory.
    pub started_at: String,
}

/// Summary of a sweep that reached the end of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Cardinality of the grid.
    pub total: usize,
    /// Combinations run to success by this invocation.
    pub executed: usize,
    /// Combinations already in the done-set.
    pub skipped: usize,
    /// Executed runs ordered by index.
    pub runs: Vec<RunRecord>,
}

impl SweepReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            executed: 0,
            skipped: 0,
            runs: Vec::new(),
        }
    }
}

enum WorkerMessage {
    Started {
        index: usize,
        identity: Identity,
        run_dir: PathBuf,
    },
    Finished {
        index: usize,
        combo: Combination,
        result: Result<RunDir, SweepError>,
    },
}

/// Drives the grid against the ledger, one child process per pending
/// combination, stopping at the first failure.
pub struct Orchestrator<L> {
    ledger: Ledger,
    allocator: RunDirAllocator,
    launcher: L,
    scheduler: Scheduler,
}

impl<L: Launcher> Orchestrator<L> {
    pub fn new(ledger: Ledger, allocator: RunDirAllocator, launcher: L, scheduler: Scheduler) -> Self {
        Self {
            ledger,
            allocator,
            launcher,
            scheduler,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    /// Runs every pending combination of the ledger's grid.
    pub fn run(&mut self, observer: &mut dyn FnMut(&SweepEvent)) -> Result<SweepReport, SweepError> {
        if self.scheduler.parallelism > 1 {
            self.run_parallel(observer)
        } else {
            self.run_sequential(observer)
        }
    }

    fn run_sequential(
        &mut self,
        observer: &mut dyn FnMut(&SweepEvent),
    ) -> Result<SweepReport, SweepError> {
        let dims = self.ledger.dimensions().clone();
        let total = dims.len();
        let mut report = SweepReport::new(total);
        for (offset, combo) in dims.combinations().enumerate() {
            let index = offset + 1;
            let identity = combo.identity();
            if self.ledger.is_done(&identity) {
                report.skipped += 1;
                observer(&SweepEvent::Skipped {
                    index,
                    total,
                    identity,
                });
                continue;
            }
            let result = run_combination(&self.allocator, &self.launcher, &combo, |run_dir| {
                observer(&SweepEvent::Started {
                    index,
                    total,
                    identity: identity.clone(),
                    run_dir: run_dir.path.clone(),
                })
            });
            settle(
                &mut self.ledger,
                &mut report,
                observer,
                index,
                combo,
                result,
            )?;
        }
        Ok(report)
    }

    /// Pending combinations are dispatched onto a rayon pool in grid order;
    /// only the calling thread touches the ledger.
    fn run_parallel(
        &mut self,
        observer: &mut dyn FnMut(&SweepEvent),
    ) -> Result<SweepReport, SweepError> {
        let dims = self.ledger.dimensions().clone();
        let total = dims.len();
        let mut report = SweepReport::new(total);
        let mut pending = Vec::new();
        for (offset, combo) in dims.combinations().enumerate() {
            let identity = combo.identity();
            if self.ledger.is_done(&identity) {
                report.skipped += 1;
                observer(&SweepEvent::Skipped {
                    index: offset + 1,
                    total,
                    identity,
                });
            } else {
                pending.push((offset + 1, combo));
            }
        }
        if pending.is_empty() {
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.scheduler.parallelism.min(pending.len()).max(1))
            .build()
            .map_err(|err| {
                SweepError::Execution(
                    ErrorInfo::new("thread-pool", err.to_string())
                        .with_context("parallelism", self.scheduler.parallelism.to_string()),
                )
            })?;
        let halt = AtomicBool::new(false);
        let allocator = &self.allocator;
        let launcher = &self.launcher;
        let ledger = &mut self.ledger;
        let mut first_error = None;

        pool.in_place_scope_fifo(|scope| {
            let (tx, rx) = mpsc::channel::<WorkerMessage>();
            for &(index, combo) in &pending {
                let tx = tx.clone();
                let halt = &halt;
                scope.spawn_fifo(move |_| {
                    if halt.load(Ordering::SeqCst) {
                        return;
                    }
                    let result = run_combination(allocator, launcher, &combo, |run_dir| {
                        let _ = tx.send(WorkerMessage::Started {
                            index,
                            identity: combo.identity(),
                            run_dir: run_dir.path.clone(),
                        });
                    });
                    if result.is_err() {
                        halt.store(true, Ordering::SeqCst);
                    }
                    let _ = tx.send(WorkerMessage::Finished {
                        index,
                        combo,
                        result,
                    });
                });
            }
            drop(tx);

            for message in rx {
                match message {
                    WorkerMessage::Started {
                        index,
                        identity,
                        run_dir,
                    } => observer(&SweepEvent::Started {
                        index,
                        total,
                        identity,
                        run_dir,
                    }),
                    WorkerMessage::Finished {
                        index,
                        combo,
                        result,
                    } => {
                        if let Err(err) = settle(ledger, &mut report, observer, index, combo, result)
                        {
                            halt.store(true, Ordering::SeqCst);
                            first_error.get_or_insert(err);
                        }
                    }
                }
            }
        });

        match first_error {
            Some(err) => Err(err),
            None => {
                report.runs.sort_by_key(|run| run.index);
                Ok(report)
            }
        }
    }
}

fn run_combination(
    allocator: &RunDirAllocator,
    launcher: &dyn Launcher,
    combo: &Combination,
    on_started: impl FnOnce(&RunDir),
) -> Result<RunDir, SweepError> {
    let run_dir = allocator.allocate(combo)?;
    on_started(&run_dir);
    execute(launcher, combo, &run_dir)?;
    Ok(run_dir)
}

/// Records a finished run: persists success to the ledger or reports the
/// failure. The ledger is written only after the child succeeded.
fn settle(
    ledger: &mut Ledger,
    report: &mut SweepReport,
    observer: &mut dyn FnMut(&SweepEvent),
    index: usize,
    combo: Combination,
    result: Result<RunDir, SweepError>,
) -> Result<(), SweepError> {
    let total = report.total;
    let identity = combo.identity();
    let outcome = result.and_then(|run_dir| {
        ledger.mark_done(identity.clone())?;
        Ok(run_dir)
    });
    match outcome {
        Ok(run_dir) => {
            report.executed += 1;
            observer(&SweepEvent::Completed {
                index,
                total,
                identity: identity.clone(),
                run_dir: run_dir.path.clone(),
            });
            report.runs.push(RunRecord {
                index,
                identity,
                combination: combo,
                run_dir: run_dir.path,
                started_at: run_dir.started_at.to_rfc3339(),
            });
            Ok(())
        }
        Err(error) => {
            observer(&SweepEvent::Failed {
                index,
                total,
                identity,
                error: error.clone(),
            });
            Err(error)
        }
    }
}
