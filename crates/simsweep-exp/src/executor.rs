use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use simsweep_core::{Combination, ErrorInfo, SweepError};

use crate::config::SimulatorConfig;
use crate::rundir::RunDir;

/// Captured child output inside a run directory.
pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STDERR_TAIL_LINES: usize = 5;

/// How a child simulation terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ExitClass {
    /// Ran to completion with exit status zero.
    Success,
    /// Ran to completion with a non-zero exit status.
    ExitCode(i32),
    /// Terminated by a signal (number when the platform reports one).
    Signaled(Option<i32>),
    /// Killed after exceeding the configured timeout.
    TimedOut,
}

impl ExitClass {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitClass::Success,
            Some(code) => ExitClass::ExitCode(code),
            None => ExitClass::Signaled(termination_signal(&status)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitClass::Success)
    }

    fn describe(&self) -> String {
        match self {
            ExitClass::Success => "exit status 0".to_string(),
            ExitClass::ExitCode(code) => format!("exit status {code}"),
            ExitClass::Signaled(Some(signal)) => format!("signal {signal}"),
            ExitClass::Signaled(None) => "abnormal termination".to_string(),
            ExitClass::TimedOut => "timeout".to_string(),
        }
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Runs one combination in isolation and reports how it terminated.
///
/// Implementations must be shareable across worker threads.
pub trait Launcher: Sync {
    fn launch(&self, combo: &Combination, run_dir: &Path) -> Result<ExitClass, SweepError>;
}

impl<T: Launcher + ?Sized> Launcher for &T {
    fn launch(&self, combo: &Combination, run_dir: &Path) -> Result<ExitClass, SweepError> {
        (**self).launch(combo, run_dir)
    }
}

/// Launches the external simulator as a child process per combination.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config: SimulatorConfig,
}

impl ProcessLauncher {
    /// Builds a launcher from the simulator settings.
    ///
    /// A program given as a relative path with directory components is
    /// resolved against the current directory, since the child runs inside
    /// its run directory.
    pub fn new(config: SimulatorConfig) -> Result<Self, SweepError> {
        let Some(program) = config.program.clone() else {
            return Err(SweepError::Config(
                ErrorInfo::new("config-program-missing", "no simulator program configured")
                    .with_hint("pass --program <PATH> or set simulator.program in the config file"),
            ));
        };
        let program = if program.components().count() > 1 && program.is_relative() {
            fs::canonicalize(&program).map_err(|err| {
                SweepError::Config(
                    ErrorInfo::new("config-program-resolve", err.to_string())
                        .with_context("program", program.display().to_string()),
                )
            })?
        } else {
            program
        };
        Ok(Self { program, config })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument vector for `combo`: fixed args then the rendered template.
    pub fn command_args(&self, combo: &Combination) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.extend(render_args(&self.config.arg_template, combo));
        args
    }

    fn spawn(&self, combo: &Combination, run_dir: &Path) -> Result<Child, SweepError> {
        let spawn_err = |code: &str, message: String| {
            SweepError::Execution(
                ErrorInfo::new(code, message)
                    .with_context("identity", combo.identity().as_str())
                    .with_context("program", self.program.display().to_string()),
            )
        };
        let mut command = Command::new(&self.program);
        command
            .args(self.command_args(combo))
            .current_dir(run_dir)
            .stdin(Stdio::null());
        if self.config.capture_output {
            let stdout = File::create(run_dir.join(STDOUT_FILE))
                .map_err(|err| spawn_err("run-capture", err.to_string()))?;
            let stderr = File::create(run_dir.join(STDERR_FILE))
                .map_err(|err| spawn_err("run-capture", err.to_string()))?;
            command.stdout(stdout).stderr(stderr);
        }
        command
            .spawn()
            .map_err(|err| spawn_err("run-spawn", err.to_string()))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, combo: &Combination, run_dir: &Path) -> Result<ExitClass, SweepError> {
        let mut child = self.spawn(combo, run_dir)?;
        let wait_err = |err: std::io::Error| {
            SweepError::Execution(
                ErrorInfo::new("run-wait", err.to_string())
                    .with_context("identity", combo.identity().as_str()),
            )
        };
        // A limit too large to represent as an instant is no limit at all.
        let deadline = self
            .config
            .timeout_secs
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));
        let Some(deadline) = deadline else {
            let status = child.wait().map_err(wait_err)?;
            return Ok(ExitClass::from_status(status));
        };
        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(ExitClass::from_status(status));
            }
            let now = Instant::now();
            if now >= deadline {
                // The child may exit between try_wait and kill; either way it is reaped below.
                let _ = child.kill();
                child.wait().map_err(wait_err)?;
                return Ok(ExitClass::TimedOut);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Substitutes combination parameters into an argument template.
pub fn render_args(template: &[String], combo: &Combination) -> Vec<String> {
    let [i, j, k] = combo.matrix.args();
    let matrix = format!("{i} {j} {k}");
    template
        .iter()
        .map(|arg| {
            arg.replace("{l1d_size}", &combo.cache_size.sized())
                .replace("{l1d_kib}", &combo.cache_size.to_string())
                .replace("{predictor}", combo.predictor.code())
                .replace("{matrix}", &matrix)
                .replace("{i}", &i)
                .replace("{j}", &j)
                .replace("{k}", &k)
        })
        .collect()
}

/// Executes `combo` in `run_dir` and enforces the success contract.
///
/// Anything other than [`ExitClass::Success`] removes the run directory and
/// surfaces as [`SweepError::Execution`].
pub fn execute(
    launcher: &dyn Launcher,
    combo: &Combination,
    run_dir: &RunDir,
) -> Result<(), SweepError> {
    let outcome = launcher.launch(combo, &run_dir.path);
    let error = match outcome {
        Ok(ExitClass::Success) => return Ok(()),
        Ok(class) => {
            let code = if class == ExitClass::TimedOut {
                "run-timeout"
            } else {
                "run-exit-status"
            };
            let mut info = ErrorInfo::new(code, "simulation did not complete successfully")
                .with_context("identity", combo.identity().as_str())
                .with_context("status", class.describe())
                .with_context("run_dir", run_dir.path.display().to_string());
            if let Some(tail) = stderr_tail(&run_dir.path) {
                info = info.with_hint(format!("stderr tail: {tail}"));
            }
            SweepError::Execution(info)
        }
        Err(err) => err,
    };
    cleanup(&run_dir.path, error)
}

fn cleanup(path: &Path, error: SweepError) -> Result<(), SweepError> {
    if let Err(err) = fs::remove_dir_all(path) {
        if path.exists() {
            let info = error
                .info()
                .clone()
                .with_context("cleanup_error", err.to_string());
            return Err(SweepError::Execution(info));
        }
    }
    Err(error)
}

fn stderr_tail(run_dir: &Path) -> Option<String> {
    let contents = fs::read_to_string(run_dir.join(STDERR_FILE)).ok()?;
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    Some(lines[start..].join(" / "))
}
