use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use simsweep_core::{Combination, ErrorInfo, SweepError};

/// Suffix attempts before giving up on a name that keeps colliding.
const MAX_SUFFIX: usize = 1024;

/// Parameters file written into every run directory.
pub const PARAMS_FILE: &str = "params.json";

/// Allocates one fresh, descriptively named directory per run.
#[derive(Debug, Clone)]
pub struct RunDirAllocator {
    base: PathBuf,
}

/// A created run directory and the moment it was allocated.
#[derive(Debug, Clone)]
pub struct RunDir {
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunParams {
    identity: String,
    l1d_size: String,
    cache_size_kib: u32,
    predictor: String,
    i: u32,
    j: u32,
    k: u32,
    started_at: String,
}

impl RunDirAllocator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Name encoding the combination plus a nanosecond timestamp, e.g.
    /// `blocal_l1d32kB_m4x4x4_2024-03-01-14h05m09s-000123456`.
    pub fn dir_name(combo: &Combination, at: &DateTime<Local>) -> String {
        format!(
            "b{}_l1d{}_m{}x{}x{}_{}-{:09}",
            combo.predictor.code(),
            combo.cache_size.sized(),
            combo.matrix.i,
            combo.matrix.j,
            combo.matrix.k,
            at.format("%Y-%m-%d-%Hh%Mm%Ss"),
            at.timestamp_subsec_nanos(),
        )
    }

    /// Creates a new run directory for `combo` and records its parameters.
    ///
    /// The leaf is created with `create_dir`, so an existing path is never
    /// reused; a numeric suffix is appended instead.
    pub fn allocate(&self, combo: &Combination) -> Result<RunDir, SweepError> {
        let failure = |code: &str, path: &Path, err: std::io::Error| {
            SweepError::RunDirectory(
                ErrorInfo::new(code, err.to_string())
                    .with_context("identity", combo.identity().as_str())
                    .with_context("path", path.display().to_string()),
            )
        };
        fs::create_dir_all(&self.base).map_err(|err| failure("rundir-base", &self.base, err))?;

        let started_at = Local::now();
        let name = Self::dir_name(combo, &started_at);
        for attempt in 0..MAX_SUFFIX {
            let candidate = if attempt == 0 {
                self.base.join(&name)
            } else {
                self.base.join(format!("{name}-{attempt}"))
            };
            match fs::create_dir(&candidate) {
                Ok(()) => {
                    let run_dir = RunDir {
                        path: candidate,
                        started_at,
                    };
                    if let Err(err) = write_params(&run_dir, combo) {
                        let _ = fs::remove_dir_all(&run_dir.path);
                        return Err(err);
                    }
                    return Ok(run_dir);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(failure("rundir-create", &candidate, err)),
            }
        }
        Err(SweepError::RunDirectory(
            ErrorInfo::new("rundir-exhausted", "every candidate run directory name is taken")
                .with_context("identity", combo.identity().as_str())
                .with_context("base", self.base.display().to_string()),
        ))
    }
}

fn write_params(run_dir: &RunDir, combo: &Combination) -> Result<(), SweepError> {
    let params = RunParams {
        identity: combo.identity().into(),
        l1d_size: combo.cache_size.sized(),
        cache_size_kib: combo.cache_size.as_raw(),
        predictor: combo.predictor.code().to_string(),
        i: combo.matrix.i,
        j: combo.matrix.j,
        k: combo.matrix.k,
        started_at: run_dir.started_at.to_rfc3339(),
    };
    let path = run_dir.path.join(PARAMS_FILE);
    let json = serde_json::to_string_pretty(&params).map_err(|err| {
        SweepError::Serde(
            ErrorInfo::new("params-serialize", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    fs::write(&path, json).map_err(|err| {
        SweepError::RunDirectory(
            ErrorInfo::new("params-write", err.to_string())
                .with_context("identity", combo.identity().as_str())
                .with_context("path", path.display().to_string()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use simsweep_core::{CacheSizeKib, MatrixTriple, Predictor};
    use tempfile::tempdir;

    fn combo() -> Combination {
        Combination::new(
            CacheSizeKib::from_raw(32),
            Predictor::Tournament,
            MatrixTriple::new(4, 6, 8),
        )
    }

    #[test]
    fn name_encodes_parameters() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
        assert_eq!(
            RunDirAllocator::dir_name(&combo(), &at),
            "btourn_l1d32kB_m4x6x8_2024-03-01-14h05m09s-000000000"
        );
    }

    #[test]
    fn repeated_allocations_never_collide() {
        let dir = tempdir().unwrap();
        let allocator = RunDirAllocator::new(dir.path().join("out"));
        let first = allocator.allocate(&combo()).unwrap();
        let second = allocator.allocate(&combo()).unwrap();
        assert_ne!(first.path, second.path);
        assert!(first.path.is_dir());
        assert!(second.path.join(PARAMS_FILE).is_file());
    }
}
