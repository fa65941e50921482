use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use simsweep_core::{CacheSizeKib, ErrorInfo, Identity, MatrixTriple, Predictor, SweepError};
use tempfile::NamedTempFile;

use crate::grid::Dimensions;

/// On-disk shape of the ledger. The capitalised field names are part of the
/// established file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    /// Cache sizes in KiB.
    #[serde(rename = "Cache_size")]
    pub cache_sizes: Vec<CacheSizeKib>,
    /// Predictor selector codes.
    #[serde(rename = "Predictor")]
    pub predictors: Vec<Predictor>,
    /// Matrix triples as `{"I", "J", "K"}` records.
    #[serde(rename = "Matrix_size")]
    pub matrix_sizes: Vec<MatrixTriple>,
    /// Identities of combinations that completed successfully.
    #[serde(default)]
    pub done: Vec<Identity>,
}

impl LedgerDocument {
    /// Creates a document with an empty done-set.
    pub fn fresh(dims: &Dimensions) -> Self {
        Self {
            cache_sizes: dims.cache_sizes_kib.clone(),
            predictors: dims.predictors.clone(),
            matrix_sizes: dims.matrix_sizes.clone(),
            done: Vec::new(),
        }
    }

    /// Returns the dimensions recorded in the document.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            cache_sizes_kib: self.cache_sizes.clone(),
            predictors: self.predictors.clone(),
            matrix_sizes: self.matrix_sizes.clone(),
        }
    }
}

/// Progress summary derived from a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatus {
    /// Ledger document location.
    pub path: String,
    /// Cardinality of the recorded grid.
    pub total: usize,
    /// Size of the done-set.
    pub done: usize,
    /// Combinations still to run.
    pub pending: usize,
    /// Pending identities in enumeration order.
    pub pending_identities: Vec<Identity>,
}

/// Durable record of which combinations finished successfully.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    dims: Dimensions,
    document: LedgerDocument,
    done: HashSet<Identity>,
}

impl Ledger {
    /// Loads the ledger at `path`, creating and persisting a fresh one seeded
    /// with `defaults` when no document exists yet.
    pub fn load(path: &Path, defaults: &Dimensions) -> Result<Self, SweepError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_contents(path, &contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if let Some((dimension, value)) = defaults.find_duplicate() {
                    return Err(SweepError::Config(
                        ErrorInfo::new("dimension-duplicate", "dimension repeats a value")
                            .with_context("dimension", dimension)
                            .with_context("value", value),
                    ));
                }
                let ledger = Self {
                    path: path.to_path_buf(),
                    dims: defaults.clone(),
                    document: LedgerDocument::fresh(defaults),
                    done: HashSet::new(),
                };
                ledger.persist()?;
                Ok(ledger)
            }
            Err(err) => Err(SweepError::Ledger(
                ErrorInfo::new("ledger-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )),
        }
    }

    /// Opens an existing ledger without creating one.
    pub fn open(path: &Path) -> Result<Self, SweepError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            SweepError::Ledger(
                ErrorInfo::new("ledger-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_contents(path, &contents)
    }

    fn from_contents(path: &Path, contents: &str) -> Result<Self, SweepError> {
        let corrupt = |code: &str, message: String| {
            SweepError::CorruptLedger(
                ErrorInfo::new(code, message)
                    .with_context("path", path.display().to_string())
                    .with_hint("repair or remove the ledger file; removing it discards recorded progress"),
            )
        };
        let mut document: LedgerDocument = serde_json::from_str(contents)
            .map_err(|err| corrupt("ledger-parse", err.to_string()))?;
        let dims = document.dimensions();
        if let Some((dimension, value)) = dims.find_duplicate() {
            return Err(corrupt(
                "ledger-duplicate-value",
                format!("{dimension} dimension repeats {value}"),
            ));
        }

        let mut done = HashSet::with_capacity(document.done.len());
        let mut unique = Vec::with_capacity(document.done.len());
        for identity in document.done.drain(..) {
            let combo = Identity::parse(identity.as_str())
                .map_err(|err| corrupt("ledger-identity", err.info().message.clone()))?;
            if combo.identity() != identity || !dims.contains(&combo) {
                return Err(corrupt(
                    "ledger-identity-unknown",
                    format!("done entry '{identity}' is not a point of the recorded dimensions"),
                ));
            }
            if done.insert(identity.clone()) {
                unique.push(identity);
            }
        }
        document.done = unique;

        Ok(Self {
            path: path.to_path_buf(),
            dims,
            document,
            done,
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimensions recorded in the ledger.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    /// Current document contents.
    pub fn document(&self) -> &LedgerDocument {
        &self.document
    }

    /// Membership test against the done-set.
    pub fn is_done(&self, identity: &Identity) -> bool {
        self.done.contains(identity)
    }

    /// Number of recorded identities.
    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    /// Records `identity` as done and rewrites the whole document.
    ///
    /// On a failed write the in-memory state is rolled back so memory and
    /// disk keep agreeing.
    pub fn mark_done(&mut self, identity: Identity) -> Result<(), SweepError> {
        if !self.done.insert(identity.clone()) {
            return Ok(());
        }
        self.document.done.push(identity.clone());
        if let Err(err) = self.persist() {
            self.document.done.pop();
            self.done.remove(&identity);
            return Err(err);
        }
        Ok(())
    }

    /// Summarises progress against the ledger's own dimensions.
    pub fn status(&self) -> LedgerStatus {
        let pending_identities: Vec<Identity> = self
            .dims
            .combinations()
            .map(|combo| combo.identity())
            .filter(|identity| !self.is_done(identity))
            .collect();
        LedgerStatus {
            path: self.path.display().to_string(),
            total: self.dims.len(),
            done: self.done.len(),
            pending: pending_identities.len(),
            pending_identities,
        }
    }

    /// Writes the document to a sibling temporary file and renames it over
    /// the ledger path, so readers only ever see a complete document.
    fn persist(&self) -> Result<(), SweepError> {
        let write_err = |code: &str, message: String| {
            SweepError::Ledger(
                ErrorInfo::new(code, message).with_context("path", self.path.display().to_string()),
            )
        };
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| write_err("ledger-mkdir", err.to_string()))?;
        let mut json = serde_json::to_string_pretty(&self.document)
            .map_err(|err| write_err("ledger-serialize", err.to_string()))?;
        json.push('\n');

        let mut temp = NamedTempFile::new_in(&parent)
            .map_err(|err| write_err("ledger-write", err.to_string()))?;
        temp.write_all(json.as_bytes())
            .map_err(|err| write_err("ledger-write", err.to_string()))?;
        if let Some(permissions) = document_permissions(&self.path) {
            temp.as_file()
                .set_permissions(permissions)
                .map_err(|err| write_err("ledger-write", err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| write_err("ledger-sync", err.to_string()))?;
        temp.persist(&self.path)
            .map_err(|err| write_err("ledger-replace", err.error.to_string()))?;
        Ok(())
    }
}

/// Mode for the rewritten document: the current file's, or `0644` for a new
/// ledger, since temporary files are created owner-only.
fn document_permissions(path: &Path) -> Option<fs::Permissions> {
    match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => fresh_permissions(),
    }
}

#[cfg(unix)]
fn fresh_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn fresh_permissions() -> Option<fs::Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_ledger_is_persisted_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        let ledger = Ledger::load(&path, &Dimensions::default()).unwrap();
        assert!(path.exists());
        assert_eq!(ledger.done_count(), 0);
        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.dimensions(), &Dimensions::default());
    }

    #[test]
    fn mark_done_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::load(&path, &Dimensions::default()).unwrap();
        let identity = Dimensions::default().combinations().next().unwrap().identity();
        ledger.mark_done(identity.clone()).unwrap();
        ledger.mark_done(identity.clone()).unwrap();
        assert_eq!(ledger.document().done, vec![identity]);
    }

    #[test]
    fn duplicate_done_entries_collapse_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(
            &path,
            r#"{"Cache_size":[16],"Predictor":["local"],"Matrix_size":[{"I":4,"J":4,"K":4}],
               "done":["l1d:16 BP:local M:4,4,4","l1d:16 BP:local M:4,4,4"]}"#,
        )
        .unwrap();
        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.done_count(), 1);
        assert_eq!(ledger.document().done.len(), 1);
        assert_eq!(ledger.status().pending, 0);
    }
}
