use std::fs;

use simsweep_core::{CacheSizeKib, MatrixTriple, Predictor, SweepError};
use simsweep_exp::{Dimensions, Ledger};
use tempfile::tempdir;

fn dims() -> Dimensions {
    Dimensions {
        cache_sizes_kib: vec![CacheSizeKib::from_raw(16), CacheSizeKib::from_raw(32)],
        predictors: vec![Predictor::Local, Predictor::Tournament],
        matrix_sizes: vec![MatrixTriple::new(4, 4, 4)],
    }
}

fn expect_corrupt(contents: &str) -> SweepError {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    fs::write(&path, contents).unwrap();
    let err = Ledger::load(&path, &dims()).unwrap_err();
    assert!(
        matches!(err, SweepError::CorruptLedger(_)),
        "unexpected error {err}"
    );
    // The damaged document is left untouched for the operator.
    assert_eq!(fs::read_to_string(&path).unwrap(), contents);
    err
}

#[test]
fn reads_documents_with_legacy_field_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tests.json");
    fs::write(
        &path,
        r#"{"Cache_size": [16, 24, 32, 48], "Predictor": ["local", "tourn"], "Matrix_size": [{"I": 4, "J": 4, "K": 4}, {"I": 6, "J": 6, "K": 6}], "done": ["l1d:16 BP:local M:4,4,4", "l1d:16 BP:local M:6,6,6"]}"#,
    )
    .unwrap();
    let ledger = Ledger::load(&path, &dims()).unwrap();
    assert_eq!(ledger.dimensions(), &Dimensions::default());
    assert_eq!(ledger.done_count(), 2);
    let status = ledger.status();
    assert_eq!(status.total, 16);
    assert_eq!(status.pending, 14);
    assert_eq!(
        status.pending_identities[0].as_str(),
        "l1d:16 BP:tourn M:4,4,4"
    );
}

#[test]
fn unparseable_document_is_corrupt() {
    let err = expect_corrupt("{\"Cache_size\": [16,");
    assert_eq!(err.info().code, "ledger-parse");
}

#[test]
fn wrong_shape_is_corrupt() {
    expect_corrupt(r#"{"Cache_size": "16", "Predictor": [], "Matrix_size": [], "done": []}"#);
    expect_corrupt(r#"{"Cache_size": [16], "Predictor": ["gshare"], "Matrix_size": [], "done": []}"#);
    expect_corrupt(r#"{"Cache_size": [16], "Predictor": ["local"], "Matrix_size": [{"I": 4}], "done": []}"#);
}

#[test]
fn repeated_dimension_value_is_corrupt() {
    let err = expect_corrupt(
        r#"{"Cache_size": [16, 16], "Predictor": ["local"], "Matrix_size": [{"I":4,"J":4,"K":4}], "done": []}"#,
    );
    assert_eq!(err.info().code, "ledger-duplicate-value");
}

#[test]
fn done_entry_outside_grid_is_corrupt() {
    let err = expect_corrupt(
        r#"{"Cache_size": [16], "Predictor": ["local"], "Matrix_size": [{"I":4,"J":4,"K":4}], "done": ["l1d:64 BP:local M:4,4,4"]}"#,
    );
    assert_eq!(err.info().code, "ledger-identity-unknown");
    expect_corrupt(
        r#"{"Cache_size": [16], "Predictor": ["local"], "Matrix_size": [{"I":4,"J":4,"K":4}], "done": ["whatever"]}"#,
    );
}

#[test]
fn existing_dimensions_win_over_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    Ledger::load(&path, &dims()).unwrap();
    let reloaded = Ledger::load(&path, &Dimensions::default()).unwrap();
    assert_eq!(reloaded.dimensions(), &dims());
}

#[test]
fn interrupted_sweep_reloads_exactly_the_persisted_prefix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let identities: Vec<_> = dims().combinations().map(|combo| combo.identity()).collect();
    {
        let mut ledger = Ledger::load(&path, &dims()).unwrap();
        ledger.mark_done(identities[0].clone()).unwrap();
        ledger.mark_done(identities[1].clone()).unwrap();
        // Process dies here while the third combination is still running.
    }
    let reloaded = Ledger::load(&path, &dims()).unwrap();
    assert_eq!(reloaded.done_count(), 2);
    assert!(reloaded.is_done(&identities[0]));
    assert!(reloaded.is_done(&identities[1]));
    assert!(!reloaded.is_done(&identities[2]));
    assert_eq!(reloaded.document().done, identities[..2].to_vec());
}

#[test]
fn persisting_leaves_no_temporary_files_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let mut ledger = Ledger::load(&path, &dims()).unwrap();
    for combo in dims().combinations() {
        ledger.mark_done(combo.identity()).unwrap();
    }
    let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(Ledger::open(&path).unwrap().status().pending, 0);
}

#[test]
fn opening_a_missing_ledger_fails_without_creating_it() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = Ledger::open(&path).unwrap_err();
    assert_eq!(err.info().code, "ledger-read");
    assert!(!path.exists());
}

#[test]
fn failed_write_rolls_back_the_done_set() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let mut ledger = Ledger::load(&path, &dims()).unwrap();
    // A non-empty directory in place of the document makes the final rename fail.
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();
    fs::write(path.join("occupied"), "").unwrap();

    let identity = dims().combinations().next().unwrap().identity();
    let err = ledger.mark_done(identity.clone()).unwrap_err();
    assert!(matches!(err, SweepError::Ledger(_)), "unexpected error {err}");
    assert_eq!(err.info().code, "ledger-replace");
    assert!(!ledger.is_done(&identity));
    assert_eq!(ledger.done_count(), 0);
    assert!(ledger.document().done.is_empty());
}

#[cfg(unix)]
#[test]
fn rewrites_keep_the_document_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let mut ledger = Ledger::load(&path, &dims()).unwrap();
    let mode = |path: &std::path::Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode(&path), 0o644);

    fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
    let identity = dims().combinations().next().unwrap().identity();
    ledger.mark_done(identity).unwrap();
    assert_eq!(mode(&path), 0o640);
}
