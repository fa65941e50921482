//! Structured error types shared across simsweep crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SweepError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (identities, paths, exit statuses).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the operator resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the sweep orchestrator.
///
/// Every family is fatal to the sweep; none of them touches progress that
/// was already recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SweepError {
    /// Required settings are missing or invalid.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// The persisted ledger exists but does not match the expected schema.
    #[error("corrupt ledger: {0}")]
    CorruptLedger(ErrorInfo),
    /// The ledger could not be read or written.
    #[error("ledger error: {0}")]
    Ledger(ErrorInfo),
    /// A run directory could not be allocated.
    #[error("run directory error: {0}")]
    RunDirectory(ErrorInfo),
    /// A child simulation failed, was signaled or timed out.
    #[error("execution failure: {0}")]
    Execution(ErrorInfo),
    /// Serialization of an auxiliary artifact failed.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

/// Context key naming the combination an error belongs to.
pub const IDENTITY_KEY: &str = "identity";

impl ErrorInfo {
    /// Identity of the combination the error concerns, when known.
    pub fn identity(&self) -> Option<&str> {
        self.context.get(IDENTITY_KEY).map(String::as_str)
    }
}

/// Renders `message (code: c) | identity: id | context: [k=v, ...] | hint: h`
/// on one line.
impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if let Some(identity) = self.identity() {
            write!(f, " | identity: {identity}")?;
        }
        let mut rest = self
            .context
            .iter()
            .filter(|(key, _)| key.as_str() != IDENTITY_KEY)
            .peekable();
        if rest.peek().is_some() {
            let pairs: Vec<String> = rest.map(|(key, value)| format!("{key}={value}")).collect();
            write!(f, " | context: [{}]", pairs.join(", "))?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl SweepError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SweepError::Config(info)
            | SweepError::CorruptLedger(info)
            | SweepError::Ledger(info)
            | SweepError::RunDirectory(info)
            | SweepError::Execution(info)
            | SweepError::Serde(info) => info,
        }
    }

    /// Returns the stable family name used in reports.
    pub fn family(&self) -> &'static str {
        match self {
            SweepError::Config(_) => "config",
            SweepError::CorruptLedger(_) => "corrupt-ledger",
            SweepError::Ledger(_) => "ledger",
            SweepError::RunDirectory(_) => "run-directory",
            SweepError::Execution(_) => "execution",
            SweepError::Serde(_) => "serde",
        }
    }
}
