use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SweepError};

/// L1 data cache capacity expressed in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheSizeKib(u32);

impl CacheSizeKib {
    /// Creates a cache size from its raw KiB count.
    pub fn from_raw(kib: u32) -> Self {
        Self(kib)
    }

    /// Returns the raw KiB count.
    pub fn as_raw(&self) -> u32 {
        self.0
    }

    /// Renders the size the way the simulator expects it, e.g. `32kB`.
    pub fn sized(&self) -> String {
        format!("{}kB", self.0)
    }
}

impl Display for CacheSizeKib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Branch predictor variant selected for a simulated CPU.
///
/// Serialized with the short selector codes understood by the simulator
/// script; the long names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Predictor {
    /// Per-branch local history predictor.
    #[serde(rename = "local")]
    Local,
    /// Tournament predictor combining local and global history.
    #[serde(rename = "tourn", alias = "tournament")]
    Tournament,
    /// Bi-mode predictor.
    #[serde(rename = "bi", alias = "bimodal")]
    Bimodal,
}

impl Predictor {
    /// All predictor variants in canonical order.
    pub const ALL: [Predictor; 3] = [Predictor::Local, Predictor::Tournament, Predictor::Bimodal];

    /// Short selector code passed to the simulator and used in identities.
    pub fn code(&self) -> &'static str {
        match self {
            Predictor::Local => "local",
            Predictor::Tournament => "tourn",
            Predictor::Bimodal => "bi",
        }
    }
}

impl Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Predictor {
    type Err = SweepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "local" => Ok(Predictor::Local),
            "tourn" | "tournament" => Ok(Predictor::Tournament),
            "bi" | "bimodal" => Ok(Predictor::Bimodal),
            other => Err(SweepError::Config(
                ErrorInfo::new("predictor-unknown", "unknown branch predictor")
                    .with_context("value", other)
                    .with_hint("expected one of: local, tourn, bi"),
            )),
        }
    }
}

/// Matrix dimensions handed to the simulated workload as `I J K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatrixTriple {
    /// Rows of the left operand.
    #[serde(rename = "I")]
    pub i: u32,
    /// Shared dimension.
    #[serde(rename = "J")]
    pub j: u32,
    /// Columns of the right operand.
    #[serde(rename = "K")]
    pub k: u32,
}

impl MatrixTriple {
    /// Creates a new triple.
    pub fn new(i: u32, j: u32, k: u32) -> Self {
        Self { i, j, k }
    }

    /// Positional arguments for the workload, in `I J K` order.
    pub fn args(&self) -> [String; 3] {
        [self.i.to_string(), self.j.to_string(), self.k.to_string()]
    }
}

impl Display for MatrixTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.i, self.j, self.k)
    }
}

impl FromStr for MatrixTriple {
    type Err = SweepError;

    /// Parses `I,J,K` (commas or `x` as separators).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            SweepError::Config(
                ErrorInfo::new("matrix-invalid", "matrix size must be three integers")
                    .with_context("value", value)
                    .with_hint("use the form I,J,K, e.g. 4,4,4"),
            )
        };
        let parts: Vec<&str> = value.split([',', 'x']).map(str::trim).collect();
        let [i, j, k] = parts.as_slice() else {
            return Err(invalid());
        };
        Ok(Self {
            i: i.parse().map_err(|_| invalid())?,
            j: j.parse().map_err(|_| invalid())?,
            k: k.parse().map_err(|_| invalid())?,
        })
    }
}

/// One point of the sweep: exactly one value from each dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination {
    /// L1 data cache size.
    pub cache_size: CacheSizeKib,
    /// Branch predictor variant.
    pub predictor: Predictor,
    /// Workload matrix dimensions.
    pub matrix: MatrixTriple,
}

impl Combination {
    /// Creates a combination from its three parameters.
    pub fn new(cache_size: CacheSizeKib, predictor: Predictor, matrix: MatrixTriple) -> Self {
        Self {
            cache_size,
            predictor,
            matrix,
        }
    }

    /// Returns the stable identity key for this combination.
    pub fn identity(&self) -> Identity {
        Identity(format!(
            "l1d:{} BP:{} M:{}",
            self.cache_size,
            self.predictor.code(),
            self.matrix
        ))
    }
}

impl Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identity().as_str())
    }
}

/// Deterministic key naming a [`Combination`], e.g. `l1d:16 BP:local M:4,4,4`.
///
/// The tag order is fixed (cache size, predictor, matrix) so the key does not
/// depend on enumeration order or process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reverses the identity format into the combination it names.
    pub fn parse(text: &str) -> Result<Combination, SweepError> {
        let invalid = |reason: &str| {
            SweepError::CorruptLedger(
                ErrorInfo::new("identity-invalid", reason.to_string())
                    .with_context("identity", text),
            )
        };
        let mut fields = text.split(' ');
        let (Some(l1d), Some(bp), Some(matrix), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(invalid("identity must have exactly three tagged fields"));
        };
        let size = l1d
            .strip_prefix("l1d:")
            .and_then(|raw| raw.parse::<u32>().ok())
            .ok_or_else(|| invalid("missing or malformed l1d tag"))?;
        let predictor = bp
            .strip_prefix("BP:")
            .ok_or_else(|| invalid("missing BP tag"))?
            .parse::<Predictor>()
            .map_err(|_| invalid("unknown predictor code"))?;
        let matrix = matrix
            .strip_prefix("M:")
            .filter(|raw| raw.split(',').count() == 3)
            .ok_or_else(|| invalid("missing or malformed M tag"))?
            .parse::<MatrixTriple>()
            .map_err(|_| invalid("matrix values must be integers"))?;
        Ok(Combination::new(CacheSizeKib::from_raw(size), predictor, matrix))
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
