#![deny(missing_docs)]
#![doc = "Core value types and structured errors for the simsweep experiment orchestrator."]

pub mod errors;
mod types;

pub use errors::{ErrorInfo, SweepError};
pub use types::{CacheSizeKib, Combination, Identity, MatrixTriple, Predictor};
