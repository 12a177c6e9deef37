//! Error type shared by every stage of the sampler.

use thiserror::Error;

/// Errors raised while processing a scan.
///
/// Data problems ([`SamplerError::InsufficientData`], [`SamplerError::Operator`]) make the
/// batch runner skip the offending scan and move on. Contract violations
/// ([`SamplerError::ShapeMismatch`], [`SamplerError::Config`]) also abort the scan but are
/// reported as internal inconsistencies rather than bad input.
#[derive(Error, Debug)]
pub enum SamplerError {
    /// A scan has too few usable sources or detectors after masking.
    #[error("insufficient data in scan {scan}: {reason}")]
    InsufficientData {
        /// Identifier of the scan.
        scan: String,
        /// What was missing.
        reason: String,
    },

    /// A flat vector or structured array did not have the length/shape required.
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// The operation that detected the mismatch.
        what: &'static str,
        /// Expected length (number of elements).
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },

    /// Propagated from the projection or noise operators.
    #[error("operator failure: {0}")]
    Operator(String),

    /// Configuration values out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SamplerError {
    /// Builds an [`SamplerError::InsufficientData`] for `scan`.
    pub fn insufficient(scan: &str, reason: impl Into<String>) -> Self {
        SamplerError::InsufficientData {
            scan: scan.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error signals an internal inconsistency rather than a data problem.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SamplerError::ShapeMismatch { .. } | SamplerError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SamplerError>;
