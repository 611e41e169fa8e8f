//! Error types.
//!
//! [`DescriptionError`] is reported while building pattern descriptions and
//! never reaches the engine. [`CoverageError`] aborts a running query; the
//! public decision procedure turns it into [`Verdict::CannotDetermine`].
//!
//! [`Verdict::CannotDetermine`]: crate::Verdict::CannotDetermine

use smol_str::SmolStr;
use thiserror::Error;

/// Malformed deconstruction pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    #[error("`{0}` is not a record type and cannot be deconstructed")]
    NotARecord(SmolStr),

    #[error("Deconstruction of `{record}` has {found} components, expected {expected}")]
    ArityMismatch {
        record: SmolStr,
        expected: usize,
        found: usize,
    },
}

/// A query that had to be abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoverageError {
    #[error("Reduction did not converge after {limit} iterations ({patterns} patterns)")]
    IterationLimit { limit: usize, patterns: usize },

    #[error("Nested reduction exceeded the depth limit of {0}")]
    DepthLimit(usize),

    #[error("Exhaustiveness check was cancelled")]
    Cancelled,
}

pub type CoverageResult<T> = Result<T, CoverageError>;
