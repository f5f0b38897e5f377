//! Interpolation errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    /// A variable re-entered its own resolution, directly or transitively.
    /// The substitution cannot terminate, so the raw API fails hard.
    #[error("recursive variable reference: {0}")]
    RecursiveReference(String),
}

pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;
