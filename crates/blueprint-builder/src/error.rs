//! Builder pipeline errors.

use thiserror::Error;

use crate::builder::BuildResult;

/// Marker raised after a FATAL problem was recorded in the collector; the
/// current build step aborts but the partial result stays available.
#[derive(Debug, Error)]
#[error("fatal problem recorded")]
pub struct Fatal;

/// The build failed; the partial result, including every accumulated
/// problem, travels with the error.
#[derive(Debug, Error)]
#[error("project build failed with {} problem(s)", .result.problems.len())]
pub struct BuildError {
    pub result: BuildResult,
}
