//! Severity-tagged diagnostics accumulated across the builder pipeline.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Problem severity. `Fatal` aborts the current build step; `Error` marks the
/// build as ultimately failed but lets traversal continue; `Warning` never
/// blocks anything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
pub enum Severity {
    #[display("warning")]
    Warning,
    #[display("error")]
    Error,
    #[display("fatal")]
    Fatal,
}

/// Position of a problem within a descriptor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// One diagnostic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    /// Identity of the model the problem belongs to, when known.
    pub source: Option<String>,
    pub location: Option<SourceLocation>,
    /// Stringified originating error, when one exists.
    pub cause: Option<String>,
}

/// Accumulates problems for one build invocation. The collector tracks the
/// identity of the model currently being processed so subsystems don't have
/// to thread it through every call.
#[derive(Debug, Default)]
pub struct ProblemCollector {
    problems: Vec<Problem>,
    source: Option<String>,
}

impl ProblemCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model id attached to subsequently added problems.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    pub fn add(&mut self, severity: Severity, message: impl Into<String>) {
        self.push(severity, message, None, None);
    }

    pub fn add_at(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        location: SourceLocation,
    ) {
        self.push(severity, message, Some(location), None);
    }

    pub fn add_with_cause(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        cause: &dyn std::error::Error,
    ) {
        self.push(severity, message, None, Some(cause.to_string()));
    }

    fn push(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        location: Option<SourceLocation>,
        cause: Option<String>,
    ) {
        self.problems.push(Problem {
            severity,
            message: message.into(),
            source: self.source.clone(),
            location,
            cause,
        });
    }

    /// True once any Error or Fatal problem was collected.
    pub fn has_errors(&self) -> bool {
        self.problems.iter().any(|p| p.severity >= Severity::Error)
    }

    pub fn has_fatal(&self) -> bool {
        self.problems.iter().any(|p| p.severity == Severity::Fatal)
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.problems
            .iter()
            .filter(|p| p.severity == severity)
            .count()
    }

    pub fn into_problems(self) -> Vec<Problem> {
        self.problems
    }
}
