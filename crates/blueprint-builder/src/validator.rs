//! Descriptor validation.
//!
//! Raw validation runs on the parsed descriptor before assembly and accepts
//! unresolved `${...}` expressions; effective validation runs on the fully
//! assembled tree and demands resolved coordinates.

use std::collections::HashSet;
use std::sync::LazyLock;

use blueprint_core::{Model, ProblemCollector, Severity};
use regex::Regex;

use crate::error::Fatal;

/// Descriptor schema versions this builder understands.
const SUPPORTED_SCHEMA_VERSIONS: [&str; 1] = ["1.0"];

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());

#[derive(Debug, Default)]
pub struct ModelValidator;

impl ModelValidator {
    /// Structural checks on a freshly parsed descriptor. An unsupported
    /// schema version is fatal; everything else accumulates.
    pub fn validate_raw(
        &self,
        model: &Model,
        problems: &mut ProblemCollector,
    ) -> Result<(), Fatal> {
        if !SUPPORTED_SCHEMA_VERSIONS.contains(&model.schema_version.as_str()) {
            problems.add(
                Severity::Fatal,
                format!(
                    "Unsupported descriptor schema version \"{}\", expected one of {:?}",
                    model.schema_version, SUPPORTED_SCHEMA_VERSIONS
                ),
            );
            return Err(Fatal);
        }

        if model.artifact_id.is_empty() {
            problems.add(Severity::Error, "'project' is missing an artifact id");
        } else {
            self.check_id("project artifact id", &model.artifact_id, problems);
        }

        if model.group_id.is_none() && model.parent.is_none() {
            problems.add(
                Severity::Error,
                "'project' must declare a group or inherit one from a parent",
            );
        }
        if model.version.is_none() && model.parent.is_none() {
            problems.add(
                Severity::Error,
                "'project' must declare a version or inherit one from a parent",
            );
        }

        let mut dependency_keys = HashSet::new();
        for dependency in &model.dependencies {
            if !dependency_keys.insert(dependency.key()) {
                problems.add(
                    Severity::Error,
                    format!(
                        "'dependency' {} is declared more than once",
                        dependency.key()
                    ),
                );
            }
        }

        let mut profile_ids = HashSet::new();
        for profile in &model.profiles {
            if !profile_ids.insert(profile.id.as_str()) {
                problems.add(
                    Severity::Error,
                    format!("'profile' id '{}' is declared more than once", profile.id),
                );
            }
        }

        Ok(())
    }

    /// Checks the assembled, interpolated descriptor: identity must be
    /// complete and dependency versions resolved.
    pub fn validate_effective(&self, model: &Model, problems: &mut ProblemCollector) {
        if model.group_id.is_none() {
            problems.add(Severity::Error, "effective descriptor has no group id");
        }
        if model.version.is_none() {
            problems.add(Severity::Error, "effective descriptor has no version");
        }
        for dependency in &model.dependencies {
            if dependency.version.is_none() {
                problems.add(
                    Severity::Error,
                    format!("'dependency' {} is missing a version", dependency.key()),
                );
            }
        }
    }

    /// Ids may embed expressions before interpolation; only literal ids are
    /// checked against the allowed character set.
    fn check_id(&self, field: &str, value: &str, problems: &mut ProblemCollector) {
        if value.contains("${") {
            return;
        }
        if !ID_REGEX.is_match(value) {
            problems.add(
                Severity::Error,
                format!("{field} '{value}' contains illegal characters"),
            );
        }
    }
}
