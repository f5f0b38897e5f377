//! Profiles and activation declarations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Dependency, Repository};

/// A named, conditionally activated bundle of configuration overrides.
/// Profiles are immutable once parsed; activation never modifies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Identifier, unique within its source.
    pub id: String,
    /// Where the profile was declared.
    pub source: ProfileSource,
    /// Declared activation; a profile without one only activates explicitly.
    pub activation: Option<Activation>,
    /// Properties injected into the activation context when active.
    pub properties: HashMap<String, String>,
    pub dependencies: Vec<Dependency>,
    pub repositories: Vec<Repository>,
}

/// Origin of a profile declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileSource {
    /// Declared in the project descriptor itself.
    #[default]
    Descriptor,
    /// Supplied externally (settings, request).
    External,
}

/// The declared condition(s) controlling whether a profile applies.
/// At most one condition per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    /// Activate when no other profile of the same list activated.
    pub active_by_default: bool,
    pub property: Option<ActivationProperty>,
    pub file: Option<ActivationFile>,
    pub os: Option<ActivationOs>,
    /// Toolchain version prefix, negation (`!1.8`) or range (`[17,21)`).
    pub jdk: Option<String>,
    pub custom: Option<ActivationCustom>,
}

/// Property condition: with a value, exact match; without, mere definedness.
/// A leading `!` on the name negates the test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationProperty {
    pub name: String,
    pub value: Option<String>,
}

/// Filesystem condition over `exists` / `missing` path expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationFile {
    pub exists: Option<String>,
    pub missing: Option<String>,
}

/// Operating system condition. Fields with a leading `!` are negated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationOs {
    pub family: Option<String>,
    pub name: Option<String>,
    pub arch: Option<String>,
    pub version: Option<String>,
}

/// Open extension point: dispatched on `kind` to a handler registered with
/// the selector at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationCustom {
    pub kind: String,
    pub params: HashMap<String, String>,
}
