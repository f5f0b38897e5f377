//! Core domain types and traits for the Blueprint descriptor builder.
//!
//! This crate contains:
//! - The immutable project descriptor tree (`Model` and friends)
//! - Project identity (`ProjectId`)
//! - Profiles and their activation declarations
//! - The severity-tagged problem collector
//! - Descriptor source and root-locator abstractions

pub mod error;
pub mod id;
pub mod model;
pub mod problem;
pub mod profile;
pub mod source;

pub use error::{Error, Result};
pub use id::ProjectId;
pub use model::{Build, Dependency, Model, Parent, Repository};
pub use problem::{Problem, ProblemCollector, Severity, SourceLocation};
pub use profile::{
    Activation, ActivationCustom, ActivationFile, ActivationOs, ActivationProperty, Profile,
    ProfileSource,
};
pub use source::{FileModelSource, ModelSource, RootLocator, StandardRootLocator, StringModelSource};
