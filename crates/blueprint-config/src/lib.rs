//! KDL descriptor parsing for Blueprint.
//!
//! Parses `blueprint.kdl` project descriptors into the immutable
//! [`blueprint_core::Model`] tree consumed by the builder pipeline.

pub mod error;
pub mod project;

pub use error::{ConfigError, ConfigResult};
pub use project::{parse_project, parse_source, read_project};
