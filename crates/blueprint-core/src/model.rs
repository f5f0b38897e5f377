//! The immutable project descriptor tree.
//!
//! A `Model` is produced by the descriptor parser and then refined by the
//! builder pipeline (profile injection, inheritance assembly, interpolation).
//! Every refinement step constructs a new tree; a published tree is never
//! mutated in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ProjectId;
use crate::profile::Profile;

/// A project descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Descriptor schema version (e.g. "1.0").
    pub schema_version: String,
    /// Group coordinate; may be inherited from the parent.
    pub group_id: Option<String>,
    /// Artifact coordinate.
    pub artifact_id: String,
    /// Version coordinate; may be inherited from the parent.
    pub version: Option<String>,
    /// Packaging kind ("app", "lib", "parent", ...).
    pub packaging: String,
    /// Human-readable name.
    pub name: Option<String>,
    /// Project URL.
    pub url: Option<String>,
    /// Declared ancestor, if any.
    pub parent: Option<Parent>,
    /// Descriptor-level properties.
    pub properties: HashMap<String, String>,
    /// Declared dependencies, in declaration order.
    pub dependencies: Vec<Dependency>,
    /// Declared repositories, in declaration order.
    pub repositories: Vec<Repository>,
    /// Sub-module directories, in declaration order.
    pub modules: Vec<String>,
    /// Conditionally activated configuration bundles.
    pub profiles: Vec<Profile>,
    /// Build section.
    pub build: Option<Build>,
    /// Path of the descriptor file this model was read from, when file-backed.
    #[serde(skip)]
    pub descriptor_file: Option<PathBuf>,
}

/// Declared ancestor coordinates plus an optional location hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// Relative path to the ancestor descriptor; defaults to ".." when absent.
    pub relative_path: Option<String>,
}

impl Parent {
    pub fn id(&self) -> ProjectId {
        ProjectId::new(&self.group_id, &self.artifact_id, &self.version)
    }
}

/// A declared dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
}

impl Dependency {
    /// Conflict key: two dependencies with the same key collide.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

/// A repository to fetch artifacts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub url: String,
}

/// The build section of a descriptor. Directory fields are aligned to the
/// project base directory after interpolation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub directory: Option<String>,
    pub output_directory: Option<String>,
    pub source_directory: Option<String>,
    pub test_source_directory: Option<String>,
    pub final_name: Option<String>,
}

impl Model {
    /// Identity of this model, with empty strings for coordinates that are
    /// still unresolved. Suitable for problem reporting at any pipeline stage.
    pub fn id(&self) -> ProjectId {
        ProjectId::new(
            self.group_id.clone().unwrap_or_default(),
            self.artifact_id.clone(),
            self.version.clone().unwrap_or_default(),
        )
    }

    /// Group coordinate, falling back to the parent declaration.
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or_else(|| self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    /// Version coordinate, falling back to the parent declaration.
    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.parent.as_ref().map(|p| p.version.as_str()))
    }

    /// Directory containing the descriptor file, when file-backed.
    pub fn project_dir(&self) -> Option<&Path> {
        self.descriptor_file.as_deref().and_then(Path::parent)
    }

    pub fn with_descriptor_file(self, file: impl Into<PathBuf>) -> Self {
        Self {
            descriptor_file: Some(file.into()),
            ..self
        }
    }

    /// Serializes the model as pretty JSON, used to export effective
    /// descriptors for inspection.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Rebuilds the tree with `f` applied to every string-valued field,
    /// recursing through nested objects and list elements. Property keys,
    /// profile ids and activation declarations are not transformed;
    /// activation conditions are evaluated before interpolation by contract.
    pub fn map_strings<F>(&self, f: &mut F) -> Model
    where
        F: FnMut(&str) -> String,
    {
        let map_opt = |f: &mut F, v: &Option<String>| v.as_deref().map(|s| f(s));
        Model {
            schema_version: f(&self.schema_version),
            group_id: map_opt(f, &self.group_id),
            artifact_id: f(&self.artifact_id),
            version: map_opt(f, &self.version),
            packaging: f(&self.packaging),
            name: map_opt(f, &self.name),
            url: map_opt(f, &self.url),
            parent: self.parent.as_ref().map(|p| Parent {
                group_id: f(&p.group_id),
                artifact_id: f(&p.artifact_id),
                version: f(&p.version),
                relative_path: map_opt(f, &p.relative_path),
            }),
            properties: self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), f(v)))
                .collect(),
            dependencies: self
                .dependencies
                .iter()
                .map(|d| map_dependency(f, d))
                .collect(),
            repositories: self
                .repositories
                .iter()
                .map(|r| map_repository(f, r))
                .collect(),
            modules: self.modules.iter().map(|m| f(m)).collect(),
            profiles: self
                .profiles
                .iter()
                .map(|p| Profile {
                    id: p.id.clone(),
                    source: p.source,
                    activation: p.activation.clone(),
                    properties: p.properties.iter().map(|(k, v)| (k.clone(), f(v))).collect(),
                    dependencies: p.dependencies.iter().map(|d| map_dependency(f, d)).collect(),
                    repositories: p.repositories.iter().map(|r| map_repository(f, r)).collect(),
                })
                .collect(),
            build: self.build.as_ref().map(|b| Build {
                directory: map_opt(f, &b.directory),
                output_directory: map_opt(f, &b.output_directory),
                source_directory: map_opt(f, &b.source_directory),
                test_source_directory: map_opt(f, &b.test_source_directory),
                final_name: map_opt(f, &b.final_name),
            }),
            descriptor_file: self.descriptor_file.clone(),
        }
    }
}

fn map_dependency<F: FnMut(&str) -> String>(f: &mut F, d: &Dependency) -> Dependency {
    Dependency {
        group_id: f(&d.group_id),
        artifact_id: f(&d.artifact_id),
        version: d.version.as_deref().map(|s| f(s)),
        scope: d.scope.as_deref().map(|s| f(s)),
    }
}

fn map_repository<F: FnMut(&str) -> String>(f: &mut F, r: &Repository) -> Repository {
    Repository {
        id: f(&r.id),
        url: f(&r.url),
    }
}
