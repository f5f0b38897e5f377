//! Project descriptor parsing.

use blueprint_core::{
    Activation, ActivationCustom, ActivationFile, ActivationOs, ActivationProperty, Build,
    Dependency, Model, ModelSource, Parent, Profile, ProfileSource, Repository,
};
use kdl::{KdlDocument, KdlNode};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::{ConfigError, ConfigResult};

/// Default descriptor schema version assumed when the `schema` node is absent.
const DEFAULT_SCHEMA_VERSION: &str = "1.0";

/// Parse a project descriptor from KDL text.
pub fn parse_project(kdl: &str) -> ConfigResult<Model> {
    let doc: KdlDocument = kdl.parse()?;

    let mut model = Model {
        schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        packaging: "app".to_string(),
        ..Model::default()
    };
    let mut seen_project = false;
    let mut profile_ids = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "schema" => {
                model.schema_version = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("schema version".to_string()))?;
            }
            "project" => {
                seen_project = true;
                model.artifact_id = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("project artifact id".to_string()))?;
                model.group_id = get_string_prop(node, "group");
                model.version = get_string_prop(node, "version");
                if let Some(packaging) = get_string_prop(node, "packaging") {
                    model.packaging = packaging;
                }
            }
            "name" => {
                model.name = get_first_string_arg(node);
            }
            "url" => {
                model.url = get_first_string_arg(node);
            }
            "parent" => {
                model.parent = Some(parse_parent(node)?);
            }
            "properties" => {
                parse_properties(node, &mut model.properties);
            }
            "dependency" => {
                model.dependencies.push(parse_dependency(node)?);
            }
            "repository" => {
                model.repositories.push(parse_repository(node)?);
            }
            "module" => {
                if let Some(module) = get_first_string_arg(node) {
                    model.modules.push(module);
                }
            }
            "profile" => {
                let profile = parse_profile(node)?;
                if !profile_ids.insert(profile.id.clone()) {
                    return Err(ConfigError::Duplicate(format!("profile '{}'", profile.id)));
                }
                model.profiles.push(profile);
            }
            "build" => {
                model.build = Some(parse_build(node));
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if !seen_project {
        return Err(ConfigError::MissingField("project".to_string()));
    }

    Ok(model)
}

/// Read and parse a descriptor file, attaching its path to the model.
pub fn read_project(path: impl AsRef<Path>) -> ConfigResult<Model> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    Ok(parse_project(&text)?.with_descriptor_file(path))
}

/// Parse a descriptor obtained from a [`ModelSource`]; file-backed sources
/// get their path attached to the model.
pub fn parse_source(source: &dyn ModelSource) -> ConfigResult<Model> {
    let text = source.read_to_string()?;
    let model = parse_project(&text)?;
    Ok(match source.path() {
        Some(path) => model.with_descriptor_file(path),
        None => model,
    })
}

fn parse_parent(node: &KdlNode) -> ConfigResult<Parent> {
    Ok(Parent {
        group_id: get_string_prop(node, "group")
            .ok_or_else(|| ConfigError::MissingField("parent group".to_string()))?,
        artifact_id: get_string_prop(node, "artifact")
            .ok_or_else(|| ConfigError::MissingField("parent artifact".to_string()))?,
        version: get_string_prop(node, "version")
            .ok_or_else(|| ConfigError::MissingField("parent version".to_string()))?,
        relative_path: get_string_prop(node, "relative-path"),
    })
}

fn parse_dependency(node: &KdlNode) -> ConfigResult<Dependency> {
    Ok(Dependency {
        group_id: get_string_prop(node, "group")
            .ok_or_else(|| ConfigError::MissingField("dependency group".to_string()))?,
        artifact_id: get_string_prop(node, "artifact").or_else(|| get_first_string_arg(node))
            .ok_or_else(|| ConfigError::MissingField("dependency artifact".to_string()))?,
        version: get_string_prop(node, "version"),
        scope: get_string_prop(node, "scope"),
    })
}

fn parse_repository(node: &KdlNode) -> ConfigResult<Repository> {
    Ok(Repository {
        id: get_first_string_arg(node)
            .ok_or_else(|| ConfigError::MissingField("repository id".to_string()))?,
        url: get_string_prop(node, "url")
            .ok_or_else(|| ConfigError::MissingField("repository url".to_string()))?,
    })
}

fn parse_properties(node: &KdlNode, properties: &mut HashMap<String, String>) {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            if let Some(val) = get_first_string_arg(child) {
                properties.insert(key, val);
            }
        }
    }
}

fn parse_profile(node: &KdlNode) -> ConfigResult<Profile> {
    let id = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("profile id".to_string()))?;

    let mut profile = Profile {
        id,
        source: ProfileSource::Descriptor,
        ..Profile::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "activation" => {
                    profile.activation = Some(parse_activation(child)?);
                }
                "properties" => {
                    parse_properties(child, &mut profile.properties);
                }
                "dependency" => {
                    profile.dependencies.push(parse_dependency(child)?);
                }
                "repository" => {
                    profile.repositories.push(parse_repository(child)?);
                }
                _ => {}
            }
        }
    }

    Ok(profile)
}

fn parse_activation(node: &KdlNode) -> ConfigResult<Activation> {
    let mut activation = Activation::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "active-by-default" => {
                    activation.active_by_default = get_first_bool_arg(child).unwrap_or(false);
                }
                "property" => {
                    activation.property = Some(ActivationProperty {
                        name: get_string_prop(child, "name").ok_or_else(|| {
                            ConfigError::MissingField("activation property name".to_string())
                        })?,
                        value: get_string_prop(child, "value"),
                    });
                }
                "file" => {
                    let file = ActivationFile {
                        exists: get_string_prop(child, "exists"),
                        missing: get_string_prop(child, "missing"),
                    };
                    if file.exists.is_none() && file.missing.is_none() {
                        return Err(ConfigError::InvalidValue {
                            field: "activation file".to_string(),
                            message: "requires an exists or missing path".to_string(),
                        });
                    }
                    activation.file = Some(file);
                }
                "os" => {
                    activation.os = Some(ActivationOs {
                        family: get_string_prop(child, "family"),
                        name: get_string_prop(child, "name"),
                        arch: get_string_prop(child, "arch"),
                        version: get_string_prop(child, "version"),
                    });
                }
                "jdk" => {
                    activation.jdk = Some(get_first_string_arg(child).ok_or_else(|| {
                        ConfigError::MissingField("activation jdk version".to_string())
                    })?);
                }
                "custom" => {
                    let kind = get_string_prop(child, "kind").ok_or_else(|| {
                        ConfigError::MissingField("custom activation kind".to_string())
                    })?;
                    let mut params = HashMap::new();
                    for entry in child.entries() {
                        if let (Some(name), Some(value)) =
                            (entry.name(), entry.value().as_string())
                        {
                            if name.value() != "kind" {
                                params.insert(name.value().to_string(), value.to_string());
                            }
                        }
                    }
                    activation.custom = Some(ActivationCustom { kind, params });
                }
                _ => {}
            }
        }
    }

    Ok(activation)
}

fn parse_build(node: &KdlNode) -> Build {
    let mut build = Build::default();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let value = get_first_string_arg(child);
            match child.name().value() {
                "directory" => build.directory = value,
                "output-directory" => build.output_directory = value,
                "source-directory" => build.source_directory = value,
                "test-source-directory" => build.test_source_directory = value,
                "final-name" => build.final_name = value,
                _ => {}
            }
        }
    }
    build
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
