//! Inheritance assembly.
//!
//! Folds an ancestor lineage into a child descriptor, producing a new tree.
//! The child dominates: its scalar fields win, its list entries come first,
//! and ancestor entries are appended when the child has nothing with the
//! same key. Identity fields missing on the child are supplied by the
//! nearest ancestor that declares them.

use std::collections::HashSet;

use blueprint_core::{Build, Dependency, Model, Repository};

/// Applies the ancestor lineage (nearest ancestor first) onto `child`.
/// Every ancestor has already had its active profiles injected.
pub fn assemble(child: &Model, ancestors: &[Model]) -> Model {
    ancestors
        .iter()
        .fold(child.clone(), |descendant, ancestor| {
            merge(&descendant, ancestor)
        })
}

/// Merges one ancestor into a descendant, descendant dominant.
fn merge(child: &Model, parent: &Model) -> Model {
    let mut merged = child.clone();

    if merged.group_id.is_none() {
        merged.group_id = parent.group_id.clone();
    }
    if merged.version.is_none() {
        merged.version = parent.version.clone();
    }
    if merged.url.is_none() {
        merged.url = parent.url.clone();
    }

    // Parent-first property merge: the child overrides key by key.
    let mut properties = parent.properties.clone();
    properties.extend(merged.properties);
    merged.properties = properties;

    merged.dependencies = merge_dependencies(&child.dependencies, &parent.dependencies);
    merged.repositories = merge_repositories(&child.repositories, &parent.repositories);
    merged.build = merge_build(child.build.as_ref(), parent.build.as_ref());

    // Modules and profiles are never inherited; profiles were already
    // applied at their own level.
    merged
}

fn merge_dependencies(child: &[Dependency], parent: &[Dependency]) -> Vec<Dependency> {
    let keys: HashSet<String> = child.iter().map(Dependency::key).collect();
    let mut merged = child.to_vec();
    merged.extend(
        parent
            .iter()
            .filter(|d| !keys.contains(&d.key()))
            .cloned(),
    );
    merged
}

fn merge_repositories(child: &[Repository], parent: &[Repository]) -> Vec<Repository> {
    let ids: HashSet<&str> = child.iter().map(|r| r.id.as_str()).collect();
    let mut merged = child.to_vec();
    merged.extend(
        parent
            .iter()
            .filter(|r| !ids.contains(r.id.as_str()))
            .cloned(),
    );
    merged
}

fn merge_build(child: Option<&Build>, parent: Option<&Build>) -> Option<Build> {
    match (child, parent) {
        (None, None) => None,
        (Some(build), None) => Some(build.clone()),
        (None, Some(build)) => Some(build.clone()),
        (Some(child), Some(parent)) => Some(Build {
            directory: child.directory.clone().or_else(|| parent.directory.clone()),
            output_directory: child
                .output_directory
                .clone()
                .or_else(|| parent.output_directory.clone()),
            source_directory: child
                .source_directory
                .clone()
                .or_else(|| parent.source_directory.clone()),
            test_source_directory: child
                .test_source_directory
                .clone()
                .or_else(|| parent.test_source_directory.clone()),
            final_name: child.final_name.clone().or_else(|| parent.final_name.clone()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn dependency(group: &str, artifact: &str, version: &str) -> Dependency {
        Dependency {
            group_id: group.to_string(),
            artifact_id: artifact.to_string(),
            version: Some(version.to_string()),
            scope: None,
        }
    }

    #[test]
    fn test_child_inherits_missing_identity() {
        let child = Model {
            artifact_id: "child".to_string(),
            ..Model::default()
        };
        let parent = Model {
            group_id: Some("com.example".to_string()),
            artifact_id: "parent".to_string(),
            version: Some("2.0".to_string()),
            ..Model::default()
        };

        let merged = assemble(&child, &[parent]);
        assert_eq!(merged.group_id.as_deref(), Some("com.example"));
        assert_eq!(merged.version.as_deref(), Some("2.0"));
        assert_eq!(merged.artifact_id, "child");
    }

    #[test]
    fn test_child_scalars_win() {
        let child = Model {
            artifact_id: "child".to_string(),
            version: Some("3.0".to_string()),
            url: Some("https://example.org/child".to_string()),
            ..Model::default()
        };
        let parent = Model {
            version: Some("2.0".to_string()),
            url: Some("https://example.org/parent".to_string()),
            ..Model::default()
        };

        let merged = assemble(&child, &[parent]);
        assert_eq!(merged.version.as_deref(), Some("3.0"));
        assert_eq!(merged.url.as_deref(), Some("https://example.org/child"));
    }

    #[test]
    fn test_properties_merge_child_overrides() {
        let child = Model {
            properties: props(&[("shared", "child"), ("mine", "1")]),
            ..Model::default()
        };
        let parent = Model {
            properties: props(&[("shared", "parent"), ("theirs", "2")]),
            ..Model::default()
        };

        let merged = assemble(&child, &[parent]);
        assert_eq!(merged.properties["shared"], "child");
        assert_eq!(merged.properties["mine"], "1");
        assert_eq!(merged.properties["theirs"], "2");
    }

    #[test]
    fn test_dependency_merge_dedupes_by_key() {
        let child = Model {
            dependencies: vec![dependency("com.example", "lib", "2.0")],
            ..Model::default()
        };
        let parent = Model {
            dependencies: vec![
                dependency("com.example", "lib", "1.0"),
                dependency("com.example", "extra", "1.0"),
            ],
            ..Model::default()
        };

        let merged = assemble(&child, &[parent]);
        assert_eq!(merged.dependencies.len(), 2);
        assert_eq!(merged.dependencies[0].version.as_deref(), Some("2.0"));
        assert_eq!(merged.dependencies[1].artifact_id, "extra");
    }

    #[test]
    fn test_lineage_folds_nearest_first() {
        let child = Model {
            artifact_id: "leaf".to_string(),
            ..Model::default()
        };
        let near = Model {
            properties: props(&[("layer", "near")]),
            version: Some("1.0".to_string()),
            ..Model::default()
        };
        let far = Model {
            properties: props(&[("layer", "far"), ("base", "yes")]),
            version: Some("0.1".to_string()),
            ..Model::default()
        };

        let merged = assemble(&child, &[near, far]);
        // the nearer ancestor shadows the farther one
        assert_eq!(merged.properties["layer"], "near");
        assert_eq!(merged.properties["base"], "yes");
        assert_eq!(merged.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_original_trees_untouched() {
        let child = Model {
            artifact_id: "child".to_string(),
            ..Model::default()
        };
        let parent = Model {
            version: Some("2.0".to_string()),
            ..Model::default()
        };
        let parent_snapshot = parent.clone();

        let _ = assemble(&child, &[parent.clone()]);
        assert_eq!(parent, parent_snapshot);
        assert_eq!(child.version, None);
    }
}
