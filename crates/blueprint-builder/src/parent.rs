//! Ancestor chain resolution.
//!
//! Walks the parent declarations of a descriptor with an explicit loop and a
//! per-chain visited set, so a cyclic parent graph surfaces as a reported
//! error instead of unbounded recursion. The visited set lives for one
//! root-to-leaf traversal only; sibling descriptors sharing a legitimate
//! ancestor never observe each other's chains.

use std::path::Path;

use blueprint_config::parse_source;
use blueprint_core::{Model, ModelSource, Parent, ProblemCollector, Severity};
use tracing::debug;

use crate::error::Fatal;

/// Locates an ancestor descriptor by coordinates when it cannot be found
/// through relative paths, e.g. in a package store.
pub trait ModelResolver: Send + Sync {
    fn resolve_model(&self, parent: &Parent) -> Option<Box<dyn ModelSource>>;
}

/// Packaging kind required of any descriptor used as an ancestor.
const PARENT_PACKAGING: &str = "parent";

#[derive(Debug, Default)]
pub struct ParentResolver;

impl ParentResolver {
    /// Resolves the full ancestor chain of `model`, nearest ancestor first.
    /// Returns the raw ancestor models; profile activation and inheritance
    /// are applied by the caller.
    pub fn resolve_chain(
        &self,
        model: &Model,
        source: &dyn ModelSource,
        external: Option<&dyn ModelResolver>,
        problems: &mut ProblemCollector,
    ) -> Result<Vec<Model>, Fatal> {
        let mut chain = VisitedChain::default();
        chain.note_id(&model.id().to_string());
        if let Some(path) = source.path() {
            chain.note_path(&canonical(path));
        }

        let mut ancestors: Vec<Model> = Vec::new();
        let mut current_parent = model.parent.clone();
        let mut current_source: Option<Box<dyn ModelSource>> = None;
        let mut current_child = model.id();

        while let Some(parent) = current_parent {
            let declared = parent.id().to_string();
            if !chain.note_id(&declared) {
                problems.add(
                    Severity::Fatal,
                    format!("The ancestors form a cycle: {}", chain.describe(&declared)),
                );
                return Err(Fatal);
            }

            let src: &dyn ModelSource = current_source.as_deref().unwrap_or(source);
            let (candidate, parent_model) = self.locate(
                &parent,
                src,
                external,
                &current_child.to_string(),
                &mut chain,
                problems,
            )?;

            if parent_model.packaging != PARENT_PACKAGING {
                problems.add(
                    Severity::Error,
                    format!(
                        "Invalid packaging for ancestor descriptor {}, must be \"{}\" but is \"{}\"",
                        parent_model.id(),
                        PARENT_PACKAGING,
                        parent_model.packaging
                    ),
                );
            }

            debug!(ancestor = %parent_model.id(), "resolved ancestor descriptor");
            current_child = parent_model.id();
            current_parent = parent_model.parent.clone();
            ancestors.push(parent_model);
            current_source = Some(candidate);
        }

        Ok(ancestors)
    }

    /// Locates and loads the declared ancestor: the relative-path hint first
    /// (default `..`), then the external resolver. A candidate whose
    /// coordinates do not match the declaration is discarded with a warning.
    fn locate(
        &self,
        parent: &Parent,
        source: &dyn ModelSource,
        external: Option<&dyn ModelResolver>,
        child_id: &str,
        chain: &mut VisitedChain,
        problems: &mut ProblemCollector,
    ) -> Result<(Box<dyn ModelSource>, Model), Fatal> {
        let relative_path = parent.relative_path.as_deref().unwrap_or("..");

        if let Some(candidate) = source.resolve(relative_path) {
            match parse_source(candidate.as_ref()) {
                Ok(model) => {
                    let group_matches = model.effective_group_id() == Some(&parent.group_id);
                    let artifact_matches = model.artifact_id == parent.artifact_id;
                    let version_matches = model
                        .effective_version()
                        .is_none_or(|v| v.contains("${") || v == parent.version);
                    if group_matches && artifact_matches && version_matches {
                        self.check_path(candidate.as_ref(), chain, problems)?;
                        return Ok((candidate, model));
                    }
                    problems.add(
                        Severity::Warning,
                        format!(
                            "'relative_path' of descriptor {} points at {}:{} instead of {}:{}, \
                             please verify your project structure",
                            child_id,
                            model.effective_group_id().unwrap_or_default(),
                            model.artifact_id,
                            parent.group_id,
                            parent.artifact_id
                        ),
                    );
                }
                Err(err) => {
                    problems.add_with_cause(
                        Severity::Warning,
                        format!(
                            "Ignoring non-parseable ancestor candidate {}",
                            candidate.location()
                        ),
                        &err,
                    );
                }
            }
        }

        if let Some(resolver) = external {
            if let Some(candidate) = resolver.resolve_model(parent) {
                let model = match parse_source(candidate.as_ref()) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        problems.add_with_cause(
                            Severity::Fatal,
                            format!("Non-parseable ancestor descriptor {}", candidate.location()),
                            &err,
                        );
                        return Err(Fatal);
                    }
                };
                self.check_path(candidate.as_ref(), chain, problems)?;
                return Ok((candidate, model));
            }
        }

        problems.add(
            Severity::Fatal,
            format!(
                "Non-resolvable ancestor descriptor {} for {}: \
                 'relative_path' points at no local descriptor",
                parent.id(),
                child_id
            ),
        );
        Err(Fatal)
    }

    fn check_path(
        &self,
        candidate: &dyn ModelSource,
        chain: &mut VisitedChain,
        problems: &mut ProblemCollector,
    ) -> Result<(), Fatal> {
        let key = candidate
            .path()
            .map(canonical)
            .unwrap_or_else(|| candidate.location().to_string());
        if !chain.note_path(&key) {
            problems.add(
                Severity::Fatal,
                format!("The ancestors form a cycle: {}", chain.describe(&key)),
            );
            return Err(Fatal);
        }
        Ok(())
    }
}

/// Ordered visited set for one traversal, keyed by declared coordinates and
/// by canonical descriptor path.
#[derive(Debug, Default)]
struct VisitedChain {
    ids: Vec<String>,
    paths: Vec<String>,
}

impl VisitedChain {
    fn note_id(&mut self, id: &str) -> bool {
        if self.ids.iter().any(|seen| seen == id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    fn note_path(&mut self, path: &str) -> bool {
        if self.paths.iter().any(|seen| seen == path) {
            return false;
        }
        self.paths.push(path.to_string());
        true
    }

    fn describe(&self, offender: &str) -> String {
        let mut description = String::new();
        for id in &self.ids {
            description.push_str(id);
            description.push_str(" -> ");
        }
        description.push_str(offender);
        description
    }
}

fn canonical(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_core::{FileModelSource, StringModelSource};
    use std::path::PathBuf;

    fn write_descriptor(dir: &Path, kdl: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let file = dir.join("blueprint.kdl");
        std::fs::write(&file, kdl).unwrap();
        file
    }

    fn load(file: &Path) -> (Model, FileModelSource) {
        let source = FileModelSource::new(file);
        let model = parse_source(&source).unwrap();
        (model, source)
    }

    #[test]
    fn test_resolves_parent_through_default_relative_path() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(
            root.path(),
            r#"
            project "parent" group="com.example" version="1.0" packaging="parent"
            "#,
        );
        let child_file = write_descriptor(
            &root.path().join("child"),
            r#"
            project "child" group="com.example" version="1.0"
            parent group="com.example" artifact="parent" version="1.0"
            "#,
        );

        let (model, source) = load(&child_file);
        let mut problems = ProblemCollector::new();
        let ancestors = ParentResolver
            .resolve_chain(&model, &source, None, &mut problems)
            .unwrap();

        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].artifact_id, "parent");
        assert!(!problems.has_errors());
    }

    #[test]
    fn test_resolves_grandparent_chain() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(
            root.path(),
            r#"
            project "grandparent" group="com.example" version="1.0" packaging="parent"
            "#,
        );
        write_descriptor(
            &root.path().join("mid"),
            r#"
            project "mid" group="com.example" version="1.0" packaging="parent"
            parent group="com.example" artifact="grandparent" version="1.0"
            "#,
        );
        let child_file = write_descriptor(
            &root.path().join("mid/leaf"),
            r#"
            project "leaf" group="com.example" version="1.0"
            parent group="com.example" artifact="mid" version="1.0"
            "#,
        );

        let (model, source) = load(&child_file);
        let mut problems = ProblemCollector::new();
        let ancestors = ParentResolver
            .resolve_chain(&model, &source, None, &mut problems)
            .unwrap();

        let names: Vec<&str> = ancestors.iter().map(|m| m.artifact_id.as_str()).collect();
        assert_eq!(names, vec!["mid", "grandparent"]);
    }

    #[test]
    fn test_parent_cycle_is_fatal_not_stack_overflow() {
        let root = tempfile::tempdir().unwrap();
        let a_file = write_descriptor(
            &root.path().join("a"),
            r#"
            project "a" group="com.example" version="1.0" packaging="parent"
            parent group="com.example" artifact="b" version="1.0" relative-path="../b"
            "#,
        );
        write_descriptor(
            &root.path().join("b"),
            r#"
            project "b" group="com.example" version="1.0" packaging="parent"
            parent group="com.example" artifact="a" version="1.0" relative-path="../a"
            "#,
        );

        let (model, source) = load(&a_file);
        let mut problems = ProblemCollector::new();
        let result = ParentResolver.resolve_chain(&model, &source, None, &mut problems);

        assert!(result.is_err());
        assert!(problems.has_fatal());
        assert!(
            problems
                .problems()
                .iter()
                .any(|p| p.message.contains("form a cycle"))
        );
    }

    #[test]
    fn test_siblings_sharing_a_parent_are_independent_chains() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(
            root.path(),
            r#"
            project "parent" group="com.example" version="1.0" packaging="parent"
            "#,
        );
        let a_file = write_descriptor(
            &root.path().join("a"),
            r#"
            project "a" group="com.example" version="1.0"
            parent group="com.example" artifact="parent" version="1.0"
            "#,
        );
        let b_file = write_descriptor(
            &root.path().join("b"),
            r#"
            project "b" group="com.example" version="1.0"
            parent group="com.example" artifact="parent" version="1.0"
            "#,
        );

        for file in [a_file, b_file] {
            let (model, source) = load(&file);
            let mut problems = ProblemCollector::new();
            let ancestors = ParentResolver
                .resolve_chain(&model, &source, None, &mut problems)
                .unwrap();
            assert_eq!(ancestors.len(), 1);
            assert!(!problems.has_fatal());
        }
    }

    #[test]
    fn test_coordinate_mismatch_warns_and_fails_without_external_resolver() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(
            root.path(),
            r#"
            project "unexpected" group="com.example" version="1.0" packaging="parent"
            "#,
        );
        let child_file = write_descriptor(
            &root.path().join("child"),
            r#"
            project "child" group="com.example" version="1.0"
            parent group="com.example" artifact="parent" version="1.0"
            "#,
        );

        let (model, source) = load(&child_file);
        let mut problems = ProblemCollector::new();
        let result = ParentResolver.resolve_chain(&model, &source, None, &mut problems);

        assert!(result.is_err());
        assert_eq!(problems.count(Severity::Warning), 1);
        assert!(problems.has_fatal());
    }

    struct StoreResolver {
        kdl: String,
    }

    impl ModelResolver for StoreResolver {
        fn resolve_model(&self, parent: &Parent) -> Option<Box<dyn ModelSource>> {
            Some(Box::new(StringModelSource::new(
                self.kdl.clone(),
                format!("store:{}", parent.id()),
            )))
        }
    }

    #[test]
    fn test_external_resolver_fallback() {
        let root = tempfile::tempdir().unwrap();
        let child_file = write_descriptor(
            root.path(),
            r#"
            project "child" group="com.example" version="1.0"
            parent group="com.example" artifact="released" version="2.0"
            "#,
        );

        let (model, source) = load(&child_file);
        let resolver = StoreResolver {
            kdl: r#"
            project "released" group="com.example" version="2.0" packaging="parent"
            "#
            .to_string(),
        };
        let mut problems = ProblemCollector::new();
        let ancestors = ParentResolver
            .resolve_chain(&model, &source, Some(&resolver), &mut problems)
            .unwrap();

        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_non_parent_packaging_is_recoverable_error() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(
            root.path(),
            r#"
            project "parent" group="com.example" version="1.0"
            "#,
        );
        let child_file = write_descriptor(
            &root.path().join("child"),
            r#"
            project "child" group="com.example" version="1.0"
            parent group="com.example" artifact="parent" version="1.0"
            "#,
        );

        let (model, source) = load(&child_file);
        let mut problems = ProblemCollector::new();
        let ancestors = ParentResolver
            .resolve_chain(&model, &source, None, &mut problems)
            .unwrap();

        assert_eq!(ancestors.len(), 1);
        assert!(problems.has_errors());
        assert!(!problems.has_fatal());
    }
}
