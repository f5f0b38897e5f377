//! The descriptor build pipeline.
//!
//! `ModelBuilder` composes parsing, validation, profile activation,
//! ancestor resolution, inheritance assembly and interpolation into one
//! entry point. Each invocation owns its activation context, interpolation
//! caches and visited sets, so independent builds can run concurrently
//! without sharing state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use blueprint_config::parse_source;
use blueprint_core::{
    Build, Model, ModelSource, Problem, ProblemCollector, Profile, ProfileSource, Repository,
    RootLocator, Severity, SourceLocation, StandardRootLocator,
};
use blueprint_interpolate::{chain, interpolate, memoize};
use tracing::debug;

use crate::context::ActivationContext;
use crate::error::{BuildError, Fatal};
use crate::inheritance;
use crate::interpolator::ModelInterpolator;
use crate::parent::{ModelResolver, ParentResolver};
use crate::selector::ProfileSelector;
use crate::validator::ModelValidator;

/// How request-supplied repositories combine with descriptor-declared ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepositoryMerge {
    /// Descriptor repositories win; request repositories fill the gaps.
    #[default]
    DescriptorDominant,
    /// Request repositories shadow same-id descriptor repositories.
    RequestDominant,
}

/// Options for one build invocation.
pub struct BuildRequest {
    pub source: Box<dyn ModelSource>,
    /// Also build the descriptor's modules, recursively.
    pub recursive: bool,
    /// Attach source locations to reported problems.
    pub location_tracking: bool,
    pub active_profile_ids: Vec<String>,
    pub inactive_profile_ids: Vec<String>,
    pub system_properties: HashMap<String, String>,
    pub user_properties: HashMap<String, String>,
    /// Externally supplied profiles, evaluated after descriptor profiles.
    pub external_profiles: Vec<Profile>,
    pub repositories: Vec<Repository>,
    pub repository_merge: RepositoryMerge,
}

impl BuildRequest {
    pub fn new(source: Box<dyn ModelSource>) -> Self {
        Self {
            source,
            recursive: false,
            location_tracking: false,
            active_profile_ids: Vec::new(),
            inactive_profile_ids: Vec::new(),
            system_properties: HashMap::new(),
            user_properties: HashMap::new(),
            external_profiles: Vec::new(),
            repositories: Vec::new(),
            repository_merge: RepositoryMerge::default(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn location_tracking(mut self, tracking: bool) -> Self {
        self.location_tracking = tracking;
        self
    }

    pub fn with_active_profile_ids(mut self, ids: Vec<String>) -> Self {
        self.active_profile_ids = ids;
        self
    }

    pub fn with_inactive_profile_ids(mut self, ids: Vec<String>) -> Self {
        self.inactive_profile_ids = ids;
        self
    }

    pub fn with_system_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.system_properties = properties;
        self
    }

    pub fn with_user_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.user_properties = properties;
        self
    }

    pub fn with_external_profiles(mut self, profiles: Vec<Profile>) -> Self {
        self.external_profiles = profiles;
        self
    }

    pub fn with_repositories(mut self, repositories: Vec<Repository>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn with_repository_merge(mut self, merge: RepositoryMerge) -> Self {
        self.repository_merge = merge;
        self
    }
}

/// Outcome of one build invocation. All intermediate trees stay available
/// for inspection; `problems` holds everything the pipeline accumulated.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// The descriptor exactly as parsed.
    pub file_model: Option<Model>,
    /// The file model with active profiles injected.
    pub activated_file_model: Option<Model>,
    /// The unprocessed model inheritance starts from.
    pub raw_model: Option<Model>,
    /// The fully assembled, interpolated descriptor.
    pub effective_model: Option<Model>,
    /// Raw ancestor models, nearest first.
    pub ancestor_models: Vec<Model>,
    /// Active profile ids per model id, ancestors included.
    pub active_profiles: HashMap<String, Vec<String>>,
    /// Results of module builds when the request was recursive.
    pub children: Vec<BuildResult>,
    pub problems: Vec<Problem>,
}

impl BuildResult {
    pub fn has_errors(&self) -> bool {
        self.problems.iter().any(|p| p.severity >= Severity::Error)
    }
}

/// Builds effective descriptors.
pub struct ModelBuilder {
    selector: ProfileSelector,
    validator: ModelValidator,
    parent_resolver: ParentResolver,
    interpolator: ModelInterpolator,
    root_locator: Arc<dyn RootLocator>,
    model_resolver: Option<Box<dyn ModelResolver>>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        let root_locator: Arc<dyn RootLocator> = Arc::new(StandardRootLocator);
        Self {
            selector: ProfileSelector::new(),
            validator: ModelValidator,
            parent_resolver: ParentResolver,
            interpolator: ModelInterpolator::new(root_locator.clone()),
            root_locator,
            model_resolver: None,
        }
    }

    pub fn with_root_locator(mut self, root_locator: Arc<dyn RootLocator>) -> Self {
        self.interpolator = ModelInterpolator::new(root_locator.clone());
        self.root_locator = root_locator;
        self
    }

    /// Replaces the profile selector, e.g. to register custom activators.
    pub fn with_selector(mut self, selector: ProfileSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Installs an external ancestor lookup consulted when relative paths
    /// fail.
    pub fn with_model_resolver(mut self, resolver: Box<dyn ModelResolver>) -> Self {
        self.model_resolver = Some(resolver);
        self
    }

    /// Runs the full pipeline. A failed build returns the partial result
    /// with its problems inside the error.
    pub fn build(&self, request: BuildRequest) -> Result<BuildResult, BuildError> {
        self.build_internal(&request, &[])
    }

    fn build_internal(
        &self,
        request: &BuildRequest,
        aggregators: &[PathBuf],
    ) -> Result<BuildResult, BuildError> {
        let mut problems = ProblemCollector::new();
        let mut result = BuildResult::default();

        let outcome = self.do_build(request, aggregators, &mut problems, &mut result);
        result.problems = problems.into_problems();

        match outcome {
            Ok(()) if !result.has_errors() => Ok(result),
            _ => Err(BuildError { result }),
        }
    }

    fn do_build(
        &self,
        request: &BuildRequest,
        aggregators: &[PathBuf],
        problems: &mut ProblemCollector,
        result: &mut BuildResult,
    ) -> Result<(), Fatal> {
        let file_model = match parse_source(request.source.as_ref()) {
            Ok(model) => model,
            Err(err) => {
                let message =
                    format!("Non-parseable project descriptor {}", request.source.location());
                if request.location_tracking {
                    problems.add_at(
                        Severity::Fatal,
                        message,
                        SourceLocation {
                            path: request.source.location().to_string(),
                            line: None,
                            column: None,
                        },
                    );
                } else {
                    problems.add_with_cause(Severity::Fatal, message, &err);
                }
                return Err(Fatal);
            }
        };
        debug!(model = %file_model.id(), "read project descriptor");
        problems.set_source(file_model.id().to_string());
        result.file_model = Some(file_model.clone());

        self.validator.validate_raw(&file_model, problems)?;

        // Profile activation over the file model: descriptor-sourced
        // profiles first, then externally supplied ones.
        let mut context = ActivationContext::new(self.root_locator.clone())
            .with_system_properties(request.system_properties.clone())
            .with_user_properties(request.user_properties.clone())
            .with_active_profile_ids(request.active_profile_ids.clone())
            .with_inactive_profile_ids(request.inactive_profile_ids.clone())
            .with_model(&file_model);

        let mut candidates = file_model.profiles.clone();
        candidates.extend(request.external_profiles.iter().cloned().map(|mut p| {
            p.source = ProfileSource::External;
            p
        }));
        let active = self
            .selector
            .active_profiles(&candidates, &mut context, problems);
        result.active_profiles.insert(
            file_model.id().to_string(),
            active.iter().map(|p| p.id.clone()).collect(),
        );

        let activated_model = inject_profiles(&file_model, &active);
        result.raw_model = Some(file_model.clone());
        result.activated_file_model = Some(activated_model.clone());

        let activated_model =
            merge_request_repositories(&activated_model, &request.repositories, request.repository_merge);
        let activated_model = interpolate_parent_version(&activated_model, request, problems);

        // Ancestor chain: each ancestor gets its own profile activation
        // before the lineage is folded into the child.
        let ancestors = self.parent_resolver.resolve_chain(
            &activated_model,
            request.source.as_ref(),
            self.model_resolver.as_deref(),
            problems,
        )?;

        let mut lineage = Vec::with_capacity(ancestors.len() + 1);
        for ancestor in ancestors {
            let mut ancestor_context = ActivationContext::new(self.root_locator.clone())
                .with_system_properties(request.system_properties.clone())
                .with_user_properties(request.user_properties.clone())
                .with_active_profile_ids(request.active_profile_ids.clone())
                .with_inactive_profile_ids(request.inactive_profile_ids.clone())
                .with_model(&ancestor);
            let ancestor_active =
                self.selector
                    .active_profiles(&ancestor.profiles, &mut ancestor_context, problems);
            result.active_profiles.insert(
                ancestor.id().to_string(),
                ancestor_active.iter().map(|p| p.id.clone()).collect(),
            );
            lineage.push(inject_profiles(&ancestor, &ancestor_active));
            result.ancestor_models.push(ancestor);
        }
        lineage.push(super_model());

        let assembled = inheritance::assemble(&activated_model, &lineage);

        let effective = self.interpolator.interpolate_model(
            &assembled,
            &request.user_properties,
            &request.system_properties,
            problems,
        )?;
        self.validator.validate_effective(&effective, problems);
        debug!(model = %effective.id(), "assembled effective descriptor");
        result.effective_model = Some(effective.clone());

        if request.recursive && !effective.modules.is_empty() {
            self.build_modules(request, aggregators, &effective, problems, result)?;
        }

        Ok(())
    }

    fn build_modules(
        &self,
        request: &BuildRequest,
        aggregators: &[PathBuf],
        effective: &Model,
        problems: &mut ProblemCollector,
        result: &mut BuildResult,
    ) -> Result<(), Fatal> {
        let mut lineage = aggregators.to_vec();
        if let Some(own) = request.source.path() {
            lineage.push(own.canonicalize().unwrap_or_else(|_| own.to_path_buf()));
        }

        for module in &effective.modules {
            let Some(child_source) = request.source.resolve(module) else {
                problems.add(
                    Severity::Error,
                    format!(
                        "Child module '{}' of {} does not exist",
                        module,
                        effective.id()
                    ),
                );
                continue;
            };

            if let Some(child_path) = child_source.path() {
                let canonical = child_path
                    .canonicalize()
                    .unwrap_or_else(|_| child_path.to_path_buf());
                if lineage.contains(&canonical) {
                    problems.add(
                        Severity::Fatal,
                        format!(
                            "Child module '{}' of {} forms an aggregation cycle",
                            module,
                            effective.id()
                        ),
                    );
                    return Err(Fatal);
                }
            }

            let child_request = BuildRequest {
                source: child_source,
                recursive: request.recursive,
                location_tracking: request.location_tracking,
                active_profile_ids: request.active_profile_ids.clone(),
                inactive_profile_ids: request.inactive_profile_ids.clone(),
                system_properties: request.system_properties.clone(),
                user_properties: request.user_properties.clone(),
                external_profiles: request.external_profiles.clone(),
                repositories: request.repositories.clone(),
                repository_merge: request.repository_merge,
            };

            match self.build_internal(&child_request, &lineage) {
                Ok(child) => result.children.push(child),
                Err(failed) => {
                    problems.add(
                        Severity::Error,
                        format!("Child module '{}' of {} failed to build", module, effective.id()),
                    );
                    result.children.push(failed.result);
                }
            }
        }
        Ok(())
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Merges active profiles into the model, profile dominant: properties
/// override, list entries with matching keys are replaced, new entries are
/// appended.
fn inject_profiles(model: &Model, profiles: &[Profile]) -> Model {
    let mut injected = model.clone();
    for profile in profiles {
        for (key, value) in &profile.properties {
            injected.properties.insert(key.clone(), value.clone());
        }
        for dependency in &profile.dependencies {
            match injected
                .dependencies
                .iter_mut()
                .find(|d| d.key() == dependency.key())
            {
                Some(existing) => *existing = dependency.clone(),
                None => injected.dependencies.push(dependency.clone()),
            }
        }
        for repository in &profile.repositories {
            match injected
                .repositories
                .iter_mut()
                .find(|r| r.id == repository.id)
            {
                Some(existing) => *existing = repository.clone(),
                None => injected.repositories.push(repository.clone()),
            }
        }
    }
    injected
}

/// Resolves a `${...}` expression in the parent version declaration before
/// the chain walk, so revision-style versions locate the right ancestor.
/// Lookup order: user properties, descriptor properties, system properties.
fn interpolate_parent_version(
    model: &Model,
    request: &BuildRequest,
    problems: &mut ProblemCollector,
) -> Model {
    let Some(parent) = &model.parent else {
        return model.clone();
    };
    if !parent.version.contains("${") {
        return model.clone();
    }

    let resolver = memoize(chain(vec![
        Box::new(|name: &str| request.user_properties.get(name).cloned()),
        Box::new(|name: &str| model.properties.get(name).cloned()),
        Box::new(|name: &str| request.system_properties.get(name).cloned()),
    ]));
    match interpolate(&parent.version, &*resolver, false) {
        Ok(version) => {
            let mut interpolated = model.clone();
            interpolated.parent = Some(blueprint_core::Parent {
                version,
                ..parent.clone()
            });
            interpolated
        }
        Err(err) => {
            problems.add(
                Severity::Error,
                format!(
                    "Failed to interpolate parent version '{}': {err}",
                    parent.version
                ),
            );
            model.clone()
        }
    }
}

fn merge_request_repositories(
    model: &Model,
    request_repositories: &[Repository],
    mode: RepositoryMerge,
) -> Model {
    if request_repositories.is_empty() {
        return model.clone();
    }
    let mut merged = model.clone();
    match mode {
        RepositoryMerge::DescriptorDominant => {
            for repository in request_repositories {
                if !merged.repositories.iter().any(|r| r.id == repository.id) {
                    merged.repositories.push(repository.clone());
                }
            }
        }
        RepositoryMerge::RequestDominant => {
            let mut repositories = request_repositories.to_vec();
            repositories.extend(
                merged
                    .repositories
                    .iter()
                    .filter(|r| !request_repositories.iter().any(|q| q.id == r.id))
                    .cloned(),
            );
            merged.repositories = repositories;
        }
    }
    merged
}

/// The built-in root ancestor terminating every inheritance chain: default
/// repository and build conventions every project starts from.
fn super_model() -> Model {
    Model {
        schema_version: "1.0".to_string(),
        packaging: "parent".to_string(),
        repositories: vec![Repository {
            id: "default".to_string(),
            url: "https://packages.blueprint.build/releases".to_string(),
        }],
        build: Some(Build {
            directory: Some("${project.basedir}/target".to_string()),
            output_directory: Some("${project.basedir}/target/classes".to_string()),
            source_directory: Some("${project.basedir}/src".to_string()),
            test_source_directory: Some("${project.basedir}/tests".to_string()),
            final_name: Some("${project.artifact_id}-${project.version}".to_string()),
        }),
        ..Model::default()
    }
}
