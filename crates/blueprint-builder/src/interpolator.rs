//! Tree-wide `${...}` substitution over a descriptor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blueprint_core::{Model, ProblemCollector, RootLocator, Severity};
use blueprint_interpolate::interpolate;
use chrono::{DateTime, Utc};

use crate::error::Fatal;

/// Expressions carrying this prefix belong to a retired descriptor dialect;
/// they are deliberately never resolved, whatever the property layers hold.
const LEGACY_PREFIX: &str = "manifest.";

const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Walks every string field of a descriptor and substitutes `${...}`
/// expressions.
///
/// The resolver chain consults, in order: user properties, system
/// properties, the well-known path and identity expressions
/// (`project.version`, `project.group_id`, `project.artifact_id`,
/// `basedir`/`project.basedir`, `project.base_uri`,
/// `project.root_directory`, `project.root_uri`, `build.timestamp`,
/// `env.*`), and finally the descriptor's own properties.
///
/// A self-referencing field is reported as a recoverable error and keeps
/// its original text; the rest of the tree is still interpolated. An
/// unresolvable project root while a root-relative expression needs
/// resolving is fatal.
pub struct ModelInterpolator {
    root_locator: Arc<dyn RootLocator>,
}

impl ModelInterpolator {
    pub fn new(root_locator: Arc<dyn RootLocator>) -> Self {
        Self { root_locator }
    }

    pub fn interpolate_model(
        &self,
        model: &Model,
        user_properties: &HashMap<String, String>,
        system_properties: &HashMap<String, String>,
        problems: &mut ProblemCollector,
    ) -> Result<Model, Fatal> {
        let project_dir = model.project_dir().map(Path::to_path_buf);
        let version = model.effective_version().map(str::to_string);
        let group_id = model.effective_group_id().map(str::to_string);
        let artifact_id = model.artifact_id.clone();
        let model_properties = model.properties.clone();
        let timestamp = Utc::now();
        let timestamp_format = model
            .properties
            .get("build.timestamp.format")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string());

        let root_failure = RefCell::new(false);
        let root_cache: RefCell<Option<Option<PathBuf>>> = RefCell::new(None);
        let find_root = || -> Option<PathBuf> {
            let mut cache = root_cache.borrow_mut();
            let found = cache.get_or_insert_with(|| {
                project_dir
                    .as_deref()
                    .and_then(|dir| self.root_locator.find_root(dir))
            });
            if found.is_none() {
                *root_failure.borrow_mut() = true;
            }
            found.clone()
        };

        let resolver = |name: &str| -> Option<String> {
            if name.starts_with(LEGACY_PREFIX) {
                return None;
            }
            if let Some(value) = user_properties.get(name) {
                return Some(value.clone());
            }
            if let Some(value) = system_properties.get(name) {
                return Some(value.clone());
            }
            match name {
                "project.version" => return version.clone(),
                "project.group_id" => return group_id.clone(),
                "project.artifact_id" => return Some(artifact_id.clone()),
                "basedir" | "project.basedir" => {
                    return project_dir.as_deref().map(path_to_string);
                }
                "project.base_uri" => return project_dir.as_deref().map(path_to_uri),
                "project.root_directory" => return find_root().as_deref().map(path_to_string),
                "project.root_uri" => return find_root().as_deref().map(path_to_uri),
                "build.timestamp" => {
                    return Some(format_timestamp(timestamp, &timestamp_format));
                }
                _ => {}
            }
            if let Some(var) = name.strip_prefix("env.") {
                if let Ok(value) = std::env::var(var) {
                    return Some(value);
                }
            }
            model_properties.get(name).cloned()
        };

        // Per-invocation cache keyed by the original field text; never
        // shared across builds.
        let cache: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
        let field_errors: RefCell<Vec<String>> = RefCell::new(Vec::new());

        let mut transform = |value: &str| -> String {
            if !value.contains('$') {
                return value.to_string();
            }
            if let Some(hit) = cache.borrow().get(value) {
                return hit.clone();
            }
            match interpolate(value, &resolver, false) {
                Ok(resolved) => {
                    cache
                        .borrow_mut()
                        .insert(value.to_string(), resolved.clone());
                    resolved
                }
                Err(err) => {
                    field_errors
                        .borrow_mut()
                        .push(format!("Failed to interpolate value '{value}': {err}"));
                    value.to_string()
                }
            }
        };

        let mut interpolated = model.map_strings(&mut transform);

        for message in field_errors.into_inner() {
            problems.add(Severity::Error, message);
        }
        if root_failure.into_inner() {
            problems.add(
                Severity::Fatal,
                format!(
                    "Unable to locate the project root while interpolating descriptor {}: \
                     no {} marker directory found",
                    model.id(),
                    blueprint_core::source::ROOT_MARKER
                ),
            );
            return Err(Fatal);
        }

        if let Some(base) = &project_dir {
            if let Some(build) = &mut interpolated.build {
                build.directory = build.directory.take().map(|d| align_to_base(&d, base));
                build.output_directory =
                    build.output_directory.take().map(|d| align_to_base(&d, base));
                build.source_directory =
                    build.source_directory.take().map(|d| align_to_base(&d, base));
                build.test_source_directory = build
                    .test_source_directory
                    .take()
                    .map(|d| align_to_base(&d, base));
            }
        }
        interpolated.url = interpolated.url.take().map(|u| normalize_url(&u));
        for repository in &mut interpolated.repositories {
            repository.url = normalize_url(&repository.url);
        }

        Ok(interpolated)
    }
}

fn path_to_string(path: &Path) -> String {
    path.display().to_string()
}

fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Anchors a relative directory at the project base directory; absolute
/// paths pass through untouched.
fn align_to_base(value: &str, base: &Path) -> String {
    if value.is_empty() || Path::new(value).is_absolute() {
        value.to_string()
    } else {
        base.join(value).display().to_string()
    }
}

/// Collapses `/<segment>/../` sequences so inherited URLs read naturally.
fn normalize_url(url: &str) -> String {
    let mut result = url.to_string();
    loop {
        let Some(idx) = result.find("/../") else {
            break;
        };
        if idx == 0 {
            break;
        }
        let Some(parent) = result[..idx].rfind('/') else {
            break;
        };
        result = format!("{}{}", &result[..parent], &result[idx + 3..]);
    }
    result
}

fn format_timestamp(now: DateTime<Utc>, format: &str) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        out.clear();
        let _ = write!(out, "{}", now.format(DEFAULT_TIMESTAMP_FORMAT));
    }
    out
}
