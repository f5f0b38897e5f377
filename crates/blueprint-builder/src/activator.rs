//! Profile activators.
//!
//! Each activator is a pure predicate over a profile's activation
//! declaration and the activation context. The set is closed: activators are
//! registered explicitly when the selector is constructed, never discovered
//! at runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use blueprint_core::{ActivationCustom, ProblemCollector, Profile, Severity};
use blueprint_interpolate::interpolate;

use crate::context::ActivationContext;

/// Determines whether a profile is active under a given context.
pub trait ProfileActivator: Send + Sync {
    /// Evaluates the declared condition of the kind this activator handles.
    fn is_active(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> bool;

    /// Whether the profile declares this activation kind at all. Used for
    /// default-profile suppression and condition dispatch.
    fn present_in_config(&self, profile: &Profile) -> bool;
}

/// Matches a declared property name (and optionally value) against the
/// context, consulting user properties, then the cascaded model layer, then
/// system properties. A leading `!` on the name negates the test.
#[derive(Debug, Default)]
pub struct PropertyActivator;

impl ProfileActivator for PropertyActivator {
    fn is_active(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> bool {
        let Some(property) = profile.activation.as_ref().and_then(|a| a.property.as_ref()) else {
            return false;
        };

        let (name, negated) = match property.name.strip_prefix('!') {
            Some(rest) => (rest, true),
            None => (property.name.as_str(), false),
        };
        if name.is_empty() {
            problems.add(
                Severity::Error,
                format!(
                    "The property name is required to activate profile '{}'",
                    profile.id
                ),
            );
            return false;
        }

        let actual = context.property(name);
        let satisfied = match property.value.as_deref() {
            None | Some("") => actual.is_some(),
            Some(expected) => actual == Some(expected),
        };
        satisfied != negated
    }

    fn present_in_config(&self, profile: &Profile) -> bool {
        profile
            .activation
            .as_ref()
            .is_some_and(|a| a.property.is_some())
    }
}

/// Evaluates `exists` / `missing` filesystem assertions. Only expressions
/// rooted at the base directory or the locatable project root are
/// interpolated; any other embedded expression is reported as a warning and
/// the assertion is ignored.
#[derive(Debug, Default)]
pub struct FileActivator;

impl FileActivator {
    fn evaluate_path(
        &self,
        expression: &str,
        profile_id: &str,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> Option<PathBuf> {
        let disallowed: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let unresolved_root = RefCell::new(false);

        let resolver = |name: &str| -> Option<String> {
            match name {
                "basedir" | "project.basedir" => {
                    let dir = context.base_dir().map(|d| d.display().to_string());
                    if dir.is_none() {
                        *unresolved_root.borrow_mut() = true;
                    }
                    dir
                }
                "project.root_directory" => {
                    let root = context.root_dir().map(|d| d.display().to_string());
                    if root.is_none() {
                        *unresolved_root.borrow_mut() = true;
                    }
                    root
                }
                other => {
                    disallowed.borrow_mut().push(other.to_string());
                    None
                }
            }
        };

        // The resolver yields plain paths, so substitution cannot cycle.
        let interpolated = interpolate(expression, &resolver, false).ok()?;

        if !disallowed.borrow().is_empty() {
            problems.add(
                Severity::Warning,
                format!(
                    "Failed to interpolate file location '{}' for profile '{}': \
                     only ${{basedir}} and ${{project.root_directory}} expressions \
                     are supported, the assertion will be ignored",
                    expression, profile_id
                ),
            );
            return None;
        }
        if *unresolved_root.borrow() {
            problems.add(
                Severity::Warning,
                format!(
                    "Failed to interpolate file location '{}' for profile '{}': \
                     the project root could not be determined, the assertion will be ignored",
                    expression, profile_id
                ),
            );
            return None;
        }

        let path = PathBuf::from(interpolated);
        if path.is_relative() {
            context.base_dir().map(|base| base.join(&path)).or(Some(path))
        } else {
            Some(path)
        }
    }
}

impl ProfileActivator for FileActivator {
    fn is_active(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> bool {
        let Some(file) = profile.activation.as_ref().and_then(|a| a.file.as_ref()) else {
            return false;
        };

        // An exists assertion takes precedence over a missing one.
        if let Some(exists) = file.exists.as_deref().filter(|e| !e.is_empty()) {
            return self
                .evaluate_path(exists, &profile.id, context, problems)
                .is_some_and(|p| p.exists());
        }
        if let Some(missing) = file.missing.as_deref().filter(|m| !m.is_empty()) {
            return self
                .evaluate_path(missing, &profile.id, context, problems)
                .is_some_and(|p| !p.exists());
        }
        false
    }

    fn present_in_config(&self, profile: &Profile) -> bool {
        profile.activation.as_ref().is_some_and(|a| a.file.is_some())
    }
}

/// Matches the declared operating system facts (family, name, arch,
/// version) against the context's `os.*` system properties. Every declared
/// field must match; a leading `!` negates a field.
#[derive(Debug, Default)]
pub struct OsActivator;

impl OsActivator {
    fn family_of(os_name: &str) -> &'static str {
        let name = os_name.to_lowercase();
        if name.contains("windows") {
            "windows"
        } else if name.contains("mac") || name.contains("darwin") {
            "mac"
        } else {
            "unix"
        }
    }

    fn matches_family(expected: &str, os_name: &str) -> bool {
        let (family, negated) = split_negation(expected);
        let actual = Self::family_of(os_name);
        // macOS is a unix, so a "unix" requirement accepts it.
        let matched = actual.eq_ignore_ascii_case(family)
            || (family.eq_ignore_ascii_case("unix") && actual == "mac");
        matched != negated
    }

    fn matches_fact(expected: &str, actual: &str) -> bool {
        let (value, negated) = split_negation(expected);
        actual.eq_ignore_ascii_case(value) != negated
    }
}

impl ProfileActivator for OsActivator {
    fn is_active(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        _problems: &mut ProblemCollector,
    ) -> bool {
        let Some(os) = profile.activation.as_ref().and_then(|a| a.os.as_ref()) else {
            return false;
        };
        if os.family.is_none() && os.name.is_none() && os.arch.is_none() && os.version.is_none() {
            return false;
        }

        let os_name = context.system_property("os.name").unwrap_or_default();
        let os_arch = context.system_property("os.arch").unwrap_or_default();
        let os_version = context.system_property("os.version").unwrap_or_default();

        let mut active = true;
        if let Some(family) = os.family.as_deref() {
            active &= Self::matches_family(family, os_name);
        }
        if let Some(name) = os.name.as_deref() {
            active &= Self::matches_fact(name, os_name);
        }
        if let Some(arch) = os.arch.as_deref() {
            active &= Self::matches_fact(arch, os_arch);
        }
        if let Some(version) = os.version.as_deref() {
            active &= Self::matches_fact(version, os_version);
        }
        active
    }

    fn present_in_config(&self, profile: &Profile) -> bool {
        profile.activation.as_ref().is_some_and(|a| a.os.is_some())
    }
}

/// Matches the runtime toolchain version (`java.version` fact) against a
/// prefix (`17`), a negated prefix (`!17`) or a bracketed range (`[17,21)`).
#[derive(Debug, Default)]
pub struct JdkActivator;

impl JdkActivator {
    fn matches_range(spec: &str, version: &str, problems: &mut ProblemCollector) -> bool {
        let Some(range) = parse_version_range(spec) else {
            problems.add(
                Severity::Error,
                format!("Invalid version range '{spec}' in JDK activation"),
            );
            return false;
        };
        let v = parse_version(version);
        if let Some((lower, inclusive)) = range.lower {
            let ord = v.cmp(&lower);
            if ord == std::cmp::Ordering::Less || (!inclusive && ord == std::cmp::Ordering::Equal) {
                return false;
            }
        }
        if let Some((upper, inclusive)) = range.upper {
            let ord = v.cmp(&upper);
            if ord == std::cmp::Ordering::Greater
                || (!inclusive && ord == std::cmp::Ordering::Equal)
            {
                return false;
            }
        }
        true
    }
}

impl ProfileActivator for JdkActivator {
    fn is_active(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> bool {
        let Some(jdk) = profile.activation.as_ref().and_then(|a| a.jdk.as_deref()) else {
            return false;
        };
        let Some(version) = context.system_property("java.version") else {
            problems.add(
                Severity::Error,
                format!(
                    "Failed to determine the runtime version for profile '{}'",
                    profile.id
                ),
            );
            return false;
        };

        if let Some(negated) = jdk.strip_prefix('!') {
            !version.starts_with(negated)
        } else if jdk.starts_with('[') || jdk.starts_with('(') {
            Self::matches_range(jdk, version, problems)
        } else {
            version.starts_with(jdk)
        }
    }

    fn present_in_config(&self, profile: &Profile) -> bool {
        profile.activation.as_ref().is_some_and(|a| a.jdk.is_some())
    }
}

/// Handler invoked for a custom activation declaration of a matching kind.
pub type CustomHandler = Box<dyn Fn(&ActivationCustom, &ActivationContext) -> bool + Send + Sync>;

/// Open extension point: dispatches custom activation declarations to
/// handlers registered by kind at construction time.
#[derive(Default)]
pub struct CustomActivator {
    handlers: HashMap<String, CustomHandler>,
}

impl CustomActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(
        mut self,
        kind: impl Into<String>,
        handler: impl Fn(&ActivationCustom, &ActivationContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(kind.into(), Box::new(handler));
        self
    }
}

impl ProfileActivator for CustomActivator {
    fn is_active(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> bool {
        let Some(custom) = profile.activation.as_ref().and_then(|a| a.custom.as_ref()) else {
            return false;
        };
        match self.handlers.get(&custom.kind) {
            Some(handler) => handler(custom, context),
            None => {
                problems.add(
                    Severity::Warning,
                    format!(
                        "Unknown custom activation kind '{}' for profile '{}', \
                         the condition will be ignored",
                        custom.kind, profile.id
                    ),
                );
                false
            }
        }
    }

    fn present_in_config(&self, profile: &Profile) -> bool {
        profile
            .activation
            .as_ref()
            .is_some_and(|a| a.custom.is_some())
    }
}

fn split_negation(value: &str) -> (&str, bool) {
    match value.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (value, false),
    }
}

struct VersionRange {
    lower: Option<(Vec<u64>, bool)>,
    upper: Option<(Vec<u64>, bool)>,
}

/// Splits a version string into numeric segments; non-numeric trailing
/// qualifiers compare as zero.
fn parse_version(version: &str) -> Vec<u64> {
    version
        .split(['.', '-', '_'])
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

fn parse_version_range(spec: &str) -> Option<VersionRange> {
    let lower_inclusive = spec.starts_with('[');
    let upper_inclusive = spec.ends_with(']');
    if !(lower_inclusive || spec.starts_with('(')) || !(upper_inclusive || spec.ends_with(')')) {
        return None;
    }
    let inner = &spec[1..spec.len() - 1];
    let (low, high) = inner.split_once(',')?;
    let bound = |text: &str, inclusive: bool| {
        let text = text.trim();
        (!text.is_empty()).then(|| (parse_version(text), inclusive))
    };
    Some(VersionRange {
        lower: bound(low, lower_inclusive),
        upper: bound(high, upper_inclusive),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_core::{
        Activation, ActivationFile, ActivationOs, ActivationProperty, Model, StandardRootLocator,
    };
    use std::sync::Arc;

    fn context() -> ActivationContext {
        ActivationContext::new(Arc::new(StandardRootLocator))
    }

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn property_profile(id: &str, name: &str, value: Option<&str>) -> Profile {
        Profile {
            id: id.to_string(),
            activation: Some(Activation {
                property: Some(ActivationProperty {
                    name: name.to_string(),
                    value: value.map(str::to_string),
                }),
                ..Activation::default()
            }),
            ..Profile::default()
        }
    }

    #[test]
    fn test_property_definedness() {
        let activator = PropertyActivator;
        let mut problems = ProblemCollector::new();
        let ctx = context().with_system_properties(props(&[("flag", "")]));

        let profile = property_profile("p", "flag", None);
        assert!(activator.is_active(&profile, &ctx, &mut problems));

        let profile = property_profile("p", "other", None);
        assert!(!activator.is_active(&profile, &ctx, &mut problems));
    }

    #[test]
    fn test_property_exact_value() {
        let activator = PropertyActivator;
        let mut problems = ProblemCollector::new();
        let ctx = context().with_system_properties(props(&[("env", "dev")]));

        assert!(activator.is_active(&property_profile("p", "env", Some("dev")), &ctx, &mut problems));
        assert!(!activator.is_active(&property_profile("p", "env", Some("prod")), &ctx, &mut problems));
    }

    #[test]
    fn test_property_negation() {
        let activator = PropertyActivator;
        let mut problems = ProblemCollector::new();
        let ctx = context().with_system_properties(props(&[("env", "dev")]));

        assert!(!activator.is_active(&property_profile("p", "!env", None), &ctx, &mut problems));
        assert!(activator.is_active(&property_profile("p", "!missing", None), &ctx, &mut problems));
    }

    #[test]
    fn test_property_user_layer_wins() {
        let activator = PropertyActivator;
        let mut problems = ProblemCollector::new();
        let ctx = context()
            .with_system_properties(props(&[("env", "prod")]))
            .with_user_properties(props(&[("env", "dev")]));

        assert!(activator.is_active(&property_profile("p", "env", Some("dev")), &ctx, &mut problems));
    }

    fn file_profile(id: &str, exists: Option<&str>, missing: Option<&str>) -> Profile {
        Profile {
            id: id.to_string(),
            activation: Some(Activation {
                file: Some(ActivationFile {
                    exists: exists.map(str::to_string),
                    missing: missing.map(str::to_string),
                }),
                ..Activation::default()
            }),
            ..Profile::default()
        }
    }

    #[test]
    fn test_file_exists_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blueprint.kdl"), "project \"p\"").unwrap();
        std::fs::write(dir.path().join("dev.flag"), "").unwrap();

        let model = Model::default().with_descriptor_file(dir.path().join("blueprint.kdl"));
        let ctx = context().with_model(&model);
        let activator = FileActivator;
        let mut problems = ProblemCollector::new();

        let profile = file_profile("p", Some("${project.basedir}/dev.flag"), None);
        assert!(activator.is_active(&profile, &ctx, &mut problems));

        let profile = file_profile("p", Some("${project.basedir}/absent"), None);
        assert!(!activator.is_active(&profile, &ctx, &mut problems));

        let profile = file_profile("p", None, Some("${project.basedir}/absent"));
        assert!(activator.is_active(&profile, &ctx, &mut problems));

        assert!(problems.problems().is_empty());
    }

    #[test]
    fn test_file_unsupported_expression_is_ignored_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blueprint.kdl"), "project \"p\"").unwrap();
        let model = Model::default().with_descriptor_file(dir.path().join("blueprint.kdl"));
        let ctx = context().with_model(&model);
        let activator = FileActivator;
        let mut problems = ProblemCollector::new();

        let profile = file_profile("p", Some("${user.home}/dev.flag"), None);
        assert!(!activator.is_active(&profile, &ctx, &mut problems));
        assert_eq!(problems.count(Severity::Warning), 1);
        assert!(!problems.has_errors());
    }

    fn os_profile(id: &str, os: ActivationOs) -> Profile {
        Profile {
            id: id.to_string(),
            activation: Some(Activation {
                os: Some(os),
                ..Activation::default()
            }),
            ..Profile::default()
        }
    }

    #[test]
    fn test_os_family_and_arch() {
        let ctx = context().with_system_properties(props(&[
            ("os.name", "Linux"),
            ("os.arch", "x86_64"),
            ("os.version", "6.1"),
        ]));
        let activator = OsActivator;
        let mut problems = ProblemCollector::new();

        let profile = os_profile(
            "p",
            ActivationOs {
                family: Some("unix".to_string()),
                arch: Some("x86_64".to_string()),
                ..ActivationOs::default()
            },
        );
        assert!(activator.is_active(&profile, &ctx, &mut problems));

        let profile = os_profile(
            "p",
            ActivationOs {
                family: Some("windows".to_string()),
                ..ActivationOs::default()
            },
        );
        assert!(!activator.is_active(&profile, &ctx, &mut problems));

        let profile = os_profile(
            "p",
            ActivationOs {
                family: Some("!windows".to_string()),
                ..ActivationOs::default()
            },
        );
        assert!(activator.is_active(&profile, &ctx, &mut problems));
    }

    #[test]
    fn test_os_empty_declaration_is_inactive() {
        let ctx = context().with_system_properties(props(&[("os.name", "Linux")]));
        let mut problems = ProblemCollector::new();
        let profile = os_profile("p", ActivationOs::default());
        assert!(!OsActivator.is_active(&profile, &ctx, &mut problems));
    }

    fn jdk_profile(id: &str, spec: &str) -> Profile {
        Profile {
            id: id.to_string(),
            activation: Some(Activation {
                jdk: Some(spec.to_string()),
                ..Activation::default()
            }),
            ..Profile::default()
        }
    }

    #[test]
    fn test_jdk_prefix_negation_and_range() {
        let ctx = context().with_system_properties(props(&[("java.version", "17.0.2")]));
        let activator = JdkActivator;
        let mut problems = ProblemCollector::new();

        assert!(activator.is_active(&jdk_profile("p", "17"), &ctx, &mut problems));
        assert!(!activator.is_active(&jdk_profile("p", "11"), &ctx, &mut problems));
        assert!(activator.is_active(&jdk_profile("p", "!11"), &ctx, &mut problems));
        assert!(activator.is_active(&jdk_profile("p", "[17,21)"), &ctx, &mut problems));
        assert!(activator.is_active(&jdk_profile("p", "[,18)"), &ctx, &mut problems));
        assert!(!activator.is_active(&jdk_profile("p", "[18,)"), &ctx, &mut problems));
        assert!(!activator.is_active(&jdk_profile("p", "(17.0.2,21]"), &ctx, &mut problems));
        assert!(activator.is_active(&jdk_profile("p", "[17.0.2,21]"), &ctx, &mut problems));
        assert!(problems.problems().is_empty());
    }

    #[test]
    fn test_jdk_invalid_range_is_an_error() {
        let ctx = context().with_system_properties(props(&[("java.version", "17.0.2")]));
        let mut problems = ProblemCollector::new();
        assert!(!JdkActivator.is_active(&jdk_profile("p", "[17;21)"), &ctx, &mut problems));
        assert!(problems.has_errors());
    }

    #[test]
    fn test_custom_handler_and_unknown_kind() {
        let ctx = context();
        let mut problems = ProblemCollector::new();
        let activator = CustomActivator::new()
            .with_handler("always", |_, _| true);

        let profile = Profile {
            id: "p".to_string(),
            activation: Some(Activation {
                custom: Some(ActivationCustom {
                    kind: "always".to_string(),
                    params: HashMap::new(),
                }),
                ..Activation::default()
            }),
            ..Profile::default()
        };
        assert!(activator.is_active(&profile, &ctx, &mut problems));

        let unknown = Profile {
            id: "q".to_string(),
            activation: Some(Activation {
                custom: Some(ActivationCustom {
                    kind: "mystery".to_string(),
                    params: HashMap::new(),
                }),
                ..Activation::default()
            }),
            ..Profile::default()
        };
        assert!(!activator.is_active(&unknown, &ctx, &mut problems));
        assert_eq!(problems.count(Severity::Warning), 1);
    }
}
