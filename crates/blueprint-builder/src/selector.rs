//! Cascading profile selection.

use std::collections::HashSet;

use blueprint_core::{ProblemCollector, Profile};
use tracing::debug;

use crate::activator::{
    CustomActivator, FileActivator, JdkActivator, OsActivator, ProfileActivator, PropertyActivator,
};
use crate::context::ActivationContext;

/// Selects the active profiles from an ordered candidate list.
///
/// Activation cascades: when a profile activates, its properties are
/// injected into the context's model layer, so a profile evaluated in a
/// later pass can be triggered by an earlier activation. The loop runs to a
/// fixpoint; a pass that activates nothing ends it, and the pass count is
/// additionally bounded by the number of candidates.
pub struct ProfileSelector {
    activators: Vec<Box<dyn ProfileActivator>>,
}

impl ProfileSelector {
    /// Creates a selector with the standard activator set: property, file,
    /// OS, JDK and custom.
    pub fn new() -> Self {
        Self {
            activators: vec![
                Box::new(PropertyActivator),
                Box::new(FileActivator),
                Box::new(OsActivator),
                Box::new(JdkActivator),
                Box::new(CustomActivator::new()),
            ],
        }
    }

    pub fn with_activator(mut self, activator: Box<dyn ProfileActivator>) -> Self {
        self.activators.push(activator);
        self
    }

    /// Returns the active sublist of `profiles`, preserving their relative
    /// order. Candidates must already be ordered descriptor-sourced first,
    /// externally-sourced second; the result keeps that grouping.
    pub fn active_profiles(
        &self,
        profiles: &[Profile],
        context: &mut ActivationContext,
        problems: &mut ProblemCollector,
    ) -> Vec<Profile> {
        let mut active: HashSet<String> = HashSet::new();

        // Explicitly forced profiles activate up front; explicit
        // deactivation always wins over every other rule.
        for profile in profiles {
            if context.is_profile_inactive(&profile.id) {
                continue;
            }
            if context.is_profile_active(&profile.id) {
                self.activate(profile, &mut active, context);
            }
        }

        // Cascade to a fixpoint over the condition-evaluated candidates.
        for _pass in 0..profiles.len() {
            let mut activated_in_pass = false;
            for profile in profiles {
                if active.contains(&profile.id) || context.is_profile_inactive(&profile.id) {
                    continue;
                }
                if self.matches_condition(profile, context, problems) {
                    self.activate(profile, &mut active, context);
                    activated_in_pass = true;
                }
            }
            if !activated_in_pass {
                break;
            }
        }

        // Default profiles only apply when nothing else activated.
        if active.is_empty() {
            for profile in profiles {
                if context.is_profile_inactive(&profile.id) {
                    continue;
                }
                let by_default = profile
                    .activation
                    .as_ref()
                    .is_some_and(|a| a.active_by_default);
                if by_default {
                    self.activate(profile, &mut active, context);
                }
            }
        }

        profiles
            .iter()
            .filter(|p| active.contains(&p.id))
            .cloned()
            .collect()
    }

    /// True when any declared condition of the profile is satisfied.
    fn matches_condition(
        &self,
        profile: &Profile,
        context: &ActivationContext,
        problems: &mut ProblemCollector,
    ) -> bool {
        self.activators.iter().any(|activator| {
            activator.present_in_config(profile) && activator.is_active(profile, context, problems)
        })
    }

    fn activate(
        &self,
        profile: &Profile,
        active: &mut HashSet<String>,
        context: &mut ActivationContext,
    ) {
        debug!(profile = %profile.id, "profile activated");
        active.insert(profile.id.clone());
        // Only the context observes the injected properties; the profile
        // itself stays untouched.
        context.inject_properties(&profile.properties);
    }
}

impl Default for ProfileSelector {
    fn default() -> Self {
        Self::new()
    }
}
