//! Environmental context used to determine profile activation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blueprint_core::{Model, RootLocator};

/// Layered property view plus path information for one build invocation.
///
/// The system and user layers are read-only snapshots; the model layer is
/// the cascade layer, growing monotonically as profiles activate and inject
/// their properties. Lookup precedence is user > model > system.
pub struct ActivationContext {
    system_properties: HashMap<String, String>,
    user_properties: HashMap<String, String>,
    model_properties: HashMap<String, String>,
    active_profile_ids: Vec<String>,
    inactive_profile_ids: Vec<String>,
    base_dir: Option<PathBuf>,
    root_locator: Arc<dyn RootLocator>,
}

impl ActivationContext {
    pub fn new(root_locator: Arc<dyn RootLocator>) -> Self {
        Self {
            system_properties: HashMap::new(),
            user_properties: HashMap::new(),
            model_properties: HashMap::new(),
            active_profile_ids: Vec::new(),
            inactive_profile_ids: Vec::new(),
            base_dir: None,
            root_locator,
        }
    }

    pub fn with_system_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.system_properties = properties;
        self
    }

    pub fn with_user_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.user_properties = properties;
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

    /// Seeds the cascade layer and base directory from the descriptor under
    /// evaluation.
    pub fn with_model(mut self, model: &Model) -> Self {
        self.model_properties = model.properties.clone();
        self.base_dir = model.project_dir().map(Path::to_path_buf);
        self
    }

    pub fn is_profile_active(&self, id: &str) -> bool {
        self.active_profile_ids.iter().any(|p| p == id)
    }

    pub fn is_profile_inactive(&self, id: &str) -> bool {
        self.inactive_profile_ids.iter().any(|p| p == id)
    }

    pub fn system_property(&self, key: &str) -> Option<&str> {
        self.system_properties.get(key).map(String::as_str)
    }

    pub fn user_property(&self, key: &str) -> Option<&str> {
        self.user_properties.get(key).map(String::as_str)
    }

    pub fn model_property(&self, key: &str) -> Option<&str> {
        self.model_properties.get(key).map(String::as_str)
    }

    /// Layered lookup: user properties, then the model cascade layer, then
    /// system properties.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.user_property(key)
            .or_else(|| self.model_property(key))
            .or_else(|| self.system_property(key))
    }

    /// Injects an activated profile's properties into the cascade layer so
    /// later activation passes can observe them.
    pub fn inject_properties(&mut self, properties: &HashMap<String, String>) {
        for (key, value) in properties {
            self.model_properties.insert(key.clone(), value.clone());
        }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Project root directory, when a root marker is locatable above the
    /// base directory.
    pub fn root_dir(&self) -> Option<PathBuf> {
        self.base_dir
            .as_deref()
            .and_then(|dir| self.root_locator.find_root(dir))
    }
}
