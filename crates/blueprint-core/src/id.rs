//! Project identity.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The identity key of a descriptor: group, artifact and version coordinates.
/// Two descriptors with equal coordinates denote the same project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{group_id}:{artifact_id}:{version}")]
pub struct ProjectId {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ProjectId {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }
}
