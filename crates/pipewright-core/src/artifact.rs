//! Pipeline artifact references.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a pipeline artifact.
/// Uses UUIDv7 so artifacts created later sort after earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque reference to a bundle of files produced by one stage and consumed
/// by a later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: ArtifactId,
    /// Name given to the artifact in the pipeline, if any.
    pub name: Option<String>,
}

impl ArtifactRef {
    /// A fresh, unnamed artifact.
    pub fn new() -> Self {
        Self {
            id: ArtifactId::new(),
            name: None,
        }
    }

    /// A fresh artifact with an explicit pipeline name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: ArtifactId::new(),
            name: Some(name.into()),
        }
    }
}

impl Default for ArtifactRef {
    fn default() -> Self {
        Self::new()
    }
}
