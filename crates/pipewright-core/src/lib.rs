//! Core domain types and traits for pipewright.
//!
//! This crate contains:
//! - Repository descriptors and their configuration state machine
//! - Build dependency handles and the kind-keyed registry
//! - The declarative pipeline model (stages, actions, build specs)
//! - Notification payloads and event rules
//! - Collaborator abstractions (cloud provisioner, secrets)

pub mod artifact;
pub mod error;
pub mod notification;
pub mod pipeline;
pub mod provisioner;
pub mod repository;
pub mod resource;
pub mod secret;

pub use artifact::ArtifactRef;
pub use error::{Error, Result};
pub use repository::{ConfigurationState, RepositoryDescriptor, StageManagerKind};
pub use resource::{BuildDependency, DependencyRegistry, ResourceHandle, ResourceKind};
