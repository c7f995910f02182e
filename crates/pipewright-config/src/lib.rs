//! Configuration for pipewright.
//!
//! This crate handles:
//! - Parsing the KDL deployment file (system settings and repositories)
//! - The injected provisioning settings used by stage managers
//! - A local, file-backed secret store

pub mod deployment;
pub mod error;
pub mod secrets;
pub mod system;

pub use deployment::{
    DependencyConfig, DeploymentConfig, PipelineConfig, RepositoryConfig, parse_deployment,
};
pub use error::{ConfigError, ConfigResult};
pub use secrets::LocalSecretStore;
pub use system::{NotificationConfig, ProvisioningConfig};
