//! System-wide settings injected into stage managers.

use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Account, region and connection settings that would otherwise be literals
/// in stage definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Cloud account the pipeline and its dependencies live in.
    pub account_id: String,
    pub region: String,
    /// Default source connection for repositories that do not name one.
    pub connection_ref: Option<String>,
    /// Image used by build and deploy jobs.
    pub build_image: String,
    /// Environment label passed to build commands (e.g. `generate:dev`).
    pub environment: String,
}

impl ProvisioningConfig {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: DEFAULT_REGION.to_string(),
            connection_ref: None,
            build_image: DEFAULT_BUILD_IMAGE.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_connection(mut self, connection_ref: impl Into<String>) -> Self {
        self.connection_ref = Some(connection_ref.into());
        self
    }

    pub fn with_build_image(mut self, build_image: impl Into<String>) -> Self {
        self.build_image = build_image.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }
}

/// Names of the functions that receive build notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub status_function: String,
    pub chat_function: String,
    /// Context string shown next to commit statuses.
    pub context: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            status_function: "github-status".to_string(),
            chat_function: "discord-notifier".to_string(),
            context: "CodeBuild".to_string(),
        }
    }
}
