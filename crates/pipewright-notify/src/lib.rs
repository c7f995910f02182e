//! Build status notifications for pipewright.
//!
//! The event rules derived at configuration time route payloads here:
//! - `GitHubStatusReporter` sets the commit status on the source host
//! - `DiscordNotifier` posts terminal build results to a chat channel
//!
//! Both resolve the commit SHA from the pipeline's execution state.

pub mod discord;
pub mod error;
pub mod github;
pub mod state;

#[cfg(test)]
mod testing;

use serde::{Deserialize, Serialize};

pub use discord::DiscordNotifier;
pub use error::NotifyError;
pub use github::GitHubStatusReporter;
pub use state::{FilePipelineState, PipelineStateSource, extract_revision_id};

/// What a notification handler reports back to its invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
