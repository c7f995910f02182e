//! Commit status reporting to GitHub.

use pipewright_core::notification::{CommitState, NotificationPayload};
use pipewright_core::secret::SecretStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use crate::state::resolve_commit_sha;
use crate::{HandlerResponse, NotifyError, PipelineStateSource};

pub const DEFAULT_API_URL: &str = "https://api.github.com/";
/// Secret holding the personal access token under key `PAT`.
pub const TOKEN_SECRET: &str = "github/build_status";
pub const TOKEN_KEY: &str = "PAT";

const USER_AGENT: &str = "pipewright";

/// Sets the status of the commit a pipeline is building.
pub struct GitHubStatusReporter {
    client: reqwest::Client,
    base_url: Url,
    owner: Option<String>,
    secrets: Arc<dyn SecretStore>,
    state: Arc<dyn PipelineStateSource>,
}

impl GitHubStatusReporter {
    pub fn new(
        owner: Option<String>,
        secrets: Arc<dyn SecretStore>,
        state: Arc<dyn PipelineStateSource>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(DEFAULT_API_URL)?,
            owner,
            secrets,
            state,
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Handle one build status event.
    pub async fn handle(&self, payload: &NotificationPayload) -> HandlerResponse {
        info!(
            repo = %payload.repo_name,
            status = %payload.status,
            pipeline = %payload.pipeline_name,
            "Received build status event"
        );

        let Some(sha) = resolve_commit_sha(self.state.as_ref(), payload).await else {
            return HandlerResponse::new(400, "Error: Missing commit SHA.");
        };

        let token = match self.secrets.get_key(TOKEN_SECRET, TOKEN_KEY).await {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "Error retrieving secret");
                None
            }
        };
        let owner = self.owner.as_deref().filter(|o| !o.is_empty());
        let (Some(token), Some(owner)) = (token, owner) else {
            error!("Missing required parameters.");
            return HandlerResponse::new(400, "Error: Missing required parameters.");
        };

        match self
            .update_status(
                &token,
                owner,
                &payload.repo_name,
                &sha,
                payload.status,
                &payload.context,
            )
            .await
        {
            Ok(()) => HandlerResponse::new(
                200,
                json!(format!(
                    "GitHub status updated for {} in {}",
                    sha, payload.repo_name
                ))
                .to_string(),
            ),
            Err(NotifyError::Api { status, body }) => {
                error!(status, body = %body, "Failed to update status");
                HandlerResponse::new(status, json!("Failed to update GitHub status").to_string())
            }
            Err(e) => {
                error!(error = %e, "Request to GitHub API failed");
                HandlerResponse::new(500, "Error: Request to GitHub API failed.")
            }
        }
    }

    /// Create a commit status. Anything but `201 Created` is an API error.
    pub async fn update_status(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        sha: &str,
        state: CommitState,
        context: &str,
    ) -> Result<(), NotifyError> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/statuses/{}", owner, repo, sha))?;
        let body = json!({
            "state": state,
            "context": context,
            "description": format!("The build status is {}.", state),
        });

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("token {}", token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::CREATED {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }

        info!(sha = %sha, repo = %repo, state = %state, "Updated commit status");
        Ok(())
    }
}
