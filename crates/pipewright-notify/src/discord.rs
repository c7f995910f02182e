//! Build result messages to a Discord channel.

use pipewright_core::notification::NotificationPayload;
use pipewright_core::secret::SecretStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use crate::state::resolve_commit_sha;
use crate::{HandlerResponse, NotifyError, PipelineStateSource};

pub const DEFAULT_API_URL: &str = "https://discord.com/api/v9/";
/// Secret holding the bot token under key `PAT`.
pub const TOKEN_SECRET: &str = "github/discord_build_statuses";
pub const TOKEN_KEY: &str = "PAT";

/// Chat message for a build result.
pub fn format_message(message: &str, context: &str, owner: &str, repo: &str, sha: &str) -> String {
    format!(
        "{}\n{}\nContext: {}\nCommit SHA: {}\nCommit URL: https://www.github.com/{}/{}/commit/{}",
        message,
        "-".repeat(10),
        context,
        sha,
        owner,
        repo,
        sha
    )
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    base_url: Url,
    channel_id: String,
    owner: String,
    secrets: Arc<dyn SecretStore>,
    state: Arc<dyn PipelineStateSource>,
}

impl DiscordNotifier {
    pub fn new(
        channel_id: impl Into<String>,
        owner: impl Into<String>,
        secrets: Arc<dyn SecretStore>,
        state: Arc<dyn PipelineStateSource>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(DEFAULT_API_URL)?,
            channel_id: channel_id.into(),
            owner: owner.into(),
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

    /// Handle one terminal build event.
    pub async fn handle(&self, payload: &NotificationPayload) -> HandlerResponse {
        info!(
            repo = %payload.repo_name,
            status = %payload.status,
            channel = %self.channel_id,
            "Received build notification"
        );

        let Some(message) = payload.message.as_deref() else {
            return HandlerResponse::new(400, "Error: Missing message.");
        };
        let Some(sha) = resolve_commit_sha(self.state.as_ref(), payload).await else {
            return HandlerResponse::new(400, "Error: Missing commit SHA.");
        };
        let token = match self.secrets.get_key(TOKEN_SECRET, TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Error retrieving secret");
                return HandlerResponse::new(500, "Error: Missing Discord token.");
            }
        };

        let content = format_message(
            message,
            &payload.context,
            &self.owner,
            &payload.repo_name,
            &sha,
        );
        match self.send_message(&token, &content).await {
            Ok(_) => HandlerResponse::new(
                200,
                json!(format!("Message sent to Discord: {}", content)).to_string(),
            ),
            Err(NotifyError::Api { status, body }) => {
                error!(status, body = %body, "Error sending Discord message");
                HandlerResponse::new(status, json!("Failed to send Discord message").to_string())
            }
            Err(e) => {
                error!(error = %e, "Error sending Discord message");
                HandlerResponse::new(500, "Error: Request to Discord API failed.")
            }
        }
    }

    /// Post `content` to the channel, returning the created message.
    pub async fn send_message(&self, token: &str, content: &str) -> Result<Value, NotifyError> {
        let url = self
            .base_url
            .join(&format!("channels/{}/messages", self.channel_id))?;

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bot {}", token))
            .json(&json!({ "content": content }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MapSecrets, StaticState, base_url, client, payload, unreachable_url};
    use mockito::{Matcher, Server};
    use pipewright_core::notification::CommitState;

    const CHANNEL: &str = "1194790525258190908";

    fn notifier(sha: Option<&'static str>) -> DiscordNotifier {
        DiscordNotifier::new(
            CHANNEL,
            "acme",
            Arc::new(MapSecrets::with_token(TOKEN_SECRET, "bot-token")),
            Arc::new(StaticState(sha)),
        )
        .unwrap()
        .with_client(client())
    }

    #[test]
    fn test_format_message() {
        let text = format_message("Build Failed for site", "CodeBuild", "acme", "site", "abc123");
        assert_eq!(
            text,
            "Build Failed for site\n----------\nContext: CodeBuild\nCommit SHA: abc123\nCommit URL: https://www.github.com/acme/site/commit/abc123"
        );
    }

    #[tokio::test]
    async fn test_posts_to_channel() {
        let content = format_message(
            "Build Succeeded for site",
            "CodeBuild",
            "acme",
            "site",
            "abc123",
        );
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("/channels/{}/messages", CHANNEL).as_str())
            .match_header("authorization", "Bot bot-token")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({ "content": content })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"1"}"#)
            .create_async()
            .await;

        let response = notifier(Some("abc123"))
            .with_base_url(base_url(&server))
            .handle(&payload(CommitState::Success, Some("Build Succeeded for site")))
            .await;

        mock.assert_async().await;
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn test_rejected_message_passes_status_through() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("/channels/{}/messages", CHANNEL).as_str())
            .with_status(403)
            .with_body(r#"{"message":"Missing Access"}"#)
            .create_async()
            .await;

        let response = notifier(Some("abc123"))
            .with_base_url(base_url(&server))
            .handle(&payload(CommitState::Failure, Some("Build Failed for site")))
            .await;

        mock.assert_async().await;
        assert_eq!(response.status_code, 403);
    }

    #[tokio::test]
    async fn test_missing_inputs() {
        let response = notifier(Some("abc123"))
            .handle(&payload(CommitState::Success, None))
            .await;
        assert_eq!(response, HandlerResponse::new(400, "Error: Missing message."));

        let response = notifier(None)
            .handle(&payload(CommitState::Success, Some("Build Succeeded for site")))
            .await;
        assert_eq!(response, HandlerResponse::new(400, "Error: Missing commit SHA."));

        let response = notifier(Some("abc123"))
            .with_base_url(unreachable_url())
            .handle(&payload(CommitState::Success, Some("Build Succeeded for site")))
            .await;
        assert_eq!(response.status_code, 500);
    }
}
