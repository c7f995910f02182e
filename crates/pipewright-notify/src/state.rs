//! Pipeline execution state and commit revision lookup.

use async_trait::async_trait;
use pipewright_core::notification::NotificationPayload;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, error};

use crate::NotifyError;

/// Revision of `action` in `stage`, from a pipeline state document shaped
/// `{"stageStates": [{"stageName", "actionStates": [{"actionName",
/// "currentRevision": {"revisionId"}}]}]}`.
pub fn extract_revision_id<'a>(state: &'a Value, stage: &str, action: &str) -> Option<&'a str> {
    state
        .get("stageStates")?
        .as_array()?
        .iter()
        .filter(|s| s.get("stageName").and_then(Value::as_str) == Some(stage))
        .filter_map(|s| s.get("actionStates")?.as_array())
        .flatten()
        .filter(|a| a.get("actionName").and_then(Value::as_str) == Some(action))
        .find_map(|a| a.get("currentRevision")?.get("revisionId")?.as_str())
}

/// Source of a pipeline's current execution state.
#[async_trait]
pub trait PipelineStateSource: Send + Sync {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<Value, NotifyError>;
}

/// Commit SHA the payload's pipeline is building. Failures are logged and
/// reported as `None`.
pub async fn resolve_commit_sha(
    source: &dyn PipelineStateSource,
    payload: &NotificationPayload,
) -> Option<String> {
    let state = match source.pipeline_state(&payload.pipeline_name).await {
        Ok(state) => state,
        Err(e) => {
            error!(
                pipeline = %payload.pipeline_name,
                error = %e,
                "Error retrieving pipeline state"
            );
            return None;
        }
    };
    let sha = extract_revision_id(
        &state,
        &payload.source_stage_name,
        &payload.source_action_name,
    )
    .map(str::to_string);
    if sha.is_none() {
        let e = NotifyError::MissingRevision {
            pipeline: payload.pipeline_name.clone(),
            stage: payload.source_stage_name.clone(),
            action: payload.source_action_name.clone(),
        };
        error!(error = %e, "Failed to retrieve commit SHA");
    }
    sha
}

/// Pipeline state read from a JSON file.
///
/// The file holds either one state document or an object of documents keyed
/// by pipeline name.
pub struct FilePipelineState {
    path: PathBuf,
}

impl FilePipelineState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PipelineStateSource for FilePipelineState {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<Value, NotifyError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| NotifyError::State(format!("{}: {}", self.path.display(), e)))?;
        let mut doc: Value = serde_json::from_str(&content)
            .map_err(|e| NotifyError::State(format!("{}: {}", self.path.display(), e)))?;

        if doc.get("stageStates").is_some() {
            return Ok(doc);
        }
        debug!(pipeline = %pipeline_name, "Looking up pipeline in state file");
        doc.get_mut(pipeline_name)
            .map(Value::take)
            .ok_or_else(|| NotifyError::State(format!("no state for pipeline '{}'", pipeline_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::notification::CommitState;
    use serde_json::json;

    fn state() -> Value {
        json!({
            "pipelineName": "p",
            "stageStates": [
                {
                    "stageName": "web_SourceStage",
                    "actionStates": [
                        {"actionName": "other"},
                        {"actionName": "web_Source", "currentRevision": {"revisionId": "abc123"}}
                    ]
                },
                {"stageName": "ManualApproval", "actionStates": []}
            ]
        })
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            repo_name: "site".to_string(),
            status: CommitState::Pending,
            context: "CodeBuild".to_string(),
            pipeline_name: "p".to_string(),
            source_stage_name: "web_SourceStage".to_string(),
            source_action_name: "web_Source".to_string(),
            message: None,
        }
    }

    #[test]
    fn test_extract_revision_id() {
        let state = state();
        assert_eq!(
            extract_revision_id(&state, "web_SourceStage", "web_Source"),
            Some("abc123")
        );
        assert_eq!(extract_revision_id(&state, "web_SourceStage", "other"), None);
        assert_eq!(extract_revision_id(&state, "api_SourceStage", "web_Source"), None);
        assert_eq!(extract_revision_id(&json!({}), "a", "b"), None);
    }

    #[tokio::test]
    async fn test_file_state_keyed_by_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, json!({ "p": state() }).to_string())
            .await
            .unwrap();

        let source = FilePipelineState::new(&path);
        assert_eq!(
            resolve_commit_sha(&source, &payload()).await.as_deref(),
            Some("abc123")
        );
        assert!(source.pipeline_state("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_state_yields_no_sha() {
        let source = FilePipelineState::new("/nonexistent/state.json");
        assert!(resolve_commit_sha(&source, &payload()).await.is_none());
    }
}
