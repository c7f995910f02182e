//! Build notification payloads and event rules.

use serde::{Deserialize, Serialize};

/// Commit status reported back to the source host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitState::Pending => write!(f, "pending"),
            CommitState::Success => write!(f, "success"),
            CommitState::Failure => write!(f, "failure"),
            CommitState::Error => write!(f, "error"),
        }
    }
}

/// Build lifecycle transitions that trigger notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildTransition {
    Started,
    Succeeded,
    Failed,
}

impl BuildTransition {
    /// Build statuses reported by the job runner that match this transition.
    pub fn runner_statuses(&self) -> &'static [&'static str] {
        match self {
            BuildTransition::Started => &["IN_PROGRESS"],
            BuildTransition::Succeeded => &["SUCCEEDED"],
            BuildTransition::Failed => &["FAILED", "STOPPED"],
        }
    }

    pub fn commit_state(&self) -> CommitState {
        match self {
            BuildTransition::Started => CommitState::Pending,
            BuildTransition::Succeeded => CommitState::Success,
            BuildTransition::Failed => CommitState::Failure,
        }
    }
}

/// Payload delivered to status and chat collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub repo_name: String,
    pub status: CommitState,
    pub context: String,
    pub pipeline_name: String,
    pub source_stage_name: String,
    pub source_action_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Which collaborator receives a rule's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    /// Commit status updater on the source host.
    StatusReporter,
    /// Chat channel notifier.
    ChatNotifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTarget {
    pub target: NotificationTarget,
    /// Name of the function that handles this target.
    pub function_name: String,
    pub input: NotificationPayload,
}

/// A subscription to build status changes of one build project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRule {
    pub id: String,
    pub description: String,
    pub transition: BuildTransition,
    pub event_pattern: serde_json::Value,
    pub targets: Vec<RuleTarget>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_omits_absent_message() {
        let payload = NotificationPayload {
            repo_name: "site".to_string(),
            status: CommitState::Pending,
            context: "CodeBuild".to_string(),
            pipeline_name: "p".to_string(),
            source_stage_name: "web_SourceStage".to_string(),
            source_action_name: "web_Source".to_string(),
            message: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("message").is_none());

        let back: NotificationPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_failure_matches_stopped_builds() {
        assert_eq!(
            BuildTransition::Failed.runner_statuses(),
            &["FAILED", "STOPPED"]
        );
        assert_eq!(BuildTransition::Failed.commit_state(), CommitState::Failure);
    }
}
