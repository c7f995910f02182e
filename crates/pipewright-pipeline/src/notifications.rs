//! Build-status event rules for configured repositories.

use pipewright_config::NotificationConfig;
use pipewright_core::notification::{
    BuildTransition, EventRule, NotificationPayload, NotificationTarget, RuleTarget,
};
use pipewright_core::{RepositoryDescriptor, Result};
use serde_json::json;
use tracing::debug;

/// Derives the start, success and failure rules of each repository's build
/// project.
pub struct NotificationManager {
    config: NotificationConfig,
}

impl NotificationManager {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    /// Rules for one repository. The descriptor must have passed its build
    /// stage, since the rules match on its build project name.
    pub fn rules_for(&self, repo: &RepositoryDescriptor) -> Result<Vec<EventRule>> {
        let project = repo
            .build_project_name()
            .ok_or_else(|| repo.missing("build_project_name"))?;
        let pipeline_name = repo
            .pipeline_name()
            .ok_or_else(|| repo.missing("pipeline_name"))?;
        let stage_name = repo
            .source_stage_name()
            .ok_or_else(|| repo.missing("source_stage_name"))?;
        let action_name = repo
            .source_action_name()
            .ok_or_else(|| repo.missing("source_action_name"))?;

        let payload = |transition: BuildTransition, message: Option<String>| NotificationPayload {
            repo_name: repo.repo_name().to_string(),
            status: transition.commit_state(),
            context: self.config.context.clone(),
            pipeline_name: pipeline_name.to_string(),
            source_stage_name: stage_name.to_string(),
            source_action_name: action_name.to_string(),
            message,
        };

        let rules = [
            (BuildTransition::Started, "Start", None),
            (
                BuildTransition::Succeeded,
                "Success",
                Some(format!("Build Succeeded for {}", repo.repo_name())),
            ),
            (
                BuildTransition::Failed,
                "Failure",
                Some(format!("Build Failed for {}", repo.repo_name())),
            ),
        ]
        .into_iter()
        .map(|(transition, suffix, chat_message)| {
            let mut targets = vec![RuleTarget {
                target: NotificationTarget::StatusReporter,
                function_name: self.config.status_function.clone(),
                input: payload(transition, None),
            }];
            if chat_message.is_some() {
                targets.push(RuleTarget {
                    target: NotificationTarget::ChatNotifier,
                    function_name: self.config.chat_function.clone(),
                    input: payload(transition, chat_message),
                });
            }
            EventRule {
                id: format!("{}Build{}Rule", repo.name(), suffix),
                description: format!(
                    "Build {} notifications for {}",
                    suffix.to_lowercase(),
                    project
                ),
                transition,
                event_pattern: json!({
                    "source": ["aws.codebuild"],
                    "detail": {
                        "build-status": transition.runner_statuses(),
                        "project-name": [project],
                    },
                }),
                targets,
            }
        })
        .collect::<Vec<_>>();

        debug!(
            repository = %repo.name(),
            project = %project,
            rules = rules.len(),
            "Derived notification rules"
        );
        Ok(rules)
    }

    /// Rules for every repository, in order.
    pub fn rules_for_all<'a>(
        &self,
        repos: impl IntoIterator<Item = &'a RepositoryDescriptor>,
    ) -> Result<Vec<EventRule>> {
        let mut rules = Vec::new();
        for repo in repos {
            rules.extend(self.rules_for(repo)?);
        }
        Ok(rules)
    }
}
