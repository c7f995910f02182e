//! Test doubles for the notification handlers.

use async_trait::async_trait;
use pipewright_core::notification::{CommitState, NotificationPayload};
use pipewright_core::secret::{SecretStore, SecretValue};
use pipewright_core::{Error, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use crate::{NotifyError, PipelineStateSource};

pub struct MapSecrets(Mutex<HashMap<String, SecretValue>>);

impl MapSecrets {
    pub fn with_token(path: &str, token: &str) -> Self {
        let mut value = HashMap::new();
        value.insert("PAT".to_string(), token.to_string());
        let mut secrets = HashMap::new();
        secrets.insert(path.to_string(), SecretValue::Map(value));
        Self(Mutex::new(secrets))
    }
}

#[async_trait]
impl SecretStore for MapSecrets {
    async fn get(&self, path: &str) -> Result<SecretValue> {
        self.0
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set(&self, path: &str, value: SecretValue) -> Result<()> {
        self.0.lock().unwrap().insert(path.to_string(), value);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.0.lock().unwrap().remove(path);
        Ok(())
    }
}

/// Pipeline state with one source revision, or none.
pub struct StaticState(pub Option<&'static str>);

#[async_trait]
impl PipelineStateSource for StaticState {
    async fn pipeline_state(
        &self,
        _pipeline_name: &str,
    ) -> std::result::Result<Value, NotifyError> {
        let mut action = json!({"actionName": "web_Source"});
        if let Some(sha) = self.0 {
            action["currentRevision"] = json!({"revisionId": sha});
        }
        Ok(json!({
            "stageStates": [{"stageName": "web_SourceStage", "actionStates": [action]}]
        }))
    }
}

pub fn payload(status: CommitState, message: Option<&str>) -> NotificationPayload {
    NotificationPayload {
        repo_name: "site".to_string(),
        status,
        context: "CodeBuild".to_string(),
        pipeline_name: "p".to_string(),
        source_stage_name: "web_SourceStage".to_string(),
        source_action_name: "web_Source".to_string(),
        message: message.map(str::to_string),
    }
}

/// Client that ignores proxy settings of the test environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// API base URL of a mock server.
pub fn base_url(server: &mockito::Server) -> Url {
    Url::parse(&format!("{}/", server.url())).unwrap()
}

/// Base URL nothing listens on.
pub fn unreachable_url() -> Url {
    Url::parse("http://127.0.0.1:1/").unwrap()
}
