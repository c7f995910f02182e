//! Secret storage abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Error, Result};

/// A secret value (a single string or key-value pairs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretValue {
    String(String),
    Map(HashMap<String, String>),
}

impl SecretValue {
    /// The value as a string; a single-entry map yields its only value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            SecretValue::String(s) => Some(s),
            SecretValue::Map(m) if m.len() == 1 => m.values().next().map(|s| s.as_str()),
            SecretValue::Map(_) => None,
        }
    }

    /// A specific key from a map secret.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            SecretValue::String(s) if key.is_empty() => Some(s),
            SecretValue::Map(m) => m.get(key).map(|s| s.as_str()),
            _ => None,
        }
    }
}

/// Trait for secret storage backends, addressed by logical key.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get a secret by path.
    async fn get(&self, path: &str) -> Result<SecretValue>;

    /// Get a specific key from a secret.
    async fn get_key(&self, path: &str, key: &str) -> Result<String> {
        let value = self.get(path).await?;
        value
            .get(key)
            .map(str::to_string)
            .ok_or_else(|| Error::NotFound(format!("secret key '{}' in '{}'", key, path)))
    }

    /// List secret paths with a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Set or create a secret.
    async fn set(&self, path: &str, value: SecretValue) -> Result<()>;

    /// Delete a secret.
    async fn delete(&self, path: &str) -> Result<()>;
}
