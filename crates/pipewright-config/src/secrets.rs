//! File-backed secret store for local use.
//!
//! Secrets are kept in a single JSON document keyed by logical path, each with
//! its creation and last-update time so stale credentials can be flagged.
//! Values are Fernet tokens; the key lives in a key file next to the store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fernet::Fernet;
use pipewright_core::secret::{SecretStore, SecretValue};
use pipewright_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{ConfigError, ConfigResult};

/// Age after which a secret is reported as stale.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 90;
/// Store location when the deployment file names none.
pub const DEFAULT_SECRETS_FILE: &str = ".pipewright/secrets.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSecret {
    /// Fernet token of the JSON-encoded value.
    secret: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

pub struct LocalSecretStore {
    path: PathBuf,
    cipher: Fernet,
    secrets: Mutex<BTreeMap<String, StoredSecret>>,
}

impl LocalSecretStore {
    /// Open the store at `path`; a missing file is an empty store. The key
    /// file is created on first use.
    pub async fn open(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let cipher = load_cipher(&key_path(&path)).await?;
        let secrets = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Secrets file not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            cipher,
            secrets: Mutex::new(secrets),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_path(&self) -> PathBuf {
        key_path(&self.path)
    }

    /// Keys not updated within `max_age` of `now`.
    pub async fn stale_keys(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let secrets = self.secrets.lock().await;
        let stale: Vec<String> = secrets
            .iter()
            .filter(|(_, s)| now - s.updated > max_age)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            warn!(key = %key, days = max_age.num_days(), "Secret has not been updated recently");
        }
        stale
    }

    fn encrypt(&self, value: &SecretValue) -> Result<String> {
        let plain = serde_json::to_vec(value)
            .map_err(|e| Error::Internal(format!("failed to encode secret: {}", e)))?;
        Ok(self.cipher.encrypt(&plain))
    }

    fn decrypt(&self, path: &str, token: &str) -> Result<SecretValue> {
        let plain = self
            .cipher
            .decrypt(token)
            .map_err(|_| Error::Internal(format!("secret '{}' cannot be decrypted", path)))?;
        serde_json::from_slice(&plain)
            .map_err(|e| Error::Internal(format!("secret '{}' is malformed: {}", path, e)))
    }

    async fn persist(&self, secrets: &BTreeMap<String, StoredSecret>) -> Result<()> {
        let content = serde_json::to_string_pretty(secrets)
            .map_err(|e| Error::Internal(format!("failed to encode secrets: {}", e)))?;
        create_parent(&self.path).await.map_err(|e| {
            Error::External(format!("failed to create {}: {}", self.path.display(), e))
        })?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            Error::External(format!(
                "failed to write secrets file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

fn key_path(secrets_path: &Path) -> PathBuf {
    secrets_path.with_extension("key")
}

async fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => tokio::fs::create_dir_all(parent).await,
        None => Ok(()),
    }
}

async fn load_cipher(path: &Path) -> ConfigResult<Fernet> {
    let key = match tokio::fs::read_to_string(path).await {
        Ok(key) => key.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key = Fernet::generate_key();
            create_parent(path).await?;
            tokio::fs::write(path, &key).await?;
            info!(path = %path.display(), "Generated secrets key");
            key
        }
        Err(e) => return Err(e.into()),
    };
    Fernet::new(&key).ok_or_else(|| ConfigError::InvalidValue {
        field: format!("secrets key {}", path.display()),
        message: "not a valid Fernet key".to_string(),
    })
}

#[async_trait]
impl SecretStore for LocalSecretStore {
    async fn get(&self, path: &str) -> Result<SecretValue> {
        let token = self
            .secrets
            .lock()
            .await
            .get(path)
            .map(|s| s.secret.clone())
            .ok_or_else(|| Error::NotFound(format!("secret '{}'", path)))?;
        self.decrypt(path, &token)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .secrets
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set(&self, path: &str, value: SecretValue) -> Result<()> {
        let token = self.encrypt(&value)?;
        let mut secrets = self.secrets.lock().await;
        let now = Utc::now();

        let mut updated = secrets.clone();
        updated
            .entry(path.to_string())
            .and_modify(|s| {
                s.secret = token.clone();
                s.updated = now;
            })
            .or_insert_with(|| StoredSecret {
                secret: token.clone(),
                created: now,
                updated: now,
            });
        self.persist(&updated).await?;
        *secrets = updated;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().await;
        let mut updated = secrets.clone();
        if updated.remove(path).is_none() {
            return Err(Error::NotFound(format!("secret '{}'", path)));
        }
        self.persist(&updated).await?;
        *secrets = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_set_get_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");

        let store = LocalSecretStore::open(&path).await.unwrap();
        store
            .set("REFERER_SECRET", SecretValue::String("abc".to_string()))
            .await
            .unwrap();
        let mut token = HashMap::new();
        token.insert("PAT".to_string(), "ghp_123".to_string());
        store
            .set("github/build_status", SecretValue::Map(token))
            .await
            .unwrap();

        let reopened = LocalSecretStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("REFERER_SECRET").await.unwrap(),
            SecretValue::String("abc".to_string())
        );
        assert_eq!(
            reopened.get_key("github/build_status", "PAT").await.unwrap(),
            "ghp_123"
        );
        assert_eq!(reopened.list("github/").await.unwrap(), vec!["github/build_status"]);
    }

    #[tokio::test]
    async fn test_missing_secret_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSecretStore::open(dir.path().join("s.json"))
            .await
            .unwrap();

        assert!(matches!(store.get("nope").await, Err(Error::NotFound(_))));
        assert!(store.delete("nope").await.is_err());

        store
            .set("k", SecretValue::String("v".to_string()))
            .await
            .unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_stale_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSecretStore::open(dir.path().join("s.json"))
            .await
            .unwrap();
        store
            .set("old", SecretValue::String("v".to_string()))
            .await
            .unwrap();

        let max_age = Duration::days(DEFAULT_MAX_AGE_DAYS);
        assert!(store.stale_keys(max_age, Utc::now()).await.is_empty());

        let later = Utc::now() + Duration::days(DEFAULT_MAX_AGE_DAYS + 1);
        assert_eq!(store.stale_keys(max_age, later).await, vec!["old"]);
    }

    #[tokio::test]
    async fn test_values_are_encrypted_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");

        let store = LocalSecretStore::open(&path).await.unwrap();
        store
            .set("REFERER_SECRET", SecretValue::String("hunter2-referer".to_string()))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("REFERER_SECRET"));
        assert!(!raw.contains("hunter2-referer"));
        assert!(store.key_path().exists());

        // A different key cannot read the store
        std::fs::write(store.key_path(), Fernet::generate_key()).unwrap();
        let rekeyed = LocalSecretStore::open(&path).await.unwrap();
        assert!(matches!(
            rekeyed.get("REFERER_SECRET").await,
            Err(Error::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        let store = LocalSecretStore::open(&path).await.unwrap();
        store
            .set("kept", SecretValue::String("v".to_string()))
            .await
            .unwrap();

        // A directory in place of the file makes every write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store
            .set("lost", SecretValue::String("v".to_string()))
            .await
            .is_err());
        assert!(matches!(store.get("lost").await, Err(Error::NotFound(_))));
        assert!(store.delete("kept").await.is_err());
        assert_eq!(
            store.get("kept").await.unwrap(),
            SecretValue::String("v".to_string())
        );
    }
}

