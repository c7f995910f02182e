//! Local secret store commands.

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use pipewright_config::LocalSecretStore;
use pipewright_config::secrets::DEFAULT_SECRETS_FILE;
use pipewright_core::secret::{SecretStore, SecretValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Open the store named by the deployment file, or the default store when
/// there is no deployment file.
pub async fn open_store(config_path: &Path) -> Result<LocalSecretStore> {
    let path = if config_path.exists() {
        super::load_config(config_path)?
            .secrets_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_FILE))
    } else {
        PathBuf::from(DEFAULT_SECRETS_FILE)
    };
    LocalSecretStore::open(&path)
        .await
        .with_context(|| format!("failed to open secrets file {}", path.display()))
}

pub async fn set(
    config_path: &Path,
    key: &str,
    value: String,
    field: Option<String>,
) -> Result<()> {
    let store = open_store(config_path).await?;
    let secret = match field {
        Some(field) => {
            let mut map = match store.get(key).await {
                Ok(SecretValue::Map(map)) => map,
                _ => HashMap::new(),
            };
            map.insert(field, value);
            SecretValue::Map(map)
        }
        None => SecretValue::String(value),
    };
    store.set(key, secret).await?;
    println!("Stored secret '{}' in {}", key, store.path().display());
    Ok(())
}

pub async fn get(config_path: &Path, key: &str, field: Option<&str>) -> Result<()> {
    let store = open_store(config_path).await?;
    match field {
        Some(field) => println!("{}", store.get_key(key, field).await?),
        None => match store.get(key).await? {
            SecretValue::String(s) => println!("{}", s),
            map @ SecretValue::Map(_) => println!("{}", serde_json::to_string_pretty(&map)?),
        },
    }
    Ok(())
}

pub async fn list(config_path: &Path, prefix: &str) -> Result<()> {
    let store = open_store(config_path).await?;
    for key in store.list(prefix).await? {
        println!("{}", key);
    }
    Ok(())
}

pub async fn check(config_path: &Path, max_age_days: i64) -> Result<()> {
    let store = open_store(config_path).await?;
    let stale = store
        .stale_keys(Duration::days(max_age_days), Utc::now())
        .await;
    if !stale.is_empty() {
        bail!(
            "{} secret(s) not updated in {} days: {}",
            stale.len(),
            max_age_days,
            stale.join(", ")
        );
    }
    println!("All secrets updated within {} days", max_age_days);
    Ok(())
}
