//! Provisioner that writes pipeline descriptions to disk.

use async_trait::async_trait;
use pipewright_core::notification::EventRule;
use pipewright_core::pipeline::Pipeline;
use pipewright_core::provisioner::{CloudProvisioner, PipelineHandle};
use pipewright_core::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes `{pipeline}.pipeline.json` and `{pipeline}.rules.json` into a
/// directory for the provisioning tool to pick up.
pub struct ManifestProvisioner {
    out_dir: PathBuf,
}

impl ManifestProvisioner {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    async fn write_json(&self, file_name: String, value: Value) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| io_error(&self.out_dir, e))?;
        let path = self.out_dir.join(file_name);
        let content = serde_json::to_string_pretty(&value)
            .map_err(|e| Error::Internal(format!("failed to encode {}: {}", path.display(), e)))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(path)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::External(format!("failed to write {}: {}", path.display(), e))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(e.to_string()))
}

#[async_trait]
impl CloudProvisioner for ManifestProvisioner {
    fn name(&self) -> &'static str {
        "manifest"
    }

    async fn submit_pipeline(&self, pipeline: &Pipeline) -> Result<PipelineHandle> {
        let path = self
            .write_json(format!("{}.pipeline.json", pipeline.name), to_value(pipeline)?)
            .await?;
        info!(pipeline = %pipeline.name, path = %path.display(), "Wrote pipeline description");
        Ok(PipelineHandle {
            pipeline_name: pipeline.name.clone(),
            location: path.display().to_string(),
            stage_count: pipeline.stages.len(),
        })
    }

    async fn submit_rules(&self, pipeline: &PipelineHandle, rules: &[EventRule]) -> Result<()> {
        let path = self
            .write_json(
                format!("{}.rules.json", pipeline.pipeline_name),
                to_value(&rules)?,
            )
            .await?;
        info!(
            pipeline = %pipeline.pipeline_name,
            rules = rules.len(),
            path = %path.display(),
            "Wrote event rules"
        );
        Ok(())
    }
}
