//! Cloud provisioning abstraction.
//!
//! The provisioner accepts the declarative descriptions shaped by this
//! workspace. How it turns them into real infrastructure is its own concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::notification::EventRule;
use crate::pipeline::Pipeline;

/// Receipt for a submitted pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineHandle {
    pub pipeline_name: String,
    /// Provisioner-specific location of the submitted description.
    pub location: String,
    pub stage_count: usize,
}

/// Trait for provisioning backends.
#[async_trait]
pub trait CloudProvisioner: Send + Sync {
    /// Name of this provisioner.
    fn name(&self) -> &'static str;

    /// Submit a fully configured pipeline.
    async fn submit_pipeline(&self, pipeline: &Pipeline) -> Result<PipelineHandle>;

    /// Submit the event rules attached to a pipeline.
    async fn submit_rules(&self, pipeline: &PipelineHandle, rules: &[EventRule]) -> Result<()>;
}
