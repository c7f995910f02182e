//! CLI command implementations.

pub mod notify;
pub mod secrets;

use anyhow::{Context, Result};
use pipewright_config::{DeploymentConfig, PipelineConfig, parse_deployment};
use pipewright_core::notification::EventRule;
use pipewright_core::pipeline::Pipeline;
use pipewright_core::provisioner::CloudProvisioner;
use pipewright_pipeline::{NotificationManager, PipelineManager};
use std::path::Path;
use tracing::info;

use crate::manifest::ManifestProvisioner;

pub fn load_config(path: &Path) -> Result<DeploymentConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_deployment(&content)
        .with_context(|| format!("invalid deployment file {}", path.display()))
}

/// Configure one pipeline and derive its notification rules.
fn configure(
    config: &DeploymentConfig,
    pipeline: &PipelineConfig,
) -> Result<(Pipeline, Vec<EventRule>)> {
    let descriptors = pipeline.descriptors(&config.provisioning)?;
    let mut manager = PipelineManager::with_repositories(
        &config.provisioning,
        &pipeline.name,
        pipeline.artifact_bucket(),
        descriptors,
    );
    manager
        .configure()
        .with_context(|| format!("failed to configure pipeline '{}'", pipeline.name))?;

    let (pipeline, repos) = manager.into_parts();
    let rules = NotificationManager::new(config.notifications.clone()).rules_for_all(&repos)?;
    Ok((pipeline, rules))
}

pub fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    for pipeline in &config.pipelines {
        let (configured, rules) = configure(&config, pipeline)?;
        println!(
            "{}: {} stages, {} event rules",
            configured.name,
            configured.stages.len(),
            rules.len()
        );
    }
    println!("Configuration is valid");
    Ok(())
}

pub async fn synth(path: &Path, out: &Path) -> Result<()> {
    let config = load_config(path)?;
    let provisioner = ManifestProvisioner::new(out);

    // Configure everything before submitting anything
    let configured = config
        .pipelines
        .iter()
        .map(|p| configure(&config, p))
        .collect::<Result<Vec<_>>>()?;

    for (pipeline, rules) in configured {
        let handle = provisioner
            .submit_pipeline(&pipeline)
            .await
            .with_context(|| format!("failed to submit pipeline '{}'", pipeline.name))?;
        provisioner.submit_rules(&handle, &rules).await?;
        info!(
            provisioner = provisioner.name(),
            pipeline = %handle.pipeline_name,
            location = %handle.location,
            "Submitted pipeline"
        );
        println!("{} -> {}", handle.pipeline_name, handle.location);
    }
    Ok(())
}
