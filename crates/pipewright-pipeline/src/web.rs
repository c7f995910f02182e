//! Stage manager for static websites.

use pipewright_config::ProvisioningConfig;
use pipewright_core::pipeline::{Action, BucketDeployAction, BuildPhase, BuildSpec, Pipeline, Stage};
use pipewright_core::resource::BucketHandle;
use pipewright_core::{
    ArtifactRef, ConfigurationState, RepositoryDescriptor, Result, StageManagerKind,
};
use tracing::info;

use crate::stage_manager::{StageManager, append_build_stage};

/// Output directory of the static site generator.
pub const SITE_OUTPUT_DIR: &str = ".output/public";

/// Builds a static site with a JS toolchain and extracts the output into the
/// repository's storage bucket.
pub struct WebStageManager {
    config: ProvisioningConfig,
    build_artifact: Option<ArtifactRef>,
}

impl WebStageManager {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            config,
            build_artifact: None,
        }
    }

    pub fn build_spec(&self) -> BuildSpec {
        BuildSpec::new()
            .install(
                BuildPhase::commands([
                    "echo Installing Node.js dependencies...",
                    "npm install -g npm@latest",
                    "npm install",
                    "npm run postinstall",
                ])
                .with_runtime("nodejs", "18"),
            )
            .pre_build(BuildPhase::commands(["echo Running tests..."]))
            .build(BuildPhase::commands([
                "echo Building the static site...".to_string(),
                format!("npm run generate:{}", self.config.environment),
            ]))
            .artifacts(SITE_OUTPUT_DIR, &["**/*"])
    }
}

impl StageManager for WebStageManager {
    fn kind(&self) -> StageManagerKind {
        StageManagerKind::Web
    }

    fn add_build_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()> {
        let spec = self.build_spec();
        let output = append_build_stage(pipeline, repo, &self.config.build_image, spec)?;
        self.build_artifact = Some(output);
        Ok(())
    }

    fn add_deploy_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()> {
        repo.expect_state(ConfigurationState::BuildConfigured)?;
        let bucket = repo.require_dependency::<BucketHandle>()?.clone();
        let input = self
            .build_artifact
            .clone()
            .ok_or_else(|| repo.missing("build_artifact"))?;

        let stage_name = format!("{}DeployStage", repo.name());
        let action = BucketDeployAction {
            name: format!("{}Deploy", repo.name()),
            input,
            bucket,
            extract: true,
        };
        info!(
            repository = %repo.name(),
            bucket = %action.bucket.name,
            "Adding bucket deploy stage"
        );
        pipeline.add_stage(Stage::single(&stage_name, Action::BucketDeploy(action)))?;

        repo.record_deploy()
    }

    fn build_artifact(&self) -> Option<&ArtifactRef> {
        self.build_artifact.as_ref()
    }
}
