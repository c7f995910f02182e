//! The stage manager contract.

use pipewright_config::ProvisioningConfig;
use pipewright_core::pipeline::{
    Action, ApprovalAction, BuildAction, BuildProject, BuildSpec, Pipeline, SourceAction, Stage,
};
use pipewright_core::repository::SourceRecord;
use pipewright_core::{
    ArtifactRef, ConfigurationState, RepositoryDescriptor, Result, StageManagerKind,
};
use tracing::debug;

use crate::middle_tier::MiddleTierStageManager;
use crate::web::WebStageManager;

pub const APPROVAL_STAGE_NAME: &str = "ManualApproval";
pub const APPROVAL_INFORMATION: &str = "Approve the change to continue deployment";

/// Appends the stages for one repository to a shared pipeline.
///
/// Callers invoke the operations strictly in order: source, manual approval,
/// build, then deploy only for deployable repositories. Each call moves the
/// descriptor one step through its configuration state machine and fails
/// if invoked out of turn.
pub trait StageManager: Send {
    /// Variant implemented by this manager.
    fn kind(&self) -> StageManagerKind;

    /// Register the repository's source connection as the first stage.
    fn add_source_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()> {
        append_source_stage(pipeline, repo)
    }

    /// Append a human gate. Execution suspends here until approved.
    fn add_manual_approval_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()> {
        append_approval_stage(pipeline, repo)
    }

    /// Append the variant's build job; replaces the held build artifact.
    fn add_build_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()>;

    /// Append the variant's deployment of the held build artifact.
    fn add_deploy_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()>;

    /// Artifact produced by the most recent build stage.
    fn build_artifact(&self) -> Option<&ArtifactRef>;
}

/// Stage manager for a descriptor's variant.
pub fn stage_manager_for(
    kind: StageManagerKind,
    config: &ProvisioningConfig,
) -> Box<dyn StageManager> {
    match kind {
        StageManagerKind::Web => Box::new(WebStageManager::new(config.clone())),
        StageManagerKind::MiddleTier => Box::new(MiddleTierStageManager::new(config.clone())),
    }
}

pub(crate) fn append_source_stage(
    pipeline: &mut Pipeline,
    repo: &mut RepositoryDescriptor,
) -> Result<()> {
    repo.expect_state(ConfigurationState::Created)?;

    let action_name = format!("{}_Source", repo.name());
    let stage_name = format!("{}_SourceStage", repo.name());
    let output = ArtifactRef::new();

    let action = SourceAction {
        name: action_name.clone(),
        connection_ref: repo.source_connection_ref().to_string(),
        owner: repo.owner().to_string(),
        repo: repo.repo_name().to_string(),
        branch: repo.branch().to_string(),
        output: output.clone(),
        variables_namespace: format!("{}_SourceVariables", repo.name()),
    };
    pipeline.add_stage(Stage::single(&stage_name, Action::Source(action)))?;
    debug!(repository = %repo.name(), stage = %stage_name, "Added source stage");

    repo.record_source(SourceRecord {
        artifact: output,
        action_name,
        stage_name,
        pipeline_name: pipeline.name.clone(),
    })
}

pub(crate) fn append_approval_stage(
    pipeline: &mut Pipeline,
    repo: &mut RepositoryDescriptor,
) -> Result<()> {
    repo.expect_state(ConfigurationState::SourceConfigured)?;

    // A multi-repository pipeline gets one gate per repository
    let name = if pipeline.has_stage(APPROVAL_STAGE_NAME) {
        format!("{}_{}", repo.name(), APPROVAL_STAGE_NAME)
    } else {
        APPROVAL_STAGE_NAME.to_string()
    };

    let action = ApprovalAction {
        name: name.clone(),
        additional_information: APPROVAL_INFORMATION.to_string(),
    };
    pipeline.add_stage(Stage::single(&name, Action::ManualApproval(action)))?;
    debug!(repository = %repo.name(), stage = %name, "Added manual approval stage");

    repo.record_approval()
}

/// Append a build stage running `spec` over the source artifact and return
/// the new build artifact.
pub(crate) fn append_build_stage(
    pipeline: &mut Pipeline,
    repo: &mut RepositoryDescriptor,
    build_image: &str,
    spec: BuildSpec,
) -> Result<ArtifactRef> {
    repo.expect_state(ConfigurationState::ApprovalConfigured)?;
    let input = repo.require_source_artifact()?.clone();

    let construct_id = format!("{}BuildProject", repo.name());
    let project_name = format!("{}-{}", pipeline.name, construct_id);
    let output = ArtifactRef::named(format!("{}_BuildOutput", repo.name()));
    let stage_name = format!("{}_BuildStage", repo.name());

    let action = BuildAction {
        name: format!("{}_Build", repo.name()),
        project: BuildProject {
            construct_id,
            project_name: project_name.clone(),
            build_image: build_image.to_string(),
            spec,
            policies: Vec::new(),
        },
        input,
        outputs: vec![output.clone()],
        deploys: false,
    };
    pipeline.add_stage(Stage::single(&stage_name, Action::Build(action)))?;
    debug!(
        repository = %repo.name(),
        stage = %stage_name,
        project = %project_name,
        "Added build stage"
    );

    repo.record_build(project_name)?;
    Ok(output)
}
