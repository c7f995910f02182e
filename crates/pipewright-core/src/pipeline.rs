//! Declarative pipeline model.
//!
//! These types describe a pipeline for the external provisioning API; nothing
//! here executes anything. Stage order is execution order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::artifact::ArtifactRef;
use crate::resource::BucketHandle;
use crate::{Error, Result};

/// A CI/CD pipeline under construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (e.g., "RentalPropertiesAgentCICDPipeline").
    pub name: String,
    /// Bucket holding intermediate artifacts, if not left to the provider.
    pub artifact_bucket: Option<BucketHandle>,
    /// Stages in execution order.
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, artifact_bucket: Option<BucketHandle>) -> Self {
        Self {
            name: name.into(),
            artifact_bucket,
            stages: Vec::new(),
        }
    }

    /// Append a stage. Stage and action names must be unique across the
    /// whole pipeline.
    pub fn add_stage(&mut self, stage: Stage) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for existing in &self.stages {
            seen.insert(existing.name.as_str());
            for action in &existing.actions {
                seen.insert(action.name());
            }
        }

        let mut candidates = vec![stage.name.as_str()];
        candidates.extend(stage.actions.iter().map(|a| a.name()));
        for identifier in candidates {
            if !seen.insert(identifier) {
                return Err(Error::DuplicateIdentifier {
                    pipeline: self.name.clone(),
                    identifier: identifier.to_string(),
                });
            }
        }

        self.stages.push(stage);
        Ok(())
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.stages.iter().any(|s| s.name == name)
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Every build project the pipeline references, in stage order.
    pub fn build_projects(&self) -> impl Iterator<Item = &BuildProject> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .filter_map(|a| match a {
                Action::Build(build) => Some(&build.project),
                _ => None,
            })
    }
}

/// A named step in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn single(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            actions: vec![action],
        }
    }

    pub fn kind(&self) -> Option<StageKind> {
        self.actions.first().map(Action::kind)
    }
}

/// Coarse classification of a stage by its first action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Source,
    ManualApproval,
    Build,
    Deploy,
}

/// What a stage does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Pull a branch through a pre-authorized source connection.
    Source(SourceAction),
    /// Suspend until a human approves or rejects.
    ManualApproval(ApprovalAction),
    /// Run a build project. Deploy stages that run scripts use this too.
    Build(BuildAction),
    /// Copy an artifact into a bucket.
    BucketDeploy(BucketDeployAction),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Source(a) => &a.name,
            Action::ManualApproval(a) => &a.name,
            Action::Build(a) => &a.name,
            Action::BucketDeploy(a) => &a.name,
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Action::Source(_) => StageKind::Source,
            Action::ManualApproval(_) => StageKind::ManualApproval,
            Action::Build(a) if a.deploys => StageKind::Deploy,
            Action::Build(_) => StageKind::Build,
            Action::BucketDeploy(_) => StageKind::Deploy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAction {
    pub name: String,
    /// Opaque reference to a pre-established source connection.
    pub connection_ref: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub output: ArtifactRef,
    pub variables_namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalAction {
    pub name: String,
    pub additional_information: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildAction {
    pub name: String,
    pub project: BuildProject,
    pub input: ArtifactRef,
    pub outputs: Vec<ArtifactRef>,
    /// Whether this build job performs a deployment.
    #[serde(default)]
    pub deploys: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDeployAction {
    pub name: String,
    pub input: ArtifactRef,
    pub bucket: BucketHandle,
    /// Unpack the artifact archive into the bucket root.
    pub extract: bool,
}

/// A build job definition for the external runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildProject {
    pub construct_id: String,
    pub project_name: String,
    pub build_image: String,
    pub spec: BuildSpec,
    /// Extra permissions granted to the job's role.
    pub policies: Vec<PolicyStatement>,
}

/// A permission grant: these actions on exactly these resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn new<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// The build specification contract handed to the job runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: String,
    pub phases: BuildPhases,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactSelector>,
}

impl BuildSpec {
    pub fn new() -> Self {
        Self {
            version: "0.2".to_string(),
            phases: BuildPhases::default(),
            artifacts: None,
        }
    }

    pub fn install(mut self, phase: BuildPhase) -> Self {
        self.phases.install = Some(phase);
        self
    }

    pub fn pre_build(mut self, phase: BuildPhase) -> Self {
        self.phases.pre_build = Some(phase);
        self
    }

    pub fn build(mut self, phase: BuildPhase) -> Self {
        self.phases.build = Some(phase);
        self
    }

    pub fn artifacts(mut self, base_directory: impl Into<String>, files: &[&str]) -> Self {
        self.artifacts = Some(ArtifactSelector {
            base_directory: Some(base_directory.into()),
            files: files.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    /// Every command across all phases, in execution order.
    pub fn commands(&self) -> Vec<&str> {
        [
            &self.phases.install,
            &self.phases.pre_build,
            &self.phases.build,
        ]
        .into_iter()
        .flatten()
        .flat_map(|p| p.commands.iter().map(|c| c.as_str()))
        .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPhases {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<BuildPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_build: Option<BuildPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildPhase>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPhase {
    #[serde(
        rename = "runtime-versions",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub runtime_versions: BTreeMap<String, String>,
    pub commands: Vec<String>,
}

impl BuildPhase {
    pub fn commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            runtime_versions: BTreeMap::new(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>, version: impl Into<String>) -> Self {
        self.runtime_versions.insert(runtime.into(), version.into());
        self
    }
}

/// Which files of the job workspace make up the output artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSelector {
    #[serde(rename = "base-directory", skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    pub files: Vec<String>,
}
