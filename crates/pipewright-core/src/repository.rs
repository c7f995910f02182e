//! Repository descriptors.
//!
//! A descriptor names one source repository and the role it plays in a
//! pipeline. Identity fields are fixed when the descriptor is built; the
//! orchestration fields are filled in by a stage manager, once each, as the
//! source, approval, build and deploy stages are appended.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::artifact::ArtifactRef;
use crate::resource::{BuildDependency, DependencyRegistry, ResourceHandle, ResourceKind};
use crate::{Error, Result};

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

/// Which stage manager variant drives a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageManagerKind {
    /// Static site, deployed by extracting the build output into a bucket.
    Web,
    /// Packaged service, deployed to a compute function behind a gateway.
    MiddleTier,
}

impl std::fmt::Display for StageManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageManagerKind::Web => write!(f, "web"),
            StageManagerKind::MiddleTier => write!(f, "middle_tier"),
        }
    }
}

impl std::str::FromStr for StageManagerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(StageManagerKind::Web),
            "middle_tier" | "middle-tier" | "mt" => Ok(StageManagerKind::MiddleTier),
            _ => Err(format!("Unknown stage manager kind: {}", s)),
        }
    }
}

/// Configuration progress of one descriptor. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationState {
    Created,
    SourceConfigured,
    ApprovalConfigured,
    BuildConfigured,
    DeployConfigured,
    DeploySkipped,
}

impl ConfigurationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConfigurationState::DeployConfigured | ConfigurationState::DeploySkipped
        )
    }
}

impl std::fmt::Display for ConfigurationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationState::Created => write!(f, "created"),
            ConfigurationState::SourceConfigured => write!(f, "source_configured"),
            ConfigurationState::ApprovalConfigured => write!(f, "approval_configured"),
            ConfigurationState::BuildConfigured => write!(f, "build_configured"),
            ConfigurationState::DeployConfigured => write!(f, "deploy_configured"),
            ConfigurationState::DeploySkipped => write!(f, "deploy_skipped"),
        }
    }
}

/// What the source stage hands back to the descriptor.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub artifact: ArtifactRef,
    pub action_name: String,
    pub stage_name: String,
    pub pipeline_name: String,
}

/// One source-code repository and its pipeline role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    name: String,
    owner: String,
    repo_name: String,
    branch: String,
    deployable: bool,
    stage_manager_kind: StageManagerKind,
    source_connection_ref: String,
    build_dependencies: DependencyRegistry,

    state: ConfigurationState,
    source_artifact: Option<ArtifactRef>,
    source_action_name: Option<String>,
    source_stage_name: Option<String>,
    pipeline_name: Option<String>,
    build_project_name: Option<String>,
}

impl RepositoryDescriptor {
    pub fn builder(
        name: impl Into<String>,
        stage_manager_kind: StageManagerKind,
    ) -> RepositoryDescriptorBuilder {
        RepositoryDescriptorBuilder::new(name, stage_manager_kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn deployable(&self) -> bool {
        self.deployable
    }

    pub fn stage_manager_kind(&self) -> StageManagerKind {
        self.stage_manager_kind
    }

    pub fn source_connection_ref(&self) -> &str {
        &self.source_connection_ref
    }

    pub fn state(&self) -> ConfigurationState {
        self.state
    }

    pub fn source_artifact(&self) -> Option<&ArtifactRef> {
        self.source_artifact.as_ref()
    }

    pub fn source_action_name(&self) -> Option<&str> {
        self.source_action_name.as_deref()
    }

    pub fn source_stage_name(&self) -> Option<&str> {
        self.source_stage_name.as_deref()
    }

    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    pub fn build_project_name(&self) -> Option<&str> {
        self.build_project_name.as_deref()
    }

    pub fn build_dependencies(&self) -> &DependencyRegistry {
        &self.build_dependencies
    }

    /// Attach a provisioned resource. Only allowed before configuration starts.
    pub fn add_build_dependency(&mut self, dependency: impl Into<BuildDependency>) -> Result<()> {
        self.expect_state(ConfigurationState::Created)?;
        self.build_dependencies
            .register(dependency.into())
            .map_err(|rejected| Error::DuplicateDependency {
                repository: self.name.clone(),
                kind: rejected.kind(),
            })
    }

    /// First dependency of `kind`, or `None`.
    pub fn get_build_dependency_of_type(&self, kind: ResourceKind) -> Option<&BuildDependency> {
        self.build_dependencies.get(kind)
    }

    pub fn has_build_dependency_of_type(&self, kind: ResourceKind) -> bool {
        self.build_dependencies.contains(kind)
    }

    /// Typed dependency lookup.
    pub fn dependency<H: ResourceHandle>(&self) -> Option<&H> {
        self.build_dependencies.handle::<H>()
    }

    /// Typed dependency lookup that fails with a configuration error.
    pub fn require_dependency<H: ResourceHandle>(&self) -> Result<&H> {
        self.dependency::<H>()
            .ok_or_else(|| Error::MissingBuildDependency {
                repository: self.name.clone(),
                kind: H::KIND,
            })
    }

    /// Source artifact, which every stage after the source stage consumes.
    pub fn require_source_artifact(&self) -> Result<&ArtifactRef> {
        self.source_artifact
            .as_ref()
            .ok_or_else(|| self.missing("source_artifact"))
    }

    pub fn record_source(&mut self, record: SourceRecord) -> Result<()> {
        self.expect_state(ConfigurationState::Created)?;
        set_once(&self.name, &mut self.source_artifact, record.artifact, "source_artifact")?;
        set_once(
            &self.name,
            &mut self.source_action_name,
            record.action_name,
            "source_action_name",
        )?;
        set_once(
            &self.name,
            &mut self.source_stage_name,
            record.stage_name,
            "source_stage_name",
        )?;
        set_once(
            &self.name,
            &mut self.pipeline_name,
            record.pipeline_name,
            "pipeline_name",
        )?;
        self.state = ConfigurationState::SourceConfigured;
        Ok(())
    }

    pub fn record_approval(&mut self) -> Result<()> {
        self.expect_state(ConfigurationState::SourceConfigured)?;
        self.state = ConfigurationState::ApprovalConfigured;
        Ok(())
    }

    pub fn record_build(&mut self, build_project_name: impl Into<String>) -> Result<()> {
        self.expect_state(ConfigurationState::ApprovalConfigured)?;
        set_once(
            &self.name,
            &mut self.build_project_name,
            build_project_name.into(),
            "build_project_name",
        )?;
        self.state = ConfigurationState::BuildConfigured;
        Ok(())
    }

    pub fn record_deploy(&mut self) -> Result<()> {
        self.expect_state(ConfigurationState::BuildConfigured)?;
        self.state = ConfigurationState::DeployConfigured;
        Ok(())
    }

    pub fn record_deploy_skipped(&mut self) -> Result<()> {
        self.expect_state(ConfigurationState::BuildConfigured)?;
        self.state = ConfigurationState::DeploySkipped;
        Ok(())
    }

    /// Fail unless the descriptor is exactly in `expected`.
    pub fn expect_state(&self, expected: ConfigurationState) -> Result<()> {
        if self.state != expected {
            return Err(Error::OutOfOrder {
                repository: self.name.clone(),
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub fn missing(&self, field: &str) -> Error {
        Error::MissingField {
            repository: self.name.clone(),
            field: field.to_string(),
        }
    }
}

fn set_once<T>(repository: &str, slot: &mut Option<T>, value: T, field: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::FieldAlreadySet {
            repository: repository.to_string(),
            field: field.to_string(),
        });
    }
    *slot = Some(value);
    Ok(())
}

/// Builder for [`RepositoryDescriptor`].
pub struct RepositoryDescriptorBuilder {
    name: String,
    stage_manager_kind: StageManagerKind,
    owner: String,
    repo_name: String,
    branch: String,
    deployable: bool,
    source_connection_ref: String,
    dependencies: Vec<BuildDependency>,
}

impl RepositoryDescriptorBuilder {
    pub fn new(name: impl Into<String>, stage_manager_kind: StageManagerKind) -> Self {
        Self {
            name: name.into(),
            stage_manager_kind,
            owner: String::new(),
            repo_name: String::new(),
            branch: "main".to_string(),
            deployable: false,
            source_connection_ref: String::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn repo_name(mut self, repo_name: impl Into<String>) -> Self {
        self.repo_name = repo_name.into();
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn deployable(mut self, deployable: bool) -> Self {
        self.deployable = deployable;
        self
    }

    pub fn connection(mut self, connection_ref: impl Into<String>) -> Self {
        self.source_connection_ref = connection_ref.into();
        self
    }

    pub fn dependency(mut self, dependency: impl Into<BuildDependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn build(self) -> Result<RepositoryDescriptor> {
        if !NAME_REGEX.is_match(&self.name) {
            return Err(Error::InvalidInput(format!(
                "repository name '{}' must start with a letter and contain only letters, digits, '_' or '-'",
                self.name
            )));
        }
        for (field, value) in [
            ("owner", &self.owner),
            ("repo_name", &self.repo_name),
            ("branch", &self.branch),
            ("source_connection_ref", &self.source_connection_ref),
        ] {
            if value.trim().is_empty() {
                return Err(Error::MissingField {
                    repository: self.name.clone(),
                    field: field.to_string(),
                });
            }
        }

        let mut descriptor = RepositoryDescriptor {
            name: self.name,
            owner: self.owner,
            repo_name: self.repo_name,
            branch: self.branch,
            deployable: self.deployable,
            stage_manager_kind: self.stage_manager_kind,
            source_connection_ref: self.source_connection_ref,
            build_dependencies: DependencyRegistry::new(),
            state: ConfigurationState::Created,
            source_artifact: None,
            source_action_name: None,
            source_stage_name: None,
            pipeline_name: None,
            build_project_name: None,
        };
        for dependency in self.dependencies {
            descriptor.add_build_dependency(dependency)?;
        }
        Ok(descriptor)
    }
}
