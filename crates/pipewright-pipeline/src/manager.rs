//! Pipeline manager: drives stage managers through the fixed stage template.

use pipewright_config::ProvisioningConfig;
use pipewright_core::pipeline::Pipeline;
use pipewright_core::resource::BucketHandle;
use pipewright_core::{Error, RepositoryDescriptor, Result};
use tracing::{debug, info};

use crate::stage_manager::{StageManager, stage_manager_for};

/// Owns one pipeline and the ordered repositories that feed it.
///
/// Every repository gets source, manual approval and build stages in that
/// order. Deployable repositories additionally get a deploy stage. Stages of
/// one repository are appended before the next repository starts.
pub struct PipelineManager {
    pipeline: Pipeline,
    entries: Vec<(RepositoryDescriptor, Box<dyn StageManager>)>,
    configured: bool,
}

impl PipelineManager {
    /// Single-repository pipeline.
    pub fn new(
        config: &ProvisioningConfig,
        name: impl Into<String>,
        artifact_bucket: Option<BucketHandle>,
        repo: RepositoryDescriptor,
    ) -> Self {
        Self::with_repositories(config, name, artifact_bucket, vec![repo])
    }

    /// Pipeline over several repositories, configured in the given order.
    pub fn with_repositories(
        config: &ProvisioningConfig,
        name: impl Into<String>,
        artifact_bucket: Option<BucketHandle>,
        repos: Vec<RepositoryDescriptor>,
    ) -> Self {
        let entries = repos
            .into_iter()
            .map(|repo| {
                let manager = stage_manager_for(repo.stage_manager_kind(), config);
                (repo, manager)
            })
            .collect();
        Self {
            pipeline: Pipeline::new(name, artifact_bucket),
            entries,
            configured: false,
        }
    }

    /// Pipeline driven by an explicit stage manager, which must be of the
    /// repository's kind.
    pub fn with_stage_manager(
        pipeline: Pipeline,
        repo: RepositoryDescriptor,
        manager: Box<dyn StageManager>,
    ) -> Result<Self> {
        if manager.kind() != repo.stage_manager_kind() {
            return Err(Error::InvalidInput(format!(
                "repository '{}' needs a {} stage manager, got {}",
                repo.name(),
                repo.stage_manager_kind(),
                manager.kind()
            )));
        }
        Ok(Self {
            pipeline,
            entries: vec![(repo, manager)],
            configured: false,
        })
    }

    /// Append every repository's stages. May be called once.
    ///
    /// On error the pipeline keeps the stages appended so far and must not
    /// be submitted.
    pub fn configure(&mut self) -> Result<()> {
        if self.configured {
            return Err(Error::AlreadyConfigured(self.pipeline.name.clone()));
        }
        if self.entries.is_empty() {
            return Err(Error::InvalidInput(format!(
                "pipeline '{}' has no repositories",
                self.pipeline.name
            )));
        }
        self.configured = true;

        for (repo, manager) in self.entries.iter_mut() {
            debug!(
                pipeline = %self.pipeline.name,
                repository = %repo.name(),
                kind = %manager.kind(),
                "Configuring repository"
            );
            manager.add_source_stage(&mut self.pipeline, repo)?;
            manager.add_manual_approval_stage(&mut self.pipeline, repo)?;
            manager.add_build_stage(&mut self.pipeline, repo)?;
            if repo.deployable() {
                manager.add_deploy_stage(&mut self.pipeline, repo)?;
            } else {
                info!(
                    repository = %repo.name(),
                    "Repository is not deployable, skipping deploy stage"
                );
                repo.record_deploy_skipped()?;
            }
        }

        info!(
            pipeline = %self.pipeline.name,
            repositories = self.entries.len(),
            stages = self.pipeline.stages.len(),
            "Pipeline configured"
        );
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn repositories(&self) -> impl Iterator<Item = &RepositoryDescriptor> {
        self.entries.iter().map(|(repo, _)| repo)
    }

    /// Consume the manager, returning the pipeline and its descriptors.
    pub fn into_parts(self) -> (Pipeline, Vec<RepositoryDescriptor>) {
        let repos = self.entries.into_iter().map(|(repo, _)| repo).collect();
        (self.pipeline, repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::pipeline::{Action, StageKind};
    use pipewright_core::resource::{FunctionHandle, GatewayHandle};
    use pipewright_core::{ArtifactRef, ConfigurationState, ResourceKind, StageManagerKind};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ACCOUNT: &str = "123456789012";

    fn config() -> ProvisioningConfig {
        ProvisioningConfig::new(ACCOUNT).with_region("us-east-2")
    }

    fn web_repo() -> RepositoryDescriptor {
        RepositoryDescriptor::builder("web", StageManagerKind::Web)
            .owner("acme")
            .repo_name("site")
            .deployable(true)
            .connection("conn")
            .dependency(BucketHandle::new("acme-site"))
            .build()
            .unwrap()
    }

    fn api_repo(with_gateway: bool) -> RepositoryDescriptor {
        let mut builder = RepositoryDescriptor::builder("api", StageManagerKind::MiddleTier)
            .owner("acme")
            .repo_name("service")
            .deployable(true)
            .connection("conn")
            .dependency(FunctionHandle::in_account("acme-api", "us-east-2", ACCOUNT));
        if with_gateway {
            builder = builder.dependency(GatewayHandle::in_account("a1b2c3", "us-east-2", ACCOUNT));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_web_pipeline_has_four_stages_in_order() {
        let mut manager = PipelineManager::new(&config(), "site-pipeline", None, web_repo());
        manager.configure().unwrap();

        let kinds: Vec<_> = manager
            .pipeline()
            .stages
            .iter()
            .map(|s| s.kind().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Source,
                StageKind::ManualApproval,
                StageKind::Build,
                StageKind::Deploy
            ]
        );
        let repo = manager.repositories().next().unwrap();
        assert_eq!(repo.state(), ConfigurationState::DeployConfigured);
        assert_eq!(repo.build_project_name(), Some("site-pipeline-webBuildProject"));
    }

    #[test]
    fn test_api_pipeline_deploys_function_and_gateway() {
        let mut manager = PipelineManager::new(&config(), "api-pipeline", None, api_repo(true));
        manager.configure().unwrap();

        let pipeline = manager.pipeline();
        assert_eq!(pipeline.stages.len(), 4);
        let stage = pipeline.stage("api_LambdaDeployStage").unwrap();
        match &stage.actions[0] {
            Action::Build(build) => {
                assert!(build.deploys);
                assert!(build.outputs.is_empty());
                assert_eq!(build.project.spec.commands().len(), 3);
                assert_eq!(build.project.policies.len(), 2);
                let resources: Vec<_> = build
                    .project
                    .policies
                    .iter()
                    .flat_map(|p| p.resources.iter())
                    .collect();
                assert_eq!(
                    resources,
                    vec![
                        "arn:aws:lambda:us-east-2:123456789012:function:acme-api",
                        "arn:aws:apigateway:us-east-2::/restapis/a1b2c3"
                    ]
                );
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_api_pipeline_without_gateway_fails_before_deploy() {
        let mut manager = PipelineManager::new(&config(), "api-pipeline", None, api_repo(false));
        let err = manager.configure().unwrap_err();

        assert!(matches!(
            err,
            Error::MissingBuildDependency {
                kind: ResourceKind::ApiGateway,
                ..
            }
        ));
        assert_eq!(manager.pipeline().stages.len(), 3);
    }

    #[test]
    fn test_api_pipeline_without_function_fails_before_deploy() {
        let repo = RepositoryDescriptor::builder("api", StageManagerKind::MiddleTier)
            .owner("acme")
            .repo_name("service")
            .deployable(true)
            .connection("conn")
            .dependency(GatewayHandle::in_account("a1b2c3", "us-east-2", ACCOUNT))
            .build()
            .unwrap();
        let mut manager = PipelineManager::new(&config(), "api-pipeline", None, repo);
        let err = manager.configure().unwrap_err();

        assert!(matches!(
            err,
            Error::MissingBuildDependency {
                kind: ResourceKind::ComputeFunction,
                ..
            }
        ));
        assert_eq!(manager.pipeline().stages.len(), 3);
        assert!(manager.pipeline().stage("api_LambdaDeployStage").is_none());
    }

    #[test]
    fn test_stage_manager_must_match_repository_kind() {
        let result = PipelineManager::with_stage_manager(
            Pipeline::new("api-pipeline", None),
            api_repo(true),
            Box::new(crate::web::WebStageManager::new(config())),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    /// Records deploy calls and otherwise delegates to the web manager.
    struct CountingManager {
        inner: crate::web::WebStageManager,
        deploys: Arc<AtomicUsize>,
    }

    impl StageManager for CountingManager {
        fn kind(&self) -> StageManagerKind {
            self.inner.kind()
        }

        fn add_build_stage(
            &mut self,
            pipeline: &mut Pipeline,
            repo: &mut RepositoryDescriptor,
        ) -> Result<()> {
            self.inner.add_build_stage(pipeline, repo)
        }

        fn add_deploy_stage(
            &mut self,
            pipeline: &mut Pipeline,
            repo: &mut RepositoryDescriptor,
        ) -> Result<()> {
            self.deploys.fetch_add(1, Ordering::SeqCst);
            self.inner.add_deploy_stage(pipeline, repo)
        }

        fn build_artifact(&self) -> Option<&ArtifactRef> {
            self.inner.build_artifact()
        }
    }

    #[test]
    fn test_non_deployable_repository_skips_deploy() {
        let repo = RepositoryDescriptor::builder("docs", StageManagerKind::Web)
            .owner("acme")
            .repo_name("docs")
            .connection("conn")
            .build()
            .unwrap();
        let deploys = Arc::new(AtomicUsize::new(0));
        let counting = CountingManager {
            inner: crate::web::WebStageManager::new(config()),
            deploys: deploys.clone(),
        };
        let mut manager = PipelineManager::with_stage_manager(
            Pipeline::new("docs", None),
            repo,
            Box::new(counting),
        )
        .unwrap();
        manager.configure().unwrap();

        assert_eq!(deploys.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pipeline().stages.len(), 3);
        let (_, repos) = manager.into_parts();
        assert_eq!(repos[0].state(), ConfigurationState::DeploySkipped);
    }

    #[test]
    fn test_configure_twice_is_rejected() {
        let mut manager = PipelineManager::new(&config(), "p", None, web_repo());
        manager.configure().unwrap();
        assert!(matches!(
            manager.configure(),
            Err(Error::AlreadyConfigured(name)) if name == "p"
        ));
        assert_eq!(manager.pipeline().stages.len(), 4);
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let mut manager = PipelineManager::with_repositories(&config(), "p", None, Vec::new());
        assert!(matches!(manager.configure(), Err(Error::InvalidInput(_))));
        assert!(!manager.is_configured());
    }

    #[test]
    fn test_multi_repository_names_are_unique() {
        let mut manager = PipelineManager::with_repositories(
            &config(),
            "platform",
            Some(BucketHandle::new("artifacts")),
            vec![web_repo(), api_repo(true)],
        );
        manager.configure().unwrap();

        let pipeline = manager.pipeline();
        assert_eq!(pipeline.stages.len(), 8);
        let names: HashSet<_> = pipeline.stage_names().into_iter().collect();
        assert_eq!(names.len(), 8);
        assert_eq!(pipeline.stage_names()[4], "api_SourceStage");
        assert!(names.contains("api_ManualApproval"));
        assert_eq!(pipeline.build_projects().count(), 3);
    }
}
