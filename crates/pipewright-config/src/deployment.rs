//! Deployment file parsing.
//!
//! A deployment file declares the provisioning settings, the pipelines and the
//! repositories each pipeline builds, along with the handles of resources
//! created by earlier stacks:
//!
//! ```kdl
//! account "123456789012"
//! region "us-east-2"
//! connection "arn:aws:codestar-connections:us-east-2:123456789012:connection/abc"
//!
//! pipeline "WebPipeline" {
//!     artifact-bucket "web-pipeline-artifacts"
//!     repository "web" kind="web" owner="acme" repo="site" deployable=#true {
//!         bucket "acme-site"
//!     }
//! }
//! ```

use crate::system::{NotificationConfig, ProvisioningConfig};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use pipewright_core::resource::{
    BucketHandle, BuildDependency, FunctionHandle, GatewayHandle, ResourceKind, UserPoolHandle,
};
use pipewright_core::{RepositoryDescriptor, StageManagerKind};
use std::collections::HashSet;
use std::path::PathBuf;

/// A parsed deployment file.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub provisioning: ProvisioningConfig,
    pub notifications: NotificationConfig,
    /// Local secrets file, if declared.
    pub secrets_file: Option<PathBuf>,
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub name: String,
    pub artifact_bucket: Option<String>,
    pub repositories: Vec<RepositoryConfig>,
}

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub name: String,
    pub kind: StageManagerKind,
    pub owner: String,
    pub repo_name: String,
    pub branch: Option<String>,
    pub deployable: bool,
    pub connection: Option<String>,
    pub dependencies: Vec<DependencyConfig>,
}

/// A resource handle declared in the file. ARNs are derived from the
/// provisioning settings unless given explicitly.
#[derive(Debug, Clone)]
pub struct DependencyConfig {
    pub kind: ResourceKind,
    pub id: String,
    pub arn: Option<String>,
    /// Invoke ARN of a gateway. Without it, the region comes from `arn`.
    pub execute_arn: Option<String>,
}

impl DependencyConfig {
    pub fn resolve(&self, provisioning: &ProvisioningConfig) -> BuildDependency {
        let region = provisioning.region.as_str();
        let account = provisioning.account_id.as_str();
        let mut dependency: BuildDependency = match self.kind {
            ResourceKind::StorageBucket => BucketHandle::new(&self.id).into(),
            ResourceKind::ComputeFunction => {
                FunctionHandle::in_account(&self.id, region, account).into()
            }
            ResourceKind::ApiGateway => {
                let region = self.arn.as_deref().and_then(arn_region).unwrap_or(region);
                let mut gateway = GatewayHandle::in_account(&self.id, region, account);
                if let Some(execute_arn) = &self.execute_arn {
                    gateway.execute_api_arn = execute_arn.clone();
                }
                gateway.into()
            }
            ResourceKind::UserPool => UserPoolHandle::in_account(&self.id, region, account).into(),
        };
        if let Some(arn) = &self.arn {
            match &mut dependency {
                BuildDependency::StorageBucket(h) => h.arn = arn.clone(),
                BuildDependency::ComputeFunction(h) => h.arn = arn.clone(),
                BuildDependency::ApiGateway(h) => h.arn = arn.clone(),
                BuildDependency::UserPool(h) => h.arn = arn.clone(),
            }
        }
        dependency
    }
}

/// Region field of an ARN, if present.
fn arn_region(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|r| !r.is_empty())
}

impl RepositoryConfig {
    /// Build the descriptor, with its dependencies resolved.
    pub fn to_descriptor(
        &self,
        provisioning: &ProvisioningConfig,
    ) -> ConfigResult<RepositoryDescriptor> {
        let connection = self
            .connection
            .as_ref()
            .or(provisioning.connection_ref.as_ref())
            .ok_or_else(|| {
                ConfigError::MissingField(format!("connection for repository '{}'", self.name))
            })?;

        let mut builder = RepositoryDescriptor::builder(&self.name, self.kind)
            .owner(&self.owner)
            .repo_name(&self.repo_name)
            .deployable(self.deployable)
            .connection(connection);
        if let Some(branch) = &self.branch {
            builder = builder.branch(branch);
        }
        for dependency in &self.dependencies {
            builder = builder.dependency(dependency.resolve(provisioning));
        }
        Ok(builder.build()?)
    }
}

impl PipelineConfig {
    pub fn descriptors(
        &self,
        provisioning: &ProvisioningConfig,
    ) -> ConfigResult<Vec<RepositoryDescriptor>> {
        self.repositories
            .iter()
            .map(|r| r.to_descriptor(provisioning))
            .collect()
    }

    pub fn artifact_bucket(&self) -> Option<BucketHandle> {
        self.artifact_bucket.as_deref().map(BucketHandle::new)
    }
}

/// Parse a deployment file from KDL text.
pub fn parse_deployment(kdl: &str) -> ConfigResult<DeploymentConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut account = None;
    let mut region = None;
    let mut connection = None;
    let mut build_image = None;
    let mut environment = None;
    let mut secrets_file = None;
    let mut notifications = NotificationConfig::default();
    let mut pipelines = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "account" => account = get_first_string_arg(node),
            "region" => region = get_first_string_arg(node),
            "connection" => connection = get_first_string_arg(node),
            "build-image" => build_image = get_first_string_arg(node),
            "environment" => environment = get_first_string_arg(node),
            "secrets-file" => secrets_file = get_first_string_arg(node).map(PathBuf::from),
            "notifications" => parse_notifications(node, &mut notifications),
            "pipeline" => pipelines.push(parse_pipeline(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    let account = account.ok_or_else(|| ConfigError::MissingField("account".to_string()))?;
    let mut provisioning = ProvisioningConfig::new(account);
    if let Some(region) = region {
        provisioning = provisioning.with_region(region);
    }
    if let Some(connection) = connection {
        provisioning = provisioning.with_connection(connection);
    }
    if let Some(image) = build_image {
        provisioning = provisioning.with_build_image(image);
    }
    if let Some(environment) = environment {
        provisioning = provisioning.with_environment(environment);
    }

    if pipelines.is_empty() {
        return Err(ConfigError::MissingField("pipeline".to_string()));
    }

    // Pipeline names and repository names are both used as identifier seeds
    let mut pipeline_names = HashSet::new();
    let mut repository_names = HashSet::new();
    for pipeline in &pipelines {
        if !pipeline_names.insert(pipeline.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("pipeline '{}'", pipeline.name)));
        }
        for repo in &pipeline.repositories {
            if !repository_names.insert(repo.name.as_str()) {
                return Err(ConfigError::Duplicate(format!("repository '{}'", repo.name)));
            }
            if repo.connection.is_none() && provisioning.connection_ref.is_none() {
                return Err(ConfigError::MissingField(format!(
                    "connection for repository '{}'",
                    repo.name
                )));
            }
        }
    }

    Ok(DeploymentConfig {
        provisioning,
        notifications,
        secrets_file,
        pipelines,
    })
}

fn parse_notifications(node: &KdlNode, notifications: &mut NotificationConfig) {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let Some(value) = get_first_string_arg(child) else {
                continue;
            };
            match child.name().value() {
                "status-function" => notifications.status_function = value,
                "chat-function" => notifications.chat_function = value,
                "context" => notifications.context = value,
                _ => {}
            }
        }
    }
}

fn parse_pipeline(node: &KdlNode) -> ConfigResult<PipelineConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;

    let mut artifact_bucket = None;
    let mut repositories = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "artifact-bucket" => artifact_bucket = get_first_string_arg(child),
                "repository" => repositories.push(parse_repository(child)?),
                _ => {}
            }
        }
    }

    if repositories.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "repository for pipeline '{}'",
            name
        )));
    }

    Ok(PipelineConfig {
        name,
        artifact_bucket,
        repositories,
    })
}

fn parse_repository(node: &KdlNode) -> ConfigResult<RepositoryConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("repository name".to_string()))?;

    let kind = get_string_prop(node, "kind")
        .ok_or_else(|| ConfigError::MissingField(format!("kind for repository '{}'", name)))?
        .parse::<StageManagerKind>()
        .map_err(|message| ConfigError::InvalidValue {
            field: format!("kind of repository '{}'", name),
            message,
        })?;
    let owner = get_string_prop(node, "owner")
        .ok_or_else(|| ConfigError::MissingField(format!("owner for repository '{}'", name)))?;
    let repo_name = get_string_prop(node, "repo")
        .ok_or_else(|| ConfigError::MissingField(format!("repo for repository '{}'", name)))?;

    let mut dependencies = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let kind = child
                .name()
                .value()
                .parse::<ResourceKind>()
                .map_err(|message| ConfigError::InvalidValue {
                    field: format!("dependency of repository '{}'", name),
                    message,
                })?;
            let id = get_first_string_arg(child).ok_or_else(|| {
                ConfigError::MissingField(format!(
                    "{} identifier for repository '{}'",
                    kind, name
                ))
            })?;
            let execute_arn = get_string_prop(child, "execute-arn");
            if execute_arn.is_some() && kind != ResourceKind::ApiGateway {
                return Err(ConfigError::InvalidValue {
                    field: format!("{} of repository '{}'", kind, name),
                    message: "execute-arn applies to gateways only".to_string(),
                });
            }
            dependencies.push(DependencyConfig {
                kind,
                id,
                arn: get_string_prop(child, "arn"),
                execute_arn,
            });
        }
    }

    Ok(RepositoryConfig {
        kind,
        owner,
        repo_name,
        branch: get_string_prop(node, "branch"),
        deployable: get_bool_prop(node, "deployable").unwrap_or(false),
        connection: get_string_prop(node, "connection"),
        dependencies,
        name,
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::resource::ResourceHandle;

    const DEPLOYMENT: &str = r#"
        account "123456789012"
        region "us-east-2"
        connection "arn:aws:codestar-connections:us-east-2:123456789012:connection/abc"
        environment "staging"

        notifications {
            chat-function "chat-relay"
        }

        pipeline "WebPipeline" {
            artifact-bucket "web-artifacts"
            repository "web" kind="web" owner="acme" repo="site" deployable=#true {
                bucket "acme-site"
            }
        }

        pipeline "ApiPipeline" {
            repository "api" kind="middle-tier" owner="acme" repo="service" branch="develop" deployable=#true {
                function "acme-api"
                gateway "a1b2c3" arn="arn:aws:apigateway:us-east-2::/restapis/a1b2c3"
                user-pool "us-east-2_pool"
            }
        }
    "#;

    #[test]
    fn test_parse_deployment() {
        let config = parse_deployment(DEPLOYMENT).unwrap();

        assert_eq!(config.provisioning.account_id, "123456789012");
        assert_eq!(config.provisioning.region, "us-east-2");
        assert_eq!(config.provisioning.environment, "staging");
        assert_eq!(config.provisioning.build_image, "aws/codebuild/standard:7.0");
        assert_eq!(config.notifications.chat_function, "chat-relay");
        assert_eq!(config.notifications.status_function, "github-status");

        assert_eq!(config.pipelines.len(), 2);
        let web = &config.pipelines[0];
        assert_eq!(web.name, "WebPipeline");
        assert_eq!(web.artifact_bucket.as_deref(), Some("web-artifacts"));
        assert_eq!(web.repositories[0].kind, StageManagerKind::Web);
        assert!(web.repositories[0].deployable);

        let api = &config.pipelines[1].repositories[0];
        assert_eq!(api.kind, StageManagerKind::MiddleTier);
        assert_eq!(api.branch.as_deref(), Some("develop"));
        assert_eq!(api.dependencies.len(), 3);
    }

    #[test]
    fn test_descriptors_resolve_handles() {
        let config = parse_deployment(DEPLOYMENT).unwrap();
        let repos = config.pipelines[1]
            .descriptors(&config.provisioning)
            .unwrap();

        let api = &repos[0];
        assert_eq!(api.branch(), "develop");
        assert_eq!(
            api.source_connection_ref(),
            "arn:aws:codestar-connections:us-east-2:123456789012:connection/abc"
        );
        let function = api.dependency::<FunctionHandle>().unwrap();
        assert_eq!(
            function.arn,
            "arn:aws:lambda:us-east-2:123456789012:function:acme-api"
        );
        assert!(api.dependency::<UserPoolHandle>().is_some());
        assert_eq!(GatewayHandle::KIND, ResourceKind::ApiGateway);
    }

    #[test]
    fn test_missing_account() {
        let result = parse_deployment(
            r#"
            pipeline "p" {
                repository "web" kind="web" owner="a" repo="b" connection="c"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::MissingField(f)) if f == "account"));
    }

    #[test]
    fn test_duplicate_repository_names() {
        let result = parse_deployment(
            r#"
            account "1"
            connection "c"
            pipeline "a" {
                repository "web" kind="web" owner="o" repo="r"
            }
            pipeline "b" {
                repository "web" kind="web" owner="o" repo="r2"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_unknown_kind() {
        let result = parse_deployment(
            r#"
            account "1"
            connection "c"
            pipeline "a" {
                repository "db" kind="database" owner="o" repo="r"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_repository_without_connection() {
        let result = parse_deployment(
            r#"
            account "1"
            pipeline "a" {
                repository "web" kind="web" owner="o" repo="r"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_duplicate_dependency_kind_surfaces_descriptor_error() {
        let config = parse_deployment(
            r#"
            account "1"
            connection "c"
            pipeline "a" {
                repository "web" kind="web" owner="o" repo="r" {
                    bucket "one"
                    bucket "two"
                }
            }
            "#,
        )
        .unwrap();
        let result = config.pipelines[0].descriptors(&config.provisioning);
        assert!(matches!(result, Err(ConfigError::Descriptor(_))));
    }

    #[test]
    fn test_gateway_override_keeps_invoke_arn_consistent() {
        let provisioning = ProvisioningConfig::new("123456789012").with_region("us-east-2");
        let gateway = |arn: Option<&str>, execute_arn: Option<&str>| {
            let dependency = DependencyConfig {
                kind: ResourceKind::ApiGateway,
                id: "a1b2c3".to_string(),
                arn: arn.map(str::to_string),
                execute_arn: execute_arn.map(str::to_string),
            };
            match dependency.resolve(&provisioning) {
                BuildDependency::ApiGateway(h) => h,
                other => panic!("unexpected dependency {:?}", other),
            }
        };

        let moved = gateway(Some("arn:aws:apigateway:eu-west-1::/restapis/a1b2c3"), None);
        assert_eq!(moved.arn, "arn:aws:apigateway:eu-west-1::/restapis/a1b2c3");
        assert_eq!(
            moved.execute_api_arn,
            "arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/*/*/*"
        );

        let explicit = gateway(
            Some("arn:aws:apigateway:eu-west-1::/restapis/a1b2c3"),
            Some("arn:aws:execute-api:eu-west-1:999999999999:a1b2c3/prod/*/*"),
        );
        assert_eq!(
            explicit.execute_api_arn,
            "arn:aws:execute-api:eu-west-1:999999999999:a1b2c3/prod/*/*"
        );

        let derived = gateway(None, None);
        assert_eq!(
            derived.execute_api_arn,
            "arn:aws:execute-api:us-east-2:123456789012:a1b2c3/*/*/*"
        );
    }

    #[test]
    fn test_execute_arn_only_on_gateways() {
        let result = parse_deployment(
            r#"
            account "1"
            pipeline "a" {
                repository "api" kind="middle-tier" owner="o" repo="r" {
                    function "f" execute-arn="arn:aws:execute-api:us-east-2:1:x/*/*/*"
                }
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
