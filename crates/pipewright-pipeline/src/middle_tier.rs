//! Stage manager for the middle tier service.

use pipewright_config::ProvisioningConfig;
use pipewright_core::pipeline::{
    Action, BuildAction, BuildPhase, BuildProject, BuildSpec, Pipeline, PolicyStatement, Stage,
};
use pipewright_core::resource::{FunctionHandle, GatewayHandle, UserPoolHandle};
use pipewright_core::{
    ArtifactRef, ConfigurationState, RepositoryDescriptor, Result, StageManagerKind,
};
use tracing::info;

use crate::stage_manager::{StageManager, append_build_stage};

/// Directory the packaging script writes the deployable bundle to.
pub const PACKAGE_OUTPUT_DIR: &str = "dist/";
/// Statement id of the gateway's invoke permission on the function.
pub const INVOKE_STATEMENT_ID: &str = "ApiGatewayInvokeAllEndpoints";

/// Packages a service with an interpreter toolchain, then deploys it by
/// updating a compute function and overwriting its gateway's routing model.
pub struct MiddleTierStageManager {
    config: ProvisioningConfig,
    build_artifact: Option<ArtifactRef>,
}

impl MiddleTierStageManager {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            config,
            build_artifact: None,
        }
    }

    /// Build spec for packaging. ARNs of the function and user pool, when
    /// present, are passed to the packaging script.
    pub fn build_spec(&self, repo: &RepositoryDescriptor) -> BuildSpec {
        let mut package = "python3 app.py --mode build".to_string();
        if let Some(function) = repo.dependency::<FunctionHandle>() {
            package.push_str(&format!(" --lambda-arn {}", function.arn));
        }
        if let Some(pool) = repo.dependency::<UserPoolHandle>() {
            package.push_str(&format!(" --cognito-arn {}", pool.arn));
        }

        BuildSpec::new()
            .install(
                BuildPhase::commands([
                    "echo Installing some dependencies...".to_string(),
                    "pip3 install -r requirements.txt".to_string(),
                    // Placeholder values so the app can be imported at build time
                    format!("export ENV='{}'", self.config.environment),
                    "export BUILD='true'".to_string(),
                    "export POSTGRES_URI='localhost'".to_string(),
                    format!("export POSTGRES_DB='{}'", self.config.environment),
                    "export POSTGRES_USER='admin'".to_string(),
                    "export POSTGRES_PASS='password'".to_string(),
                    "echo Finished installing dependencies...".to_string(),
                ])
                .with_runtime("python", "3.9"),
            )
            .pre_build(BuildPhase::commands(["echo Running tests..."]))
            .build(BuildPhase::commands([
                "echo Building the application...".to_string(),
                package,
                "echo Finished building the application...".to_string(),
            ]))
            .artifacts(PACKAGE_OUTPUT_DIR, &["**/*"])
    }

    /// The deployment job: exactly three calls against the function and gateway.
    pub fn deploy_spec(function: &FunctionHandle, gateway: &GatewayHandle) -> BuildSpec {
        BuildSpec::new().build(BuildPhase::commands([
            format!(
                "aws lambda update-function-code --function-name {} --zip-file fileb://$(ls *.zip | head -n 1)",
                function.name
            ),
            format!(
                "aws apigateway put-rest-api --cli-binary-format raw-in-base64-out --rest-api-id {} --mode overwrite --body \"file://$(ls *api.json)\"",
                gateway.rest_api_id
            ),
            format!(
                "aws lambda add-permission --function-name {} --statement-id \"{}\" --action \"lambda:InvokeFunction\" --principal \"apigateway.amazonaws.com\" --source-arn \"{}\" --output text",
                function.name, INVOKE_STATEMENT_ID, gateway.execute_api_arn
            ),
        ]))
    }

    /// Permissions of the deployment job, scoped to the two targets only.
    pub fn deploy_policies(
        function: &FunctionHandle,
        gateway: &GatewayHandle,
    ) -> Vec<PolicyStatement> {
        vec![
            PolicyStatement::new(
                ["lambda:UpdateFunctionCode", "lambda:AddPermission"],
                [function.arn.as_str()],
            ),
            PolicyStatement::new(
                ["apigateway:PutRestApi", "apigateway:PUT"],
                [gateway.arn.as_str()],
            ),
        ]
    }
}

impl StageManager for MiddleTierStageManager {
    fn kind(&self) -> StageManagerKind {
        StageManagerKind::MiddleTier
    }

    fn add_build_stage(
        &mut self,
        pipeline: &mut Pipeline,
        repo: &mut RepositoryDescriptor,
    ) -> Result<()> {
        let spec = self.build_spec(repo);
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
        let function = repo.require_dependency::<FunctionHandle>()?.clone();
        let gateway = repo.require_dependency::<GatewayHandle>()?.clone();
        let input = self
            .build_artifact
            .clone()
            .ok_or_else(|| repo.missing("build_artifact"))?;

        let construct_id = format!("{}LambdaDeployProject", repo.name());
        let project = BuildProject {
            project_name: format!("{}-{}", pipeline.name, construct_id),
            construct_id,
            build_image: self.config.build_image.clone(),
            spec: Self::deploy_spec(&function, &gateway),
            policies: Self::deploy_policies(&function, &gateway),
        };

        let stage_name = format!("{}_LambdaDeployStage", repo.name());
        let action = BuildAction {
            name: format!("{}_LambdaDeploy", repo.name()),
            project,
            input,
            outputs: Vec::new(),
            deploys: true,
        };
        info!(
            repository = %repo.name(),
            function = %function.name,
            gateway = %gateway.rest_api_id,
            "Adding function deploy stage"
        );
        pipeline.add_stage(Stage::single(&stage_name, Action::Build(action)))?;

        repo.record_deploy()
    }

    fn build_artifact(&self) -> Option<&ArtifactRef> {
        self.build_artifact.as_ref()
    }
}
