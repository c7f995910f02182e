//! Build dependency handles.
//!
//! A build dependency is a cloud resource provisioned by an earlier stack that
//! a deploy stage has to target. Handles are plain values; the registry keys
//! them by [`ResourceKind`] so stage managers can look them up without any
//! runtime type inspection.

use serde::{Deserialize, Serialize};

/// Kind of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    StorageBucket,
    ComputeFunction,
    ApiGateway,
    UserPool,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::StorageBucket => write!(f, "storage bucket"),
            ResourceKind::ComputeFunction => write!(f, "compute function"),
            ResourceKind::ApiGateway => write!(f, "API gateway"),
            ResourceKind::UserPool => write!(f, "user pool"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bucket" | "storage_bucket" | "storage-bucket" => Ok(ResourceKind::StorageBucket),
            "function" | "compute_function" | "compute-function" => {
                Ok(ResourceKind::ComputeFunction)
            }
            "gateway" | "api_gateway" | "api-gateway" => Ok(ResourceKind::ApiGateway),
            "user-pool" | "user_pool" => Ok(ResourceKind::UserPool),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// A storage bucket (static website content, pipeline artifacts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHandle {
    pub name: String,
    pub arn: String,
}

impl BucketHandle {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let arn = format!("arn:aws:s3:::{}", name);
        Self { name, arn }
    }
}

/// A compute function that serves the middle tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHandle {
    pub name: String,
    pub arn: String,
}

impl FunctionHandle {
    pub fn in_account(name: impl Into<String>, region: &str, account: &str) -> Self {
        let name = name.into();
        let arn = format!("arn:aws:lambda:{}:{}:function:{}", region, account, name);
        Self { name, arn }
    }
}

/// A REST API gateway fronting a compute function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayHandle {
    pub rest_api_id: String,
    /// Management ARN, the target of model updates.
    pub arn: String,
    /// Invocation ARN covering every stage, method and path.
    pub execute_api_arn: String,
}

impl GatewayHandle {
    pub fn in_account(rest_api_id: impl Into<String>, region: &str, account: &str) -> Self {
        let rest_api_id = rest_api_id.into();
        Self {
            arn: format!("arn:aws:apigateway:{}::/restapis/{}", region, rest_api_id),
            execute_api_arn: format!(
                "arn:aws:execute-api:{}:{}:{}/*/*/*",
                region, account, rest_api_id
            ),
            rest_api_id,
        }
    }
}

/// A user pool whose ARN is baked into the middle tier build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolHandle {
    pub id: String,
    pub arn: String,
}

impl UserPoolHandle {
    pub fn in_account(id: impl Into<String>, region: &str, account: &str) -> Self {
        let id = id.into();
        let arn = format!("arn:aws:cognito-idp:{}:{}:userpool/{}", region, account, id);
        Self { id, arn }
    }
}

/// A provisioned resource handle tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildDependency {
    StorageBucket(BucketHandle),
    ComputeFunction(FunctionHandle),
    ApiGateway(GatewayHandle),
    UserPool(UserPoolHandle),
}

impl BuildDependency {
    pub fn kind(&self) -> ResourceKind {
        match self {
            BuildDependency::StorageBucket(_) => ResourceKind::StorageBucket,
            BuildDependency::ComputeFunction(_) => ResourceKind::ComputeFunction,
            BuildDependency::ApiGateway(_) => ResourceKind::ApiGateway,
            BuildDependency::UserPool(_) => ResourceKind::UserPool,
        }
    }
}

impl From<BucketHandle> for BuildDependency {
    fn from(handle: BucketHandle) -> Self {
        BuildDependency::StorageBucket(handle)
    }
}

impl From<FunctionHandle> for BuildDependency {
    fn from(handle: FunctionHandle) -> Self {
        BuildDependency::ComputeFunction(handle)
    }
}

impl From<GatewayHandle> for BuildDependency {
    fn from(handle: GatewayHandle) -> Self {
        BuildDependency::ApiGateway(handle)
    }
}

impl From<UserPoolHandle> for BuildDependency {
    fn from(handle: UserPoolHandle) -> Self {
        BuildDependency::UserPool(handle)
    }
}

/// A concrete handle type that can be pulled out of a [`BuildDependency`].
pub trait ResourceHandle: Sized {
    const KIND: ResourceKind;

    fn from_dependency(dependency: &BuildDependency) -> Option<&Self>;
}

impl ResourceHandle for BucketHandle {
    const KIND: ResourceKind = ResourceKind::StorageBucket;

    fn from_dependency(dependency: &BuildDependency) -> Option<&Self> {
        match dependency {
            BuildDependency::StorageBucket(handle) => Some(handle),
            _ => None,
        }
    }
}

impl ResourceHandle for FunctionHandle {
    const KIND: ResourceKind = ResourceKind::ComputeFunction;

    fn from_dependency(dependency: &BuildDependency) -> Option<&Self> {
        match dependency {
            BuildDependency::ComputeFunction(handle) => Some(handle),
            _ => None,
        }
    }
}

impl ResourceHandle for GatewayHandle {
    const KIND: ResourceKind = ResourceKind::ApiGateway;

    fn from_dependency(dependency: &BuildDependency) -> Option<&Self> {
        match dependency {
            BuildDependency::ApiGateway(handle) => Some(handle),
            _ => None,
        }
    }
}

impl ResourceHandle for UserPoolHandle {
    const KIND: ResourceKind = ResourceKind::UserPool;

    fn from_dependency(dependency: &BuildDependency) -> Option<&Self> {
        match dependency {
            BuildDependency::UserPool(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Ordered build dependencies of one repository, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyRegistry {
    entries: Vec<BuildDependency>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dependency. A second dependency of an already registered kind
    /// is handed back unchanged.
    pub fn register(&mut self, dependency: BuildDependency) -> Result<(), BuildDependency> {
        if self.contains(dependency.kind()) {
            return Err(dependency);
        }
        self.entries.push(dependency);
        Ok(())
    }

    /// First dependency of the given kind, in registration order.
    pub fn get(&self, kind: ResourceKind) -> Option<&BuildDependency> {
        self.entries.iter().find(|d| d.kind() == kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.get(kind).is_some()
    }

    /// Typed lookup.
    pub fn handle<H: ResourceHandle>(&self) -> Option<&H> {
        self.get(H::KIND).and_then(H::from_dependency)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildDependency> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
