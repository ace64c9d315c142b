//! Engine capability
//!
//! The substrate-specific half of the provider. Orchestration code only ever
//! holds an `Arc<dyn Engine>`; [`GenericEngine`] backs plain Kubernetes
//! clusters and substrates swap in their own implementation through
//! [`Provider::with_engine`](crate::provider::Provider::with_engine).

mod generic;

pub use generic::{GenericEngine, REGISTRY_USER, RESOLVER_SERVICE};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Free-form name to value metrics, as reported in a heartbeat
pub type Metrics = serde_json::Map<String, serde_json::Value>;

/// Options for promoting a release
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePromoteOptions {
    /// Promote in development mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development: Option<bool>,
    /// Promote even if the release is already active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    /// Allow services to scale to zero when idle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle: Option<bool>,
    /// Minimum healthy percentage during rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    /// Maximum percentage during rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    /// Rollout timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

/// The parts of a service manifest the engine needs to address it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name
    pub name: String,
    /// Whether the service is only reachable inside the rack
    #[serde(default)]
    pub internal: bool,
    /// Port the service listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Custom domains routed to the service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

/// Substrate-specific provider operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Engine: Send + Sync {
    /// Whether the app is currently idled
    async fn app_idles(&self, app: &str) -> Result<bool>;

    /// Short status string for an app
    async fn app_status(&self, app: &str) -> Result<String>;

    /// Extension metrics merged into the heartbeat
    async fn heartbeat(&self) -> Result<Metrics>;

    /// Forward one log line for an app stream
    async fn log(&self, app: &str, stream: &str, ts: DateTime<Utc>, message: &str) -> Result<()>;

    /// Make a release the active one
    async fn release_promote(
        &self,
        app: &str,
        release: &str,
        opts: ReleasePromoteOptions,
    ) -> Result<()>;

    /// Push credentials for the app's image repository, as (user, password)
    async fn repository_auth(&self, app: &str) -> Result<(String, String)>;

    /// Repository host for the app, and whether callers must route by
    /// virtual-host header
    async fn repository_host(&self, app: &str) -> Result<(String, bool)>;

    /// Address callers should use to resolve the rack's own domains
    async fn resolver(&self) -> Result<String>;

    /// Reachable host name for one service of an app
    fn service_host(&self, app: &str, service: &ServiceDescriptor) -> String;

    /// Externally reachable host name of the rack
    fn system_host(&self) -> String;

    /// Short status string for the rack itself
    async fn system_status(&self) -> Result<String>;
}
