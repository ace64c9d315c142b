//! Plain Kubernetes engine

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::Client;
use tracing::info;

use super::{Engine, Metrics, ReleasePromoteOptions, ServiceDescriptor};
use crate::provider::Identity;
use crate::{Error, Result};

/// Service in the rack namespace that answers DNS for rack domains
pub const RESOLVER_SERVICE: &str = "resolver";

/// User name for registry pushes
pub const REGISTRY_USER: &str = "rack";

const STATUS_RUNNING: &str = "running";

/// Engine for clusters with no substrate-specific integration
#[derive(Clone)]
pub struct GenericEngine {
    client: Client,
    identity: Arc<Identity>,
}

impl GenericEngine {
    /// Create a generic engine for the given rack
    pub fn new(client: Client, identity: Arc<Identity>) -> Self {
        Self { client, identity }
    }
}

#[async_trait]
impl Engine for GenericEngine {
    async fn app_idles(&self, _app: &str) -> Result<bool> {
        Ok(false)
    }

    async fn app_status(&self, _app: &str) -> Result<String> {
        Ok(STATUS_RUNNING.to_string())
    }

    async fn heartbeat(&self) -> Result<Metrics> {
        Ok(Metrics::new())
    }

    async fn log(&self, app: &str, stream: &str, ts: DateTime<Utc>, message: &str) -> Result<()> {
        info!(
            target: "rack_provider::app_log",
            rack = %self.identity.name,
            app,
            stream,
            ts = %ts.to_rfc3339(),
            "{}",
            message
        );
        Ok(())
    }

    async fn release_promote(
        &self,
        app: &str,
        release: &str,
        _opts: ReleasePromoteOptions,
    ) -> Result<()> {
        Err(Error::engine(format!(
            "release promotion is not supported by the generic engine (app {}, release {})",
            app, release
        )))
    }

    async fn repository_auth(&self, _app: &str) -> Result<(String, String)> {
        Ok((REGISTRY_USER.to_string(), self.identity.password.clone()))
    }

    async fn repository_host(&self, app: &str) -> Result<(String, bool)> {
        Ok((format!("registry.{}/{}", self.identity.domain, app), true))
    }

    async fn resolver(&self) -> Result<String> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.identity.namespace);
        let service = api
            .get_opt(RESOLVER_SERVICE)
            .await?
            .ok_or_else(|| Error::not_found("service", RESOLVER_SERVICE))?;

        cluster_ip(&service)
            .ok_or_else(|| Error::engine(format!("{} service has no cluster IP", RESOLVER_SERVICE)))
    }

    fn service_host(&self, app: &str, service: &ServiceDescriptor) -> String {
        format!("{}.{}.{}", service.name, app, self.identity.domain)
    }

    fn system_host(&self) -> String {
        self.identity.domain.clone()
    }

    async fn system_status(&self) -> Result<String> {
        Ok(STATUS_RUNNING.to_string())
    }
}

fn cluster_ip(service: &Service) -> Option<String> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.clone())
        .filter(|ip| !ip.is_empty() && ip != "None")
}
