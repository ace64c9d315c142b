//! Typed cluster reads used by provider construction and the heartbeat

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::api::{Api, ListParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Namespace holding the cluster's system components
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Trait abstracting the cluster reads the provider needs
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a namespace, failing with [`Error::NotFound`] if absent
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    /// List namespaces matching a label selector
    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>>;

    /// List all cluster nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;
}

/// Real cluster client backed by a kube [`Client`]
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name)
            .await?
            .ok_or_else(|| Error::not_found("namespace", name))
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(list.items)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }
}
