//! Node controller

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::controller::{Action, Controller as KubeController};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use super::{log_reconcile_result, require_rack, Controller, WATCH_TIMEOUT_SECS};
use crate::provider::Provider;
use crate::{Error, Result};

const NAME: &str = "node";

/// Re-check interval for each node
const RESYNC: Duration = Duration::from_secs(300);

/// Tracks readiness of the cluster's nodes
pub struct NodeController {
    api: Api<Node>,
    rack: String,
}

impl NodeController {
    /// Create a controller for the provider's rack
    pub fn new(provider: Arc<Provider>) -> Result<Self> {
        Ok(Self {
            rack: require_rack(&provider, NAME)?,
            api: Api::all(provider.client()),
        })
    }

    /// [`new`](Self::new) as a boxed [`Controller`]
    pub fn boxed(provider: Arc<Provider>) -> Result<Box<dyn Controller>> {
        Ok(Box::new(Self::new(provider)?))
    }
}

#[async_trait]
impl Controller for NodeController {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(self: Box<Self>) {
        info!(rack = %self.rack, "watching nodes");
        KubeController::new(
            self.api,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .run(reconcile, error_policy, Arc::new(()))
        .for_each(log_reconcile_result("Node"))
        .await;
    }
}

async fn reconcile(node: Arc<Node>, _ctx: Arc<()>) -> Result<Action> {
    debug!(node = %node.name_any(), ready = is_ready(&node), "node observed");
    Ok(Action::requeue(RESYNC))
}

fn error_policy(node: Arc<Node>, error: &Error, _ctx: Arc<()>) -> Action {
    warn!(error = %error, node = %node.name_any(), "node reconciliation failed");
    Action::requeue(Duration::from_secs(5))
}

/// Whether the node's Ready condition is True
fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status == "True")
        .unwrap_or(false)
}
