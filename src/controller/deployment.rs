//! Deployment controller
//!
//! Reconciles the rack's Deployments and reports rollouts that exceed their
//! progress deadline to the owning app's `system/k8s/deployment/<name>`
//! stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::{Action, Controller as KubeController};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, ResourceExt};
use tracing::{info, warn};

use super::{log_reconcile_result, require_rack, timestamp, Controller, LogLine, Seen};
use super::WATCH_TIMEOUT_SECS;
use crate::provider::{Identity, Provider, APP_LABEL};
use crate::{Error, Result};

const NAME: &str = "deployment";

const PROGRESSING: &str = "Progressing";
const DEADLINE_EXCEEDED: &str = "ProgressDeadlineExceeded";

/// Watches the rack's Deployments for stalled rollouts
pub struct DeploymentController {
    provider: Arc<Provider>,
    api: Api<Deployment>,
    selector: String,
}

impl DeploymentController {
    /// Create a controller for the provider's rack
    pub fn new(provider: Arc<Provider>) -> Result<Self> {
        require_rack(&provider, NAME)?;
        Ok(Self {
            api: Api::all(provider.client()),
            selector: provider.identity().rack_selector(),
            provider,
        })
    }

    /// [`new`](Self::new) as a boxed [`Controller`]
    pub fn boxed(provider: Arc<Provider>) -> Result<Box<dyn Controller>> {
        Ok(Box::new(Self::new(provider)?))
    }
}

struct Context {
    provider: Arc<Provider>,
    seen: Seen,
}

#[async_trait]
impl Controller for DeploymentController {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(self: Box<Self>) {
        info!(selector = %self.selector, "watching deployments");
        let ctx = Arc::new(Context {
            provider: self.provider,
            seen: Seen::default(),
        });

        KubeController::new(
            self.api,
            WatcherConfig::default()
                .labels(&self.selector)
                .timeout(WATCH_TIMEOUT_SECS),
        )
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Deployment"))
        .await;
    }
}

async fn reconcile(deployment: Arc<Deployment>, ctx: Arc<Context>) -> Result<Action> {
    let key = deployment.uid().unwrap_or_else(|| deployment.name_any());
    let Some(line) = deadline_exceeded(ctx.provider.identity(), &deployment) else {
        // Healthy again, or gone: a later stall is reported afresh
        ctx.seen.forget(&key);
        return Ok(Action::await_change());
    };

    if ctx.seen.changed(&key, &line.ts.to_rfc3339()) {
        line.send(ctx.provider.engine()).await;
    }
    Ok(Action::await_change())
}

fn error_policy(deployment: Arc<Deployment>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        error = %error,
        deployment = %deployment.name_any(),
        "deployment reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}

/// Log line for a rollout stuck past its deadline, if this one is
fn deadline_exceeded(identity: &Identity, deployment: &Deployment) -> Option<LogLine> {
    let app = deployment
        .labels()
        .get(APP_LABEL)
        .cloned()
        .or_else(|| {
            let ns = deployment.namespace()?;
            identity.app_for_namespace(&ns).map(str::to_string)
        })?;

    let condition = deployment
        .status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == PROGRESSING && c.reason.as_deref() == Some(DEADLINE_EXCEEDED))?;

    let ts = condition
        .last_update_time
        .as_ref()
        .and_then(timestamp)
        .unwrap_or_else(Utc::now);

    let detail = condition
        .message
        .clone()
        .unwrap_or_else(|| "rollout did not progress before its deadline".to_string());

    Some(LogLine {
        app,
        stream: format!("system/k8s/deployment/{}", deployment.name_any()),
        ts,
        message: format!("{}: {}", DEADLINE_EXCEEDED, detail),
    })
}
