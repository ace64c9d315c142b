//! Periodic heartbeat
//!
//! Each tick gathers the app and node inventory plus the cluster's stable
//! identifier, merges in the engine's extension metrics and posts the
//! engine's metrics under `heartbeat`. A tick is all-or-nothing: any failed
//! step aborts it before anything is sent, and the next attempt happens one
//! interval later.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info_span, warn, Instrument};

use crate::cluster::KUBE_SYSTEM_NAMESPACE;
use crate::engine::Metrics;
use crate::provider::Provider;
use crate::Result;

/// Default time between ticks
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3600);

/// Rack generation reported with every heartbeat
pub const GENERATION: &str = "3";

/// Path segment heartbeats are posted under
pub const HEARTBEAT_PATH: &str = "heartbeat";

/// Merge `overlay` into `base`; on a key collision the overlay wins
pub fn merge(base: Metrics, overlay: Metrics) -> Metrics {
    let mut merged = base;
    merged.extend(overlay);
    merged
}

/// Run one heartbeat and return the merged snapshot
///
/// Only the engine's extension metrics are transmitted; the merged
/// snapshot is logged at debug level.
pub async fn tick(provider: &Provider) -> Result<Metrics> {
    let apps = provider.app_list().await?;
    let nodes = provider.cluster().list_nodes().await?;
    let kube_system = provider
        .cluster()
        .get_namespace(KUBE_SYSTEM_NAMESPACE)
        .await?;

    let identity = provider.identity();
    let mut base = Metrics::new();
    base.insert(
        "id".to_string(),
        json!(kube_system.metadata.uid.unwrap_or_default()),
    );
    base.insert("app_count".to_string(), json!(apps.len()));
    base.insert("generation".to_string(), json!(GENERATION));
    base.insert("instance_count".to_string(), json!(nodes.len()));
    base.insert("provider".to_string(), json!(identity.provider));
    base.insert("version".to_string(), json!(identity.version));

    let extension = provider.engine().heartbeat().await?;
    let snapshot = merge(base, extension.clone());
    debug!(snapshot = %serde_json::Value::Object(snapshot.clone()), "heartbeat snapshot");

    provider.metrics().post(HEARTBEAT_PATH, &extension).await?;
    Ok(snapshot)
}

/// Spawn the heartbeat ticker
///
/// The first tick fires one `period` after the call. Failed ticks are
/// logged and not retried early.
pub fn spawn(provider: Arc<Provider>, period: Duration) -> JoinHandle<()> {
    let span = info_span!(parent: provider.span(), "heartbeat");
    tokio::spawn(
        async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                match tick(&provider).await {
                    Ok(snapshot) => debug!(keys = snapshot.len(), "heartbeat sent"),
                    Err(e) => warn!(error = %e, "heartbeat failed"),
                }
            }
        }
        .instrument(span),
    )
}
