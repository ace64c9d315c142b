//! Event controller
//!
//! Forwards cluster events raised in the rack's app namespaces to
//! `system/k8s/<kind>/<name>`. Events older than the controller are
//! skipped so a restart does not replay history.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::{Api, ResourceExt};
use tracing::{info, warn};

use super::{require_rack, timestamp, Controller, LogLine, WATCH_TIMEOUT_SECS};
use crate::provider::{Identity, Provider};
use crate::Result;

const NAME: &str = "event";

/// Watches cluster events for the rack's apps
pub struct EventController {
    provider: Arc<Provider>,
    api: Api<Event>,
    started: DateTime<Utc>,
}

impl EventController {
    /// Create a controller for the provider's rack
    pub fn new(provider: Arc<Provider>) -> Result<Self> {
        require_rack(&provider, NAME)?;
        Ok(Self {
            api: Api::all(provider.client()),
            started: Utc::now(),
            provider,
        })
    }

    /// [`new`](Self::new) as a boxed [`Controller`]
    pub fn boxed(provider: Arc<Provider>) -> Result<Box<dyn Controller>> {
        Ok(Box::new(Self::new(provider)?))
    }
}

#[async_trait]
impl Controller for EventController {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(self: Box<Self>) {
        info!(since = %self.started.to_rfc3339(), "watching events");
        let identity = self.provider.identity_handle();
        let engine = self.provider.engine_handle();

        let mut events = watcher::watcher(
            self.api,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .default_backoff()
        .applied_objects()
        .boxed();

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if let Some(line) = log_line(&identity, self.started, &event) {
                        line.send(engine.as_ref()).await;
                    }
                }
                Err(e) => warn!(error = %e, "event watch error"),
            }
        }
    }
}

/// Log line for an app event raised at or after `since`
fn log_line(identity: &Identity, since: DateTime<Utc>, event: &Event) -> Option<LogLine> {
    let namespace = event
        .namespace()
        .or_else(|| event.involved_object.namespace.clone())?;
    let app = identity.app_for_namespace(&namespace)?.to_string();

    let ts = event
        .last_timestamp
        .as_ref()
        .and_then(timestamp)
        .or_else(|| event.event_time.as_ref().and_then(timestamp))
        .or_else(|| event.metadata.creation_timestamp.as_ref().and_then(timestamp))?;
    if ts < since {
        return None;
    }

    let kind = event.involved_object.kind.as_deref()?.to_lowercase();
    let name = event.involved_object.name.as_deref()?;

    Some(LogLine {
        app,
        stream: format!("system/k8s/{}/{}", kind, name),
        ts,
        message: format!(
            "{}: {}",
            event.reason.as_deref().unwrap_or_default(),
            event.message.as_deref().unwrap_or_default().trim()
        ),
    })
}
