//! Pod controller
//!
//! Watches the rack's pods and forwards container state changes (waiting
//! and terminated reasons) to `service/<service>/<pod>`. Each distinct
//! state of a container is forwarded once; a container that returns to
//! running and fails again is reported again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ContainerState, Pod};
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use super::{require_rack, timestamp, Controller, LogLine, Seen, WATCH_TIMEOUT_SECS};
use crate::provider::{Identity, Provider, APP_LABEL};
use crate::Result;

const NAME: &str = "pod";

/// Label on a pod carrying its service name
pub const SERVICE_LABEL: &str = "service";

/// Watches the rack's pods for container failures
pub struct PodController {
    provider: Arc<Provider>,
    api: Api<Pod>,
    selector: String,
}

impl PodController {
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

#[async_trait]
impl Controller for PodController {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(self: Box<Self>) {
        info!(selector = %self.selector, "watching pods");
        let identity = self.provider.identity_handle();
        let engine = self.provider.engine_handle();
        let seen = Seen::default();

        let mut events = watcher::watcher(
            self.api,
            WatcherConfig::default()
                .labels(&self.selector)
                .timeout(WATCH_TIMEOUT_SECS),
        )
        .default_backoff()
        .boxed();

        while let Some(item) = events.next().await {
            match item {
                Ok(Event::Apply(pod)) | Ok(Event::InitApply(pod)) => {
                    for line in state_changes(&identity, &seen, &pod) {
                        line.send(engine.as_ref()).await;
                    }
                }
                Ok(Event::Delete(pod)) => {
                    debug!(pod = %pod.name_any(), "pod deleted");
                    seen.forget_prefix(&format!("{}/", pod_key(&pod)));
                }
                Ok(Event::Init) | Ok(Event::InitDone) => {}
                Err(e) => warn!(error = %e, "pod watch error"),
            }
        }
    }
}

fn pod_key(pod: &Pod) -> String {
    pod.uid().unwrap_or_else(|| pod.name_any())
}

/// Log lines for container states not yet forwarded
fn state_changes(identity: &Identity, seen: &Seen, pod: &Pod) -> Vec<LogLine> {
    let Some(service) = pod.labels().get(SERVICE_LABEL).cloned() else {
        return Vec::new();
    };
    let app = pod.labels().get(APP_LABEL).cloned().or_else(|| {
        let ns = pod.namespace()?;
        identity.app_for_namespace(&ns).map(str::to_string)
    });
    let Some(app) = app else {
        return Vec::new();
    };

    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    let pod_name = pod.name_any();
    let prefix = pod_key(pod);
    let mut lines = Vec::new();

    for status in statuses {
        let (state, line) = match status.state.as_ref().and_then(describe) {
            Some(described) => described,
            None => ("running".to_string(), None),
        };
        if !seen.changed(&format!("{}/{}", prefix, status.name), &state) {
            continue;
        }
        if let Some((ts, detail)) = line {
            lines.push(LogLine {
                app: app.clone(),
                stream: format!("service/{}/{}", service, pod_name),
                ts,
                message: format!("{}: {}", status.name, detail),
            });
        }
    }

    lines
}

/// State key plus an optional (time, text) to forward
type Described = (String, Option<(chrono::DateTime<Utc>, String)>);

fn describe(state: &ContainerState) -> Option<Described> {
    if let Some(waiting) = &state.waiting {
        let reason = waiting.reason.clone().unwrap_or_else(|| "Waiting".to_string());
        let detail = match waiting.message.as_deref() {
            Some(message) => format!("{} {}", reason, message.trim()),
            None => reason.clone(),
        };
        return Some((format!("waiting:{}", reason), Some((Utc::now(), detail))));
    }

    if let Some(terminated) = &state.terminated {
        let reason = terminated
            .reason
            .clone()
            .unwrap_or_else(|| "Terminated".to_string());
        let ts = terminated
            .finished_at
            .as_ref()
            .and_then(timestamp)
            .unwrap_or_else(Utc::now);
        let detail = format!("{} (exit code {})", reason, terminated.exit_code);
        return Some((
            format!("terminated:{}:{}", reason, terminated.exit_code),
            Some((ts, detail)),
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            name: "dev".to_string(),
            namespace: "dev-system".to_string(),
            ..Default::default()
        }
    }

    fn pod(state: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-7f9c-abcde",
                "namespace": "dev-myapp",
                "uid": "p-1",
                "labels": { "rack": "dev", "service": "web" }
            },
            "status": {
                "containerStatuses": [{
                    "name": "main",
                    "image": "web:1",
                    "imageID": "",
                    "ready": false,
                    "restartCount": 3,
                    "state": state
                }]
            }
        }))
        .unwrap()
    }

    /// Story: a crash looping container is reported once per distinct
    /// state, and again after it recovers and fails anew.
    #[test]
    fn story_crash_loop_is_forwarded_once() {
        let seen = Seen::default();
        let crashing = pod(json!({ "waiting": {
            "reason": "CrashLoopBackOff",
            "message": "back-off 40s restarting failed container"
        }}));

        let lines = state_changes(&identity(), &seen, &crashing);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].app, "myapp");
        assert_eq!(lines[0].stream, "service/web/web-7f9c-abcde");
        assert_eq!(
            lines[0].message,
            "main: CrashLoopBackOff back-off 40s restarting failed container"
        );

        assert!(state_changes(&identity(), &seen, &crashing).is_empty());

        let running = pod(json!({ "running": { "startedAt": "2024-05-01T12:00:00Z" } }));
        assert!(state_changes(&identity(), &seen, &running).is_empty());

        assert_eq!(state_changes(&identity(), &seen, &crashing).len(), 1);
    }

    #[test]
    fn test_terminated_reports_exit_code_and_finish_time() {
        let seen = Seen::default();
        let oom = pod(json!({ "terminated": {
            "reason": "OOMKilled",
            "exitCode": 137,
            "finishedAt": "2024-05-01T12:00:00Z"
        }}));

        let lines = state_changes(&identity(), &seen, &oom);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message, "main: OOMKilled (exit code 137)");
        assert_eq!(lines[0].ts.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_pod_without_service_label_is_ignored() {
        let seen = Seen::default();
        let mut p = pod(json!({ "waiting": { "reason": "ErrImagePull" } }));
        p.metadata.labels.as_mut().unwrap().remove(SERVICE_LABEL);
        assert!(state_changes(&identity(), &seen, &p).is_empty());
    }
}
