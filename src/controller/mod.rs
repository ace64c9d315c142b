//! Background controllers
//!
//! Four controllers keep the rack's view of the cluster current:
//!
//! - [`DeploymentController`] - reports rollouts that exceed their deadline
//! - [`EventController`] - forwards cluster events for app objects
//! - [`NodeController`] - tracks node readiness
//! - [`PodController`] - forwards container state changes
//!
//! [`start`] constructs all of them before running any. Once running, a
//! controller owns its failures: errors are logged by the controller and
//! nothing restarts a run loop that returns.

mod deployment;
mod event;
mod node;
mod pod;

pub use deployment::DeploymentController;
pub use event::EventController;
pub use node::NodeController;
pub use pod::PodController;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::engine::Engine;
use crate::heartbeat;
use crate::provider::{Provider, ProviderOptions};
use crate::{Error, Result};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
pub(crate) const WATCH_TIMEOUT_SECS: u32 = 25;

/// A named background unit
#[async_trait]
pub trait Controller: Send {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Run until the watch stream ends
    async fn run(self: Box<Self>);
}

/// Constructor for a controller bound to a provider
pub type ControllerFactory = fn(Arc<Provider>) -> Result<Box<dyn Controller>>;

/// The rack's controllers, in construction order
pub const DEFAULT_CONTROLLERS: &[ControllerFactory] = &[
    DeploymentController::boxed,
    EventController::boxed,
    NodeController::boxed,
    PodController::boxed,
];

/// Construct every controller, then spawn their run loops and the heartbeat
///
/// A zero heartbeat interval or a failing constructor is returned as an
/// error and no task is spawned.
pub fn start(
    provider: Arc<Provider>,
    factories: &[ControllerFactory],
    opts: ProviderOptions,
) -> Result<()> {
    if opts.heartbeat_interval.is_zero() {
        return Err(Error::config("heartbeat interval must be greater than zero"));
    }

    let controllers = factories
        .iter()
        .map(|factory| factory(provider.clone()))
        .collect::<Result<Vec<_>>>()?;

    for controller in controllers {
        let name = controller.name();
        let span = info_span!(parent: provider.span(), "controller", controller = name);
        tokio::spawn(
            async move {
                info!("controller started");
                controller.run().await;
                warn!("controller run loop exited");
            }
            .instrument(span),
        );
    }

    heartbeat::spawn(provider, opts.heartbeat_interval);
    Ok(())
}

/// Rack name for building selectors, or a controller error if unset
pub(crate) fn require_rack(provider: &Provider, controller: &str) -> Result<String> {
    let name = &provider.identity().name;
    if name.is_empty() {
        return Err(Error::controller(controller, "rack name is empty"));
    }
    Ok(name.clone())
}

/// One line destined for an app's log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// App the line belongs to
    pub app: String,
    /// Stream within the app, e.g. `system/k8s/pod/web-1`
    pub stream: String,
    /// When it happened
    pub ts: DateTime<Utc>,
    /// Line content
    pub message: String,
}

impl LogLine {
    /// Forward the line to the engine; failures are logged, not returned
    pub(crate) async fn send(self, engine: &dyn Engine) {
        if let Err(e) = engine
            .log(&self.app, &self.stream, self.ts, &self.message)
            .await
        {
            warn!(app = %self.app, stream = %self.stream, error = %e, "failed to forward log line");
        }
    }
}

/// Last forwarded state per key, so each distinct state is sent once
#[derive(Debug, Default)]
pub(crate) struct Seen {
    states: DashMap<String, String>,
}

impl Seen {
    /// Record `state` for `key`; true if it differs from the last one
    pub(crate) fn changed(&self, key: &str, state: &str) -> bool {
        match self.states.insert(key.to_string(), state.to_string()) {
            Some(previous) => previous != state,
            None => true,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop one key
    pub(crate) fn forget(&self, key: &str) {
        self.states.remove(key);
    }

    /// Drop every key with the given prefix
    pub(crate) fn forget_prefix(&self, prefix: &str) {
        self.states.retain(|key, _| !key.starts_with(prefix));
    }
}

/// Convert a Kubernetes timestamp to a chrono time through its RFC 3339 form
pub(crate) fn timestamp<T: Serialize>(time: &T) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(std::result::Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{namespace, provider, provider_with_namespace};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // =========================================================================
    // Story: All Or Nothing Startup
    // =========================================================================

    static FAILING_BUILT: AtomicUsize = AtomicUsize::new(0);
    static FAILING_RAN: AtomicUsize = AtomicUsize::new(0);

    struct FailingProbe;

    #[async_trait]
    impl Controller for FailingProbe {
        fn name(&self) -> &'static str {
            "failing-probe"
        }

        async fn run(self: Box<Self>) {
            FAILING_RAN.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn failing_probe(_: Arc<Provider>) -> Result<Box<dyn Controller>> {
        FAILING_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FailingProbe))
    }

    fn broken(_: Arc<Provider>) -> Result<Box<dyn Controller>> {
        Err(Error::controller("event", "rack name is empty"))
    }

    #[tokio::test(start_paused = true)]
    async fn story_constructor_failure_starts_nothing() {
        let provider = Arc::new(
            provider(|cluster, _, sink| {
                cluster.expect_list_namespaces().never();
                cluster.expect_list_nodes().never();
                sink.expect_post().never();
            })
            .await,
        );

        let err = provider
            .initialize_with(
                &[failing_probe, broken, failing_probe],
                ProviderOptions::default(),
            )
            .unwrap_err();

        match err {
            Error::Controller { controller, .. } => assert_eq!(controller, "event"),
            other => panic!("Expected Controller error, got {:?}", other),
        }

        // Construction stopped at the failing factory
        assert_eq!(FAILING_BUILT.load(Ordering::SeqCst), 1);

        // No run loop and no heartbeat, even after a full interval
        tokio::time::sleep(ProviderOptions::default().heartbeat_interval * 2).await;
        assert_eq!(FAILING_RAN.load(Ordering::SeqCst), 0);
    }

    static RUNNING_RAN: AtomicUsize = AtomicUsize::new(0);

    struct RunningProbe;

    #[async_trait]
    impl Controller for RunningProbe {
        fn name(&self) -> &'static str {
            "running-probe"
        }

        async fn run(self: Box<Self>) {
            RUNNING_RAN.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
    }

    fn running_probe(_: Arc<Provider>) -> Result<Box<dyn Controller>> {
        Ok(Box::new(RunningProbe))
    }

    #[tokio::test(start_paused = true)]
    async fn story_successful_start_returns_without_waiting() {
        let provider = Arc::new(provider(|_, _, _| {}).await);

        provider
            .initialize_with(
                &[running_probe, running_probe, running_probe, running_probe],
                ProviderOptions {
                    heartbeat_interval: Duration::from_secs(60),
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(RUNNING_RAN.load(Ordering::SeqCst), 4);
    }

    static ZERO_INTERVAL_BUILT: AtomicUsize = AtomicUsize::new(0);

    fn counted_probe(_: Arc<Provider>) -> Result<Box<dyn Controller>> {
        ZERO_INTERVAL_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RunningProbe))
    }

    #[tokio::test]
    async fn story_zero_heartbeat_interval_is_rejected_up_front() {
        let provider = Arc::new(
            provider(|cluster, _, sink| {
                cluster.expect_list_namespaces().never();
                sink.expect_post().never();
            })
            .await,
        );

        let err = provider
            .initialize_with(
                &[counted_probe],
                ProviderOptions {
                    heartbeat_interval: Duration::ZERO,
                },
            )
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("heartbeat interval"));
        assert_eq!(ZERO_INTERVAL_BUILT.load(Ordering::SeqCst), 0);
    }

    // =========================================================================
    // Story: Default Controllers Need A Rack Name
    // =========================================================================

    #[tokio::test]
    async fn story_default_controllers_reject_unnamed_rack() {
        let provider = Arc::new(
            provider_with_namespace(namespace("dev-system", &[]), |_, _, _| {}).await,
        );

        let err = provider
            .initialize(ProviderOptions::default())
            .unwrap_err();
        match err {
            Error::Controller { controller, message } => {
                assert_eq!(controller, "deployment");
                assert!(message.contains("rack name is empty"));
            }
            other => panic!("Expected Controller error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_controllers_construct_in_order() {
        let provider = Arc::new(provider(|_, _, _| {}).await);
        let names: Vec<_> = DEFAULT_CONTROLLERS
            .iter()
            .map(|factory| factory(provider.clone()).unwrap().name())
            .collect();
        assert_eq!(names, vec!["deployment", "event", "node", "pod"]);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn test_seen_reports_each_state_once() {
        let seen = Seen::default();
        assert!(seen.changed("uid/web", "CrashLoopBackOff"));
        assert!(!seen.changed("uid/web", "CrashLoopBackOff"));
        assert!(seen.changed("uid/web", "Error"));

        seen.forget_prefix("uid/");
        assert!(seen.changed("uid/web", "Error"));

        seen.forget("uid/web");
        assert!(seen.changed("uid/web", "Error"));
    }

    #[test]
    fn test_timestamp_reads_rfc3339() {
        let ts = timestamp(&"2024-05-01T12:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(timestamp(&"not a time"), None);
        assert_eq!(timestamp(&Option::<String>::None), None);
    }
}
