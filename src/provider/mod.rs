//! The provider capability context
//!
//! A [`Provider`] bundles the rack identity with shared handles to the
//! cluster, the declarative applier, the template renderer, the metrics sink
//! and the active [`Engine`]. One root instance is built at process start.
//! Request-scoped work forks it with [`Provider::with_context`], which swaps
//! only the execution context and shares everything else.
//!
//! # Construction
//!
//! ```text
//! bootstrap -> NAMESPACE -> credentials -> clients -> rack namespace -> templater
//! ```
//!
//! Every step is fail-fast. Nothing external is registered until
//! [`Provider::initialize`] runs, so a failed construction needs no cleanup.

mod identity;

pub use identity::{Identity, RACK_LABEL};

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::{Client, Config, ResourceExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument, Span};

use crate::apply::{KubeApplier, ManifestApplier};
use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::config::{OsEnv, Settings};
use crate::controller::{self, ControllerFactory, DEFAULT_CONTROLLERS};
use crate::credentials::{self, SystemCredentials};
use crate::engine::{Engine, GenericEngine};
use crate::heartbeat::HEARTBEAT_INTERVAL;
use crate::metrics::{HttpMetrics, MetricsSink};
use crate::template::Templater;
use crate::{bootstrap, Result};

/// Label on an app namespace carrying the app name
pub const APP_LABEL: &str = "app";

/// Annotation on an app namespace carrying the active release
pub const RELEASE_ANNOTATION: &str = "rack.release";

/// Options for [`Provider::initialize`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Time between heartbeat ticks
    pub heartbeat_interval: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

/// An application known to the rack
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// App name
    pub name: String,
    /// Namespace the app's resources live in
    pub namespace: String,
    /// Active release, if one has been promoted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Status as reported by the engine
    pub status: String,
}

/// Cluster-facing handles a provider is assembled from
///
/// Production code builds these with [`Handles::connect`]; tests substitute
/// mocks for the trait objects.
#[derive(Clone)]
pub struct Handles {
    /// Resolved connection config
    pub config: Arc<Config>,
    /// Raw cluster client
    pub client: Client,
    /// Typed cluster reads
    pub cluster: Arc<dyn ClusterClient>,
    /// Declarative apply client
    pub applier: Arc<dyn ManifestApplier>,
    /// Outbound telemetry
    pub metrics: Arc<dyn MetricsSink>,
}

impl Handles {
    /// Build real handles against a resolved config
    ///
    /// Runs [`bootstrap::install`] first; building a client needs the
    /// process crypto provider.
    pub fn connect(config: Config, settings: &Settings) -> Result<Self> {
        bootstrap::install();
        let client = Client::try_from(config.clone())?;
        Ok(Self {
            config: Arc::new(config),
            cluster: Arc::new(KubeClusterClient::new(client.clone())),
            applier: Arc::new(KubeApplier::new(client.clone())),
            metrics: Arc::new(HttpMetrics::new(&settings.metrics_endpoint)?),
            client,
        })
    }
}

/// The provider capability context
///
/// Cloning is shallow: every handle is reference counted. Forks made with
/// [`with_context`](Self::with_context) differ only in their execution
/// context.
#[derive(Clone)]
pub struct Provider {
    config: Arc<Config>,
    client: Client,
    identity: Arc<Identity>,
    cluster: Arc<dyn ClusterClient>,
    applier: Arc<dyn ManifestApplier>,
    span: Span,
    metrics: Arc<dyn MetricsSink>,
    templater: Arc<Templater>,
    engine: Arc<dyn Engine>,
    ctx: CancellationToken,
}

impl Provider {
    /// Build the root provider from the process environment
    pub async fn from_env() -> Result<Self> {
        bootstrap::install();

        let settings = Settings::from_env(&OsEnv)?;
        let config = credentials::resolve(&SystemCredentials).await?;
        let handles = Handles::connect(config, &settings)?;

        Self::assemble(&settings, handles).await
    }

    /// Assemble a provider from settings and already-built handles
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) if the rack
    /// namespace does not exist.
    pub async fn assemble(settings: &Settings, handles: Handles) -> Result<Self> {
        let span = info_span!("provider", ns = "k8s");

        let namespace = handles
            .cluster
            .get_namespace(&settings.namespace)
            .instrument(span.clone())
            .await?;

        let identity = Arc::new(Identity::new(settings, &namespace));
        let templater = Arc::new(Templater::new(identity.clone())?);
        let engine: Arc<dyn Engine> =
            Arc::new(GenericEngine::new(handles.client.clone(), identity.clone()));

        span.in_scope(|| {
            info!(
                rack = %identity.name,
                namespace = %identity.namespace,
                version = %identity.version,
                "provider assembled"
            )
        });

        Ok(Self {
            config: handles.config,
            client: handles.client,
            identity,
            cluster: handles.cluster,
            applier: handles.applier,
            span,
            metrics: handles.metrics,
            templater,
            engine,
            ctx: CancellationToken::new(),
        })
    }

    /// Replace the active engine
    ///
    /// Meant to be called on the root provider before it is shared.
    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = engine;
        self
    }

    /// Fork this provider onto another execution context
    ///
    /// The receiver is untouched and all handles are shared with the fork.
    /// Pass `root.context().child_token()` so that cancelling the fork does
    /// not cancel the root.
    pub fn with_context(&self, ctx: CancellationToken) -> Self {
        Self {
            ctx,
            ..self.clone()
        }
    }

    /// Current execution context
    pub fn context(&self) -> &CancellationToken {
        &self.ctx
    }

    /// Start the controllers and the heartbeat
    ///
    /// Must be called from within a tokio runtime. Returns once the tasks
    /// are spawned.
    pub fn initialize(self: &Arc<Self>, opts: ProviderOptions) -> Result<()> {
        self.initialize_with(DEFAULT_CONTROLLERS, opts)
    }

    /// Start a given set of controllers and the heartbeat
    ///
    /// Controllers are constructed in order. The first constructor error is
    /// returned and nothing is started.
    pub fn initialize_with(
        self: &Arc<Self>,
        factories: &[ControllerFactory],
        opts: ProviderOptions,
    ) -> Result<()> {
        let span = info_span!(parent: &self.span, "initialize");
        span.in_scope(|| {
            let result = controller::start(self.clone(), factories, opts);
            match &result {
                Ok(()) => info!(controllers = factories.len(), "provider initialized"),
                Err(e) => error!(error = %e, "provider initialization failed"),
            }
            result
        })
    }

    /// List the rack's apps
    pub async fn app_list(&self) -> Result<Vec<App>> {
        self.list_apps().instrument(self.span.clone()).await
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        let namespaces = self
            .cluster
            .list_namespaces(&self.identity.app_selector())
            .await?;

        let mut apps = Vec::with_capacity(namespaces.len());
        for ns in &namespaces {
            let Some(name) = self.app_name(ns) else {
                debug!(namespace = %ns.name_any(), "skipping namespace without app name");
                continue;
            };
            apps.push(App {
                status: self.engine.app_status(&name).await?,
                release: ns.annotations().get(RELEASE_ANNOTATION).cloned(),
                namespace: ns.name_any(),
                name,
            });
        }
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }

    /// Create an app by rendering and applying its namespace
    pub async fn app_create(&self, name: &str) -> Result<()> {
        self.apply_template("app.yml", minijinja::context! { name => name })
            .await?;
        self.span.in_scope(|| info!(app = %name, "app created"));
        Ok(())
    }

    /// Render a bundled template and apply the result
    pub async fn apply_template<S: Serialize + Send>(&self, name: &str, params: S) -> Result<()> {
        let manifests = self.templater.render(name, params)?;
        self.applier
            .apply(&manifests)
            .instrument(self.span.clone())
            .await
    }

    fn app_name(&self, ns: &Namespace) -> Option<String> {
        ns.labels()
            .get(APP_LABEL)
            .cloned()
            .or_else(|| self.identity.app_for_namespace(&ns.name_any()).map(str::to_string))
    }

    /// Rack identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Shared handle to the rack identity
    pub fn identity_handle(&self) -> Arc<Identity> {
        self.identity.clone()
    }

    /// Resolved connection config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Raw cluster client
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Typed cluster reads
    pub fn cluster(&self) -> &dyn ClusterClient {
        self.cluster.as_ref()
    }

    /// Active engine
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Shared handle to the active engine
    pub fn engine_handle(&self) -> Arc<dyn Engine> {
        self.engine.clone()
    }

    /// Outbound telemetry
    pub fn metrics(&self) -> &dyn MetricsSink {
        self.metrics.as_ref()
    }

    /// Template renderer
    pub fn templater(&self) -> &Templater {
        &self.templater
    }

    /// Span provider operations run in
    pub fn span(&self) -> &Span {
        &self.span
    }
}
