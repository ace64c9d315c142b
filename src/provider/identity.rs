//! Rack identity resolved at startup

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;

use crate::config::Settings;

/// Label on the rack namespace carrying the rack name
pub const RACK_LABEL: &str = "rack";

/// Immutable identity of the running rack
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    /// Rack name, from the `rack` label of the rack namespace
    pub name: String,
    /// Rack namespace
    pub namespace: String,
    /// Rack domain
    pub domain: String,
    /// Rack image
    pub image: String,
    /// Shared rack secret
    pub password: String,
    /// Provider kind (e.g. "k8s")
    pub provider: String,
    /// Container runtime socket
    pub socket: String,
    /// Storage path
    pub storage: String,
    /// Rack version
    pub version: String,
}

impl Identity {
    /// Combine environment settings with the fetched rack namespace
    pub fn new(settings: &Settings, namespace: &Namespace) -> Self {
        Self {
            name: namespace
                .labels()
                .get(RACK_LABEL)
                .cloned()
                .unwrap_or_default(),
            namespace: namespace.name_any(),
            domain: settings.domain.clone(),
            image: settings.image.clone(),
            password: settings.password.clone(),
            provider: settings.provider.clone(),
            socket: settings.socket.clone(),
            storage: settings.storage.clone(),
            version: settings.version.clone(),
        }
    }

    /// Namespace an app's resources live in
    pub fn app_namespace(&self, app: &str) -> String {
        format!("{}-{}", self.name, app)
    }

    /// App name for a namespace owned by this rack, if it is one
    pub fn app_for_namespace<'a>(&self, namespace: &'a str) -> Option<&'a str> {
        if namespace == self.namespace {
            return None;
        }
        namespace
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|app| !app.is_empty())
    }

    /// Label selector matching the rack's app namespaces
    pub fn app_selector(&self) -> String {
        format!("{}={},type=app", RACK_LABEL, self.name)
    }

    /// Label selector matching every object the rack owns
    pub fn rack_selector(&self) -> String {
        format!("{}={}", RACK_LABEL, self.name)
    }
}
