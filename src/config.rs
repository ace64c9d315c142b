//! Environment configuration for the provider
//!
//! Provides trait-based access to environment variables,
//! enabling dependency injection and mocking for tests.

use crate::{Error, Result};

/// Default provider kind
pub const DEFAULT_PROVIDER: &str = "k8s";
/// Default container runtime socket
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
/// Default storage path
pub const DEFAULT_STORAGE: &str = "/var/storage";
/// Default version when none is baked into the environment
pub const DEFAULT_VERSION: &str = "dev";
/// Fixed external endpoint heartbeats are posted under
pub const DEFAULT_METRICS_ENDPOINT: &str = "https://metrics.convox.com/metrics/rack";

/// Trait for reading process environment variables
///
/// This abstracts reading from the environment, enabling
/// proper unit testing without manipulating global state.
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Get a variable, returning `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Provider settings derived from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Namespace the rack runs in (`NAMESPACE`, required)
    pub namespace: String,
    /// Rack domain (`DOMAIN`)
    pub domain: String,
    /// Rack image (`IMAGE`)
    pub image: String,
    /// Shared rack secret (`PASSWORD`)
    pub password: String,
    /// Provider kind (`PROVIDER`)
    pub provider: String,
    /// Container runtime socket (`SOCKET`)
    pub socket: String,
    /// Storage path (`STORAGE`)
    pub storage: String,
    /// Rack version (`VERSION`)
    pub version: String,
    /// Base URL heartbeats are posted to (`METRICS_ENDPOINT`)
    pub metrics_endpoint: String,
}

impl Settings {
    /// Read settings from the given environment
    ///
    /// `NAMESPACE` is required. Empty values count as unset so that
    /// `VAR=` in a manifest still falls back to the default.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        let namespace = non_empty(env, "NAMESPACE")
            .ok_or_else(|| Error::config("NAMESPACE environment variable is required"))?;

        Ok(Self {
            namespace,
            domain: non_empty(env, "DOMAIN").unwrap_or_default(),
            image: non_empty(env, "IMAGE").unwrap_or_default(),
            password: non_empty(env, "PASSWORD").unwrap_or_default(),
            provider: coalesce(env, "PROVIDER", DEFAULT_PROVIDER),
            socket: coalesce(env, "SOCKET", DEFAULT_SOCKET),
            storage: coalesce(env, "STORAGE", DEFAULT_STORAGE),
            version: coalesce(env, "VERSION", DEFAULT_VERSION),
            metrics_endpoint: coalesce(env, "METRICS_ENDPOINT", DEFAULT_METRICS_ENDPOINT),
        })
    }
}

fn non_empty(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|v| !v.is_empty())
}

fn coalesce(env: &dyn EnvSource, key: &str, default: &str) -> String {
    non_empty(env, key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_with(vars: &[(&str, &str)]) -> MockEnvSource {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut mock = MockEnvSource::new();
        mock.expect_var()
            .returning(move |key| vars.get(key).cloned());
        mock
    }

    /// Story: a rack started without NAMESPACE refuses to boot.
    #[test]
    fn story_missing_namespace_fails() {
        let env = env_with(&[("DOMAIN", "rack.example.org")]);
        let err = Settings::from_env(&env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("NAMESPACE"));
    }

    #[test]
    fn test_empty_namespace_counts_as_missing() {
        let env = env_with(&[("NAMESPACE", "")]);
        assert!(Settings::from_env(&env).is_err());
    }

    /// Story: with only NAMESPACE set every optional field takes its
    /// documented default.
    #[test]
    fn story_unset_optionals_use_defaults() {
        let env = env_with(&[("NAMESPACE", "dev-system")]);
        let settings = Settings::from_env(&env).unwrap();

        assert_eq!(settings.namespace, "dev-system");
        assert_eq!(settings.provider, "k8s");
        assert_eq!(settings.socket, "/var/run/docker.sock");
        assert_eq!(settings.storage, "/var/storage");
        assert_eq!(settings.version, "dev");
        assert_eq!(settings.metrics_endpoint, DEFAULT_METRICS_ENDPOINT);
        assert_eq!(settings.domain, "");
        assert_eq!(settings.image, "");
        assert_eq!(settings.password, "");
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let env = env_with(&[
            ("NAMESPACE", "prod-system"),
            ("DOMAIN", "prod.example.org"),
            ("IMAGE", "rack/api:3.1.0"),
            ("PASSWORD", "s3cret"),
            ("PROVIDER", "aws"),
            ("SOCKET", "/run/containerd.sock"),
            ("STORAGE", "/mnt/storage"),
            ("VERSION", "3.1.0"),
        ]);
        let settings = Settings::from_env(&env).unwrap();

        assert_eq!(settings.domain, "prod.example.org");
        assert_eq!(settings.image, "rack/api:3.1.0");
        assert_eq!(settings.password, "s3cret");
        assert_eq!(settings.provider, "aws");
        assert_eq!(settings.socket, "/run/containerd.sock");
        assert_eq!(settings.storage, "/mnt/storage");
        assert_eq!(settings.version, "3.1.0");
    }

    #[test]
    fn test_empty_optional_falls_back_to_default() {
        let env = env_with(&[("NAMESPACE", "dev-system"), ("VERSION", "")]);
        assert_eq!(Settings::from_env(&env).unwrap().version, "dev");
    }
}
