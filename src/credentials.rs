//! Cluster credential resolution
//!
//! Resolution runs once per process and tries, in order:
//! 1. In-cluster service account credentials
//! 2. `kubectl config view --raw`, parsed as a kubeconfig document
//!
//! If both fail the error carries the cause of the kubectl attempt.

use std::time::Duration;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Timeout for the kubectl fallback
const KUBECTL_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait abstracting the two credential strategies
///
/// This allows the fallback logic to be tested without a cluster
/// or a kubectl binary on the path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Load service-account credentials mounted into the pod
    async fn in_cluster(&self) -> Result<Config>;

    /// Dump the active kubeconfig through the local cluster CLI
    async fn kubectl_config(&self) -> Result<String>;
}

/// Real credential source backed by the pod filesystem and `kubectl`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCredentials;

#[async_trait]
impl CredentialSource for SystemCredentials {
    async fn in_cluster(&self) -> Result<Config> {
        Config::incluster().map_err(|e| Error::config(format!("in-cluster config: {}", e)))
    }

    async fn kubectl_config(&self) -> Result<String> {
        let output = tokio::time::timeout(
            KUBECTL_TIMEOUT,
            Command::new("kubectl")
                .args(["config", "view", "--raw"])
                .output(),
        )
        .await
        .map_err(|_| Error::config(format!("kubectl timed out after {:?}", KUBECTL_TIMEOUT)))?
        .map_err(|e| Error::config(format!("failed to run kubectl: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::config(format!(
                "kubectl config view --raw exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::config(format!("kubectl output is not UTF-8: {}", e)))
    }
}

/// Resolve a connection config, falling back from in-cluster to kubectl
pub async fn resolve(source: &dyn CredentialSource) -> Result<Config> {
    match source.in_cluster().await {
        Ok(config) => {
            info!(server = %config.cluster_url, "using in-cluster credentials");
            return Ok(config);
        }
        Err(e) => debug!(error = %e, "in-cluster credentials unavailable, trying kubectl"),
    }

    let raw = source.kubectl_config().await?;
    let config = from_kubeconfig(&raw).await?;
    info!(server = %config.cluster_url, "using kubectl credentials");
    Ok(config)
}

/// Build a connection config from a raw kubeconfig document
///
/// The document's current context selects cluster, user and namespace.
pub async fn from_kubeconfig(raw: &str) -> Result<Config> {
    let kubeconfig = Kubeconfig::from_yaml(raw)
        .map_err(|e| Error::config(format!("invalid kubeconfig: {}", e)))?;

    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::config(format!("unusable kubeconfig: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: dev
  cluster:
    server: https://10.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
    namespace: apps
current-context: dev
users:
- name: dev
  user:
    token: abc123
"#;

    fn in_cluster_config() -> Config {
        Config::new("https://10.96.0.1:443".parse().unwrap())
    }

    /// Story: inside a pod the service account wins and kubectl is
    /// never invoked.
    #[tokio::test]
    async fn story_in_cluster_credentials_short_circuit() {
        let mut source = MockCredentialSource::new();
        source
            .expect_in_cluster()
            .times(1)
            .returning(|| Ok(in_cluster_config()));
        source.expect_kubectl_config().never();

        let config = resolve(&source).await.unwrap();
        assert_eq!(config.cluster_url.host(), Some("10.96.0.1"));
    }

    /// Story: on a developer laptop the in-cluster attempt fails and the
    /// active kubectl context is used instead.
    #[tokio::test]
    async fn story_kubectl_fallback_parses_active_context() {
        let mut source = MockCredentialSource::new();
        source
            .expect_in_cluster()
            .returning(|| Err(Error::config("not running in a pod")));
        source
            .expect_kubectl_config()
            .times(1)
            .returning(|| Ok(KUBECONFIG.to_string()));

        let config = resolve(&source).await.unwrap();
        assert_eq!(config.cluster_url.host(), Some("10.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert_eq!(config.default_namespace, "apps");
    }

    /// Story: when both strategies fail the error reports the kubectl cause,
    /// not the in-cluster one.
    #[tokio::test]
    async fn story_both_strategies_fail_with_second_cause() {
        let mut source = MockCredentialSource::new();
        source
            .expect_in_cluster()
            .returning(|| Err(Error::config("service account token missing")));
        source
            .expect_kubectl_config()
            .returning(|| Err(Error::config("failed to run kubectl: not found")));

        let err = resolve(&source).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("kubectl"));
        assert!(!err.to_string().contains("service account"));
    }

    #[tokio::test]
    async fn test_unparseable_kubectl_output_is_config_error() {
        let mut source = MockCredentialSource::new();
        source
            .expect_in_cluster()
            .returning(|| Err(Error::config("not in cluster")));
        source
            .expect_kubectl_config()
            .returning(|| Ok("clusters: [unterminated".to_string()));

        let err = resolve(&source).await.unwrap_err();
        assert!(err.to_string().contains("invalid kubeconfig"));
    }
}
