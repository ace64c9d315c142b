//! Declarative manifest application
//!
//! Applies multi-document YAML with server-side apply, resolving each
//! document's resource type through API discovery. Namespaces go first so
//! that namespaced documents in the same bundle have somewhere to land.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::Discovery;
use kube::Client;
use serde::Deserialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "rack-provider";

/// Trait abstracting declarative apply of rendered manifests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Apply every document in a multi-document YAML string
    async fn apply(&self, manifests: &str) -> Result<()>;
}

/// Server-side apply backed by a kube [`Client`]
#[derive(Clone)]
pub struct KubeApplier {
    client: Client,
}

impl KubeApplier {
    /// Create a new applier for the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_document(&self, discovery: &Discovery, doc: &Document) -> Result<()> {
        let (api_resource, _) = discovery.resolve_gvk(&doc.gvk).ok_or_else(|| {
            Error::apply(format!(
                "unknown resource type: {}/{}",
                doc.api_version, doc.gvk.kind
            ))
        })?;

        let api: Api<DynamicObject> = match &doc.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &api_resource),
            None => Api::all_with(self.client.clone(), &api_resource),
        };

        api.patch(
            &doc.name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&doc.value),
        )
        .await
        .map_err(|e| Error::apply(format!("failed to apply {}/{}: {}", doc.gvk.kind, doc.name, e)))?;

        debug!(kind = %doc.gvk.kind, name = %doc.name, namespace = ?doc.namespace, "applied manifest");
        Ok(())
    }
}

#[async_trait]
impl ManifestApplier for KubeApplier {
    async fn apply(&self, manifests: &str) -> Result<()> {
        let docs = parse_documents(manifests)?;
        if docs.is_empty() {
            return Ok(());
        }

        let (namespaces, rest): (Vec<_>, Vec<_>) =
            docs.into_iter().partition(|d| d.gvk.kind == "Namespace");

        for batch in [namespaces, rest] {
            if batch.is_empty() {
                continue;
            }
            // Rediscover between batches so types created by earlier
            // documents resolve.
            let discovery = Discovery::new(self.client.clone())
                .run()
                .await
                .map_err(|e| Error::apply(format!("API discovery failed: {}", e)))?;
            for doc in &batch {
                self.apply_document(&discovery, doc).await?;
            }
        }

        Ok(())
    }
}

/// A parsed manifest document ready to apply
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Raw apiVersion string
    pub api_version: String,
    /// Group, version and kind
    pub gvk: GroupVersionKind,
    /// metadata.name
    pub name: String,
    /// metadata.namespace, if namespaced
    pub namespace: Option<String>,
    /// Full document
    pub value: serde_json::Value,
}

/// Get priority for a Kubernetes resource kind (lower = apply first)
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "ServiceAccount" => 1,
        "ClusterRole" | "Role" => 2,
        "ClusterRoleBinding" | "RoleBinding" => 3,
        "ConfigMap" | "Secret" => 4,
        "Service" => 5,
        "Deployment" | "DaemonSet" | "StatefulSet" => 6,
        _ => 10,
    }
}

/// Split a multi-document YAML string into apply-ready documents
///
/// Empty documents are skipped. The result is sorted by [`kind_priority`],
/// keeping source order within a kind.
pub fn parse_documents(manifests: &str) -> Result<Vec<Document>> {
    let mut docs = Vec::new();

    for de in serde_yaml::Deserializer::from_str(manifests) {
        let value = serde_json::Value::deserialize(de)
            .map_err(|e| Error::serialization(format!("invalid YAML: {}", e)))?;
        if value.is_null() {
            continue;
        }
        docs.push(to_document(value)?);
    }

    docs.sort_by_key(|d| kind_priority(&d.gvk.kind));
    Ok(docs)
}

fn to_document(value: serde_json::Value) -> Result<Document> {
    let field = |pointer: &str| value.pointer(pointer).and_then(|v| v.as_str());

    let kind = field("/kind").ok_or_else(|| Error::serialization("manifest missing kind"))?;
    let api_version =
        field("/apiVersion").ok_or_else(|| Error::serialization("manifest missing apiVersion"))?;
    let name = field("/metadata/name")
        .ok_or_else(|| Error::serialization(format!("{} missing metadata.name", kind)))?;
    let namespace = field("/metadata/namespace").map(str::to_string);

    let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));

    Ok(Document {
        api_version: api_version.to_string(),
        gvk: GroupVersionKind::gvk(group, version, kind),
        name: name.to_string(),
        namespace,
        value: value.clone(),
    })
}
