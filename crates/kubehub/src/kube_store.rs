use huddle_api::{Channel, ChannelStatus, ObjectKey};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use metrics::counter;
use serde_json::json;
use tracing::debug;

use crate::{ChannelStore, StoreError, StoreResult};

/// `ChannelStore` over the API server using merge patches that carry
/// `metadata.resourceVersion` as a precondition.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Channel> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_err(key: &str, e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(key.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(format!("{}: {}", key, ae.message)),
        other => StoreError::Api(format!("{}: {}", key, other)),
    }
}

fn guarded(record: &Channel, body: serde_json::Value) -> serde_json::Value {
    let mut patch = body;
    if let (Some(rv), Some(obj)) = (record.resource_version(), patch.as_object_mut()) {
        let meta = obj.entry("metadata").or_insert_with(|| json!({}));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("resourceVersion".into(), json!(rv));
        }
    }
    patch
}

#[async_trait::async_trait]
impl ChannelStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<Channel>> {
        self.api(&key.namespace).get_opt(&key.name).await.map_err(|e| map_err(&key.to_string(), e))
    }

    async fn patch_status(&self, record: &Channel, status: &ChannelStatus) -> StoreResult<Channel> {
        let key = record.key();
        let patch = guarded(record, json!({ "status": status }));
        let out = self
            .api(&key.namespace)
            .patch_status(&record.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err(&key.to_string(), e));
        counter!("store_patches_total", 1, "kind" => "status", "ok" => out.is_ok().to_string());
        debug!(key = %key, ok = out.is_ok(), "patched status");
        out
    }

    async fn patch_finalizers(&self, record: &Channel, finalizers: Vec<String>) -> StoreResult<Channel> {
        let key = record.key();
        let patch = guarded(record, json!({ "metadata": { "finalizers": finalizers } }));
        let out = self
            .api(&key.namespace)
            .patch(&record.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err(&key.to_string(), e));
        counter!("store_patches_total", 1, "kind" => "finalizers", "ok" => out.is_ok().to_string());
        debug!(key = %key, ok = out.is_ok(), "patched finalizers");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_api::{new_channel, ChannelSpec};

    #[test]
    fn patches_carry_resource_version() {
        let mut ch = new_channel("ns", "a", ChannelSpec { name: "a".into(), ..Default::default() });
        ch.metadata.resource_version = Some("42".into());
        let p = guarded(&ch, json!({ "metadata": { "finalizers": ["x"] } }));
        assert_eq!(p["metadata"]["resourceVersion"], "42");
        assert_eq!(p["metadata"]["finalizers"][0], "x");

        let p = guarded(&ch, json!({ "status": { "id": "C1" } }));
        assert_eq!(p["metadata"]["resourceVersion"], "42");
        assert_eq!(p["status"]["id"], "C1");
    }

    #[test]
    fn unversioned_records_patch_unconditionally() {
        let ch = new_channel("ns", "a", ChannelSpec::default());
        let p = guarded(&ch, json!({ "status": {} }));
        assert!(p.get("metadata").is_none());
    }
}
