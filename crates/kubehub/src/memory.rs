//! In-memory `ChannelStore` that behaves like the API server where the
//! controller can tell: resource versions bump on every write, stale patches
//! conflict, and a record marked for deletion disappears once its finalizers
//! are gone.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use huddle_api::{Channel, ChannelSpec, ChannelStatus, ObjectKey};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tracing::debug;

use crate::{ChannelStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, Channel>,
    version: u64,
    patches: usize,
    failures: VecDeque<StoreError>,
}

impl Inner {
    fn bump(&mut self, ch: &mut Channel) {
        self.version += 1;
        ch.metadata.resource_version = Some(self.version.to_string());
    }

    /// Current copy of `record`, provided the caller saw the latest version.
    fn current(&mut self, record: &Channel) -> StoreResult<(ObjectKey, Channel)> {
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }
        let key = record.key();
        let stored = self.objects.get(&key).cloned().ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if record.resource_version().is_some() && record.resource_version() != stored.resource_version() {
            return Err(StoreError::Conflict(format!(
                "{}: have version {:?}, stored {:?}",
                key,
                record.resource_version(),
                stored.resource_version()
            )));
        }
        Ok((key, stored))
    }

    fn store(&mut self, key: ObjectKey, mut ch: Channel) -> Channel {
        self.patches += 1;
        self.bump(&mut ch);
        let gone = ch.is_deleting() && ch.metadata.finalizers.as_ref().map_or(true, Vec::is_empty);
        if gone {
            debug!(key = %key, "record collected");
            self.objects.remove(&key);
        } else {
            self.objects.insert(key, ch.clone());
        }
        ch
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or replace a record as an external actor would.
    pub fn insert(&self, mut ch: Channel) -> Channel {
        let mut inner = self.lock();
        inner.bump(&mut ch);
        inner.objects.insert(ch.key(), ch.clone());
        ch
    }

    pub fn snapshot(&self, key: &ObjectKey) -> Option<Channel> {
        self.lock().objects.get(key).cloned()
    }

    /// Edit the spec; returns the updated record.
    pub fn update_spec(&self, key: &ObjectKey, edit: impl FnOnce(&mut ChannelSpec)) -> Option<Channel> {
        let mut inner = self.lock();
        let mut ch = inner.objects.get(key).cloned()?;
        edit(&mut ch.spec);
        inner.bump(&mut ch);
        inner.objects.insert(key.clone(), ch.clone());
        Some(ch)
    }

    /// Mark for deletion; records without finalizers go away immediately.
    pub fn request_delete(&self, key: &ObjectKey) -> bool {
        let mut inner = self.lock();
        let Some(mut ch) = inner.objects.get(key).cloned() else {
            return false;
        };
        if ch.metadata.finalizers.as_ref().map_or(true, Vec::is_empty) {
            inner.objects.remove(key);
            return true;
        }
        if ch.metadata.deletion_timestamp.is_none() {
            ch.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            inner.bump(&mut ch);
            inner.objects.insert(key.clone(), ch);
        }
        true
    }

    /// Fail the next patch with `err`.
    pub fn fail_next_patch(&self, err: StoreError) {
        self.lock().failures.push_back(err);
    }

    /// Successful patches so far.
    pub fn patch_count(&self) -> usize {
        self.lock().patches
    }
}

#[async_trait::async_trait]
impl ChannelStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<Channel>> {
        Ok(self.snapshot(key))
    }

    async fn patch_status(&self, record: &Channel, status: &ChannelStatus) -> StoreResult<Channel> {
        let mut inner = self.lock();
        let (key, mut ch) = inner.current(record)?;
        ch.status = Some(status.clone());
        Ok(inner.store(key, ch))
    }

    async fn patch_finalizers(&self, record: &Channel, finalizers: Vec<String>) -> StoreResult<Channel> {
        let mut inner = self.lock();
        let (key, mut ch) = inner.current(record)?;
        ch.metadata.finalizers = if finalizers.is_empty() { None } else { Some(finalizers) };
        Ok(inner.store(key, ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_api::new_channel;

    fn seed(store: &MemoryStore) -> Channel {
        store.insert(new_channel("team", "proj", ChannelSpec { name: "proj".into(), ..Default::default() }))
    }

    #[tokio::test]
    async fn patches_bump_version_and_stale_writes_conflict() {
        let store = MemoryStore::new();
        let ch = seed(&store);
        let status = ChannelStatus { id: "C1".into(), ..Default::default() };
        let after = store.patch_status(&ch, &status).await.unwrap();
        assert_ne!(after.resource_version(), ch.resource_version());
        assert_eq!(after.external_id(), "C1");

        let err = store.patch_status(&ch, &status).await.unwrap_err();
        assert!(err.is_conflict(), "{}", err);
        assert_eq!(store.patch_count(), 1);
    }

    #[tokio::test]
    async fn deletion_waits_for_finalizers() {
        let store = MemoryStore::new();
        let ch = seed(&store);
        let key = ch.key();
        let ch = store.patch_finalizers(&ch, vec!["slack.huddle.io/channel".into()]).await.unwrap();
        assert!(store.request_delete(&key));
        let marked = store.get(&key).await.unwrap().unwrap();
        assert!(marked.is_deleting());

        // stale copy from before the deletion mark
        assert!(store.patch_finalizers(&ch, vec![]).await.unwrap_err().is_conflict());

        store.patch_finalizers(&marked, vec![]).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unfinalized_records_delete_immediately() {
        let store = MemoryStore::new();
        let key = seed(&store).key();
        assert!(store.request_delete(&key));
        assert!(store.snapshot(&key).is_none());
        assert!(!store.request_delete(&key));
    }

    #[tokio::test]
    async fn injected_failures_and_missing_records() {
        let store = MemoryStore::new();
        let ch = seed(&store);
        store.fail_next_patch(StoreError::Api("etcd unavailable".into()));
        assert_eq!(
            store.patch_status(&ch, &ChannelStatus::default()).await,
            Err(StoreError::Api("etcd unavailable".into()))
        );
        let spec_edit = store.update_spec(&ch.key(), |s| s.topic = "t".into()).unwrap();
        assert_eq!(spec_edit.spec.topic, "t");

        let ghost = new_channel("team", "ghost", ChannelSpec::default());
        assert!(matches!(store.patch_status(&ghost, &ChannelStatus::default()).await, Err(StoreError::NotFound(_))));
    }
}
