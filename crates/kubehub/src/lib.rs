//! Huddle kubehub: the declarative-store side of the operator.
//!
//! `ChannelStore` is the narrow read/patch contract reconciliation uses.
//! `KubeStore` backs it with the API server; `memory::MemoryStore` emulates
//! one for tests. Client bootstrap and watch scoping live in `cluster`.

#![forbid(unsafe_code)]

use huddle_api::{Channel, ChannelStatus, ObjectKey};

mod cluster;
mod kube_store;
pub mod memory;

pub use cluster::{connect, load_secret_value, operator_namespace, WatchScope, SERVICE_ACCOUNT_NAMESPACE_FILE};
pub use kube_store::KubeStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic concurrency failure; re-read and retry.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store: {0}")]
    Api(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read and patch access to `Channel` records.
///
/// Patches are conditional on the `resourceVersion` of the record passed in;
/// a stale record yields `StoreError::Conflict`. Each patch returns the record
/// as stored afterwards, new resource version included.
#[async_trait::async_trait]
pub trait ChannelStore: Send + Sync {
    /// `Ok(None)` when the record does not exist (anymore).
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<Channel>>;

    async fn patch_status(&self, record: &Channel, status: &ChannelStatus) -> StoreResult<Channel>;

    async fn patch_finalizers(&self, record: &Channel, finalizers: Vec<String>) -> StoreResult<Channel>;
}
