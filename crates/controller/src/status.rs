//! Condition and status writes.

use huddle_api::{Channel, ChannelStatus};
use huddle_core::condition::{self, Condition};
use huddle_kubehub::ChannelStore;
use tracing::debug;

use crate::guard::Guard;
use crate::ReconcileError;

/// Status with `next` as the single current condition.
pub(crate) fn with_condition(record: &Channel, next: Condition) -> ChannelStatus {
    ChannelStatus {
        id: record.external_id().to_string(),
        conditions: condition::replace(record.conditions(), next),
    }
}

/// Write `status` unless it is what the record already carries. `record` is
/// refreshed with the stored copy on write.
pub(crate) async fn write(
    store: &dyn ChannelStore,
    guard: &Guard<'_>,
    record: &mut Channel,
    status: ChannelStatus,
) -> Result<bool, ReconcileError> {
    if record.status.as_ref() == Some(&status) {
        debug!(key = %record.key(), "status unchanged");
        return Ok(false);
    }
    let stored = guard.call(store.patch_status(record, &status)).await?;
    *record = stored;
    Ok(true)
}

pub(crate) async fn record_id(
    store: &dyn ChannelStore,
    guard: &Guard<'_>,
    record: &mut Channel,
    id: &str,
) -> Result<(), ReconcileError> {
    let status = ChannelStatus { id: id.to_string(), conditions: record.conditions().to_vec() };
    write(store, guard, record, status).await.map(|_| ())
}

pub(crate) async fn report_success(
    store: &dyn ChannelStore,
    guard: &Guard<'_>,
    record: &mut Channel,
) -> Result<(), ReconcileError> {
    let status = with_condition(record, Condition::success());
    write(store, guard, record, status).await.map(|_| ())
}

pub(crate) async fn report_failure(
    store: &dyn ChannelStore,
    guard: &Guard<'_>,
    record: &mut Channel,
    message: &str,
) -> Result<(), ReconcileError> {
    let status = with_condition(record, Condition::failure(message));
    write(store, guard, record, status).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_api::{new_channel, ChannelSpec};
    use huddle_kubehub::memory::MemoryStore;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn repeated_outcome_does_not_write() {
        let store = MemoryStore::new();
        let mut record = store.insert(new_channel("ns", "a", ChannelSpec { name: "a".into(), ..Default::default() }));
        let token = CancellationToken::new();
        let guard = Guard::new(&token);

        report_failure(&store, &guard, &mut record, "name_taken").await.unwrap();
        let first = record.conditions().to_vec();
        report_failure(&store, &guard, &mut record, "name_taken").await.unwrap();
        assert_eq!(store.patch_count(), 1);
        assert_eq!(record.conditions(), first.as_slice());

        report_success(&store, &guard, &mut record).await.unwrap();
        assert_eq!(store.patch_count(), 2);
        assert_eq!(record.conditions().len(), 1);
        assert!(record.conditions()[0].is_success());
    }

    #[tokio::test]
    async fn recording_the_id_keeps_conditions() {
        let store = MemoryStore::new();
        let mut record = store.insert(new_channel("ns", "a", ChannelSpec { name: "a".into(), ..Default::default() }));
        let token = CancellationToken::new();
        let guard = Guard::new(&token);

        report_failure(&store, &guard, &mut record, "ratelimited").await.unwrap();
        record_id(&store, &guard, &mut record, "C1").await.unwrap();
        assert_eq!(record.external_id(), "C1");
        assert_eq!(record.conditions()[0].message, "ratelimited");
        assert_eq!(store.snapshot(&record.key()).unwrap().external_id(), "C1");
    }
}
