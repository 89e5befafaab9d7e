//! Expiry sweep for stale EDUs.

use std::collections::BTreeSet;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use super::FederationQueueStore;
use crate::error::{backend, QueueResult};
use crate::events::QueuePayload;
use crate::expiry::to_unix_millis;
use crate::receipt::Receipt;
use crate::tables;

impl<P, E> FederationQueueStore<P, E>
where
    P: QueuePayload,
    E: QueuePayload,
{
    /// Deletes every EDU association that expired before `now`, together with
    /// payloads that no longer have any reference, and returns the NIDs whose
    /// associations were removed.
    ///
    /// Associations without an expiry (`m.direct_to_device`,
    /// `m.device_list_update`) are never touched. Safe to call at any time
    /// alongside queueing, draining and cleaning.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> QueueResult<BTreeSet<Receipt>> {
        let cutoff = to_unix_millis(now);

        let mut txn = self.begin().await?;
        let expired = tables::edus::select_expired(txn.conn(), cutoff)
            .await
            .map_err(backend("select_expired_edus"))?;
        if expired.is_empty() {
            return Ok(BTreeSet::new());
        }

        let present: Vec<i64> = tables::json::lock(txn.conn(), &expired)
            .await
            .map_err(backend("lock_queue_json"))?
            .into_keys()
            .collect();
        let removed = tables::edus::delete_expired(txn.conn(), cutoff, &expired)
            .await
            .map_err(backend("delete_expired_edus"))?;
        let orphans = tables::unreferenced(txn.conn(), &present)
            .await
            .map_err(backend("reference_count"))?;
        tables::json::delete_many(txn.conn(), &orphans)
            .await
            .map_err(backend("delete_queue_json"))?;

        let payloads = orphans.len();
        self.evict_after_commit(&mut txn, orphans);
        txn.commit().await.map_err(backend("commit"))?;

        debug!(removed, payloads, "swept expired EDUs");
        Ok(expired.into_iter().map(Receipt::new).collect())
    }
}

/// Periodic removal of expired EDUs, modelled on
/// `tower_sessions::ExpiredDeletion`.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use federation_queue_seaorm_store::{ExpiredEduDeletion, FederationQueueStore};
///
/// # async fn example(store: FederationQueueStore) {
/// let sweeper = tokio::spawn(store.clone().continuously_delete_expired(Duration::from_secs(60)));
/// # let _ = sweeper;
/// # }
/// ```
#[async_trait]
pub trait ExpiredEduDeletion: Send + Sync {
    /// Sweeps everything that has expired as of the current wall-clock time.
    async fn delete_expired(&self) -> QueueResult<BTreeSet<Receipt>>;

    /// Sweeps every `period` until a sweep fails, returning that error.
    ///
    /// The first sweep happens one `period` after the call.
    async fn continuously_delete_expired(self, period: std::time::Duration) -> QueueResult<()>
    where
        Self: Sized,
    {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // The first tick completes immediately.
        loop {
            interval.tick().await;
            self.delete_expired().await?;
        }
    }
}

#[async_trait]
impl<P, E> ExpiredEduDeletion for FederationQueueStore<P, E>
where
    P: QueuePayload,
    E: QueuePayload,
{
    async fn delete_expired(&self) -> QueueResult<BTreeSet<Receipt>> {
        self.sweep_expired(OffsetDateTime::now_utc()).await
    }
}
