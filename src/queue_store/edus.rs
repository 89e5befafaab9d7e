//! EDU half of the queue.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use time::OffsetDateTime;

use super::{Association, FederationQueueStore};
use crate::error::QueueResult;
use crate::events::{EventKind, QueuePayload, ServerName};
use crate::expiry::{to_unix_millis, ExpiryPolicy};
use crate::receipt::Receipt;

impl<P, E> FederationQueueStore<P, E>
where
    P: QueuePayload,
    E: QueuePayload,
{
    /// Stores an ephemeral event and queues it for every destination.
    ///
    /// `edu_type` selects the expiry window from the store's
    /// [`ExpiryPolicy`].
    #[tracing::instrument(skip(self, destinations, event))]
    pub async fn queue_edu<'a>(
        &self,
        destinations: impl IntoIterator<Item = &'a ServerName>,
        edu_type: &str,
        event: &E,
    ) -> QueueResult<Receipt> {
        let destinations: Vec<&ServerName> = destinations.into_iter().collect();
        let expires_at = self.expires_at(edu_type, None);
        self.store_and_associate(
            &destinations,
            event,
            Association::Edu {
                edu_type,
                expires_at,
            },
        )
        .await
    }

    /// Queues an already stored EDU payload for more destinations.
    ///
    /// `expiry` replaces the store's policy for this call only. Expiry is
    /// computed once, so every destination in the call shares it.
    /// `receipt` must come from [`queue_edu`](Self::queue_edu); a PDU
    /// receipt fails with [`QueueError::WrongKind`](crate::QueueError::WrongKind).
    #[tracing::instrument(skip(self, destinations, expiry), fields(nid = receipt.nid()))]
    pub async fn associate_edu_with_destinations<'a>(
        &self,
        destinations: impl IntoIterator<Item = &'a ServerName>,
        receipt: Receipt,
        edu_type: &str,
        expiry: Option<&ExpiryPolicy>,
    ) -> QueueResult<()> {
        let destinations: Vec<&ServerName> = destinations.into_iter().collect();
        let expires_at = self.expires_at(edu_type, expiry);
        self.associate(
            &destinations,
            receipt,
            Association::Edu {
                edu_type,
                expires_at,
            },
        )
        .await
    }

    /// Returns up to `limit` EDUs waiting for `destination`, in queue order.
    #[tracing::instrument(skip(self, destination), fields(destination = %destination))]
    pub async fn pending_edus(
        &self,
        destination: &ServerName,
        limit: u64,
    ) -> QueueResult<BTreeMap<Receipt, Arc<E>>> {
        self.pending(EventKind::Edu, &self.edu_cache, destination, limit)
            .await
    }

    /// Acknowledges delivery of `receipts` to `destination`.
    #[tracing::instrument(skip(self, destination, receipts), fields(destination = %destination))]
    pub async fn clean_edus<'a>(
        &self,
        destination: &ServerName,
        receipts: impl IntoIterator<Item = &'a Receipt>,
    ) -> QueueResult<()> {
        self.clean(EventKind::Edu, destination, receipts).await
    }

    /// Destinations with at least one pending EDU.
    #[tracing::instrument(skip(self))]
    pub async fn pending_edu_destinations(&self) -> QueueResult<BTreeSet<ServerName>> {
        self.destinations(EventKind::Edu).await
    }

    fn expires_at(&self, edu_type: &str, expiry: Option<&ExpiryPolicy>) -> Option<i64> {
        let policy = expiry.unwrap_or(self.expiry.as_ref());
        policy
            .expires_at(edu_type, OffsetDateTime::now_utc())
            .map(to_unix_millis)
    }
}
