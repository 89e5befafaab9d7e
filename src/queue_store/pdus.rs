//! PDU half of the queue.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{Association, FederationQueueStore};
use crate::error::QueueResult;
use crate::events::{EventKind, QueuePayload, ServerName};
use crate::receipt::Receipt;

impl<P, E> FederationQueueStore<P, E>
where
    P: QueuePayload,
    E: QueuePayload,
{
    /// Stores a room event and queues it for every destination.
    ///
    /// The payload and all associations are written in one atomic unit, so
    /// the payload is never visible without a destination referencing it.
    /// Fails with [`QueueError::NoDestinations`](crate::QueueError::NoDestinations)
    /// if `destinations` is empty.
    #[tracing::instrument(skip_all)]
    pub async fn queue_pdu<'a>(
        &self,
        destinations: impl IntoIterator<Item = &'a ServerName>,
        event: &P,
    ) -> QueueResult<Receipt> {
        let destinations: Vec<&ServerName> = destinations.into_iter().collect();
        self.store_and_associate(&destinations, event, Association::Pdu)
            .await
    }

    /// Queues an already stored PDU payload for more destinations.
    ///
    /// Re-associating a destination that is already waiting for the payload
    /// is a no-op. Either every destination is associated or, on error,
    /// none is. `receipt` must come from [`queue_pdu`](Self::queue_pdu);
    /// an EDU receipt fails with
    /// [`QueueError::WrongKind`](crate::QueueError::WrongKind).
    #[tracing::instrument(skip_all, fields(nid = receipt.nid()))]
    pub async fn associate_pdu_with_destinations<'a>(
        &self,
        destinations: impl IntoIterator<Item = &'a ServerName>,
        receipt: Receipt,
    ) -> QueueResult<()> {
        let destinations: Vec<&ServerName> = destinations.into_iter().collect();
        self.associate(&destinations, receipt, Association::Pdu)
            .await
    }

    /// Returns up to `limit` PDUs waiting for `destination`, in queue order.
    ///
    /// Payloads deleted by a concurrent clean between the select and the
    /// fetch are left out rather than reported as errors. A payload that
    /// cannot be decoded fails the whole call.
    #[tracing::instrument(skip(self, destination), fields(destination = %destination))]
    pub async fn pending_pdus(
        &self,
        destination: &ServerName,
        limit: u64,
    ) -> QueueResult<BTreeMap<Receipt, Arc<P>>> {
        self.pending(EventKind::Pdu, &self.pdu_cache, destination, limit)
            .await
    }

    /// Acknowledges delivery of `receipts` to `destination`.
    ///
    /// Payloads left without any association are deleted and evicted from
    /// the cache once the transaction has committed. An empty `receipts`
    /// fails with [`QueueError::EmptyReceipts`](crate::QueueError::EmptyReceipts)
    /// before touching the database.
    #[tracing::instrument(skip(self, destination, receipts), fields(destination = %destination))]
    pub async fn clean_pdus<'a>(
        &self,
        destination: &ServerName,
        receipts: impl IntoIterator<Item = &'a Receipt>,
    ) -> QueueResult<()> {
        self.clean(EventKind::Pdu, destination, receipts).await
    }

    /// Destinations with at least one pending PDU.
    #[tracing::instrument(skip(self))]
    pub async fn pending_pdu_destinations(&self) -> QueueResult<BTreeSet<ServerName>> {
        self.destinations(EventKind::Pdu).await
    }
}
