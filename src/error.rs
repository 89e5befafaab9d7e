//! Error types returned by the queue store.

use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced by [`FederationQueueStore`](crate::FederationQueueStore).
///
/// Every error aborts the atomic unit it occurred in; nothing partially
/// applied is ever left visible.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `clean_*` was called without any receipts.
    #[error("expected at least one receipt")]
    EmptyReceipts,

    /// A payload was queued without any destination to reference it.
    #[error("expected at least one destination")]
    NoDestinations,

    /// A receipt was used to associate destinations after its payload had
    /// already been garbage collected.
    #[error("payload for {0} no longer exists")]
    UnknownReceipt(crate::Receipt),

    /// A receipt for one event kind was used to queue the other kind, e.g. a
    /// PDU payload associated with EDU destinations.
    #[error("{receipt} holds a {stored} payload, not a {expected}")]
    WrongKind {
        receipt: crate::Receipt,
        /// The kind the operation works on.
        expected: crate::EventKind,
        /// The kind the payload was queued as.
        stored: crate::EventKind,
    },

    /// The database rejected or failed a sub-operation.
    #[error("{op}: {source}")]
    Backend {
        /// The table operation that failed, e.g. `select_pending`.
        op: &'static str,
        #[source]
        source: DbErr,
    },

    /// An event could not be serialized for storage.
    #[error("failed to encode queued event: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A stored payload could not be deserialized. This indicates a corrupt
    /// row and is never retried by the store.
    #[error("failed to decode queued payload {nid}: {source}")]
    Decode {
        /// NID of the offending payload row.
        nid: i64,
        #[source]
        source: rmp_serde::decode::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type QueueResult<T> = Result<T, QueueError>;

/// Attaches the name of the failing table operation to a [`DbErr`].
pub(crate) fn backend(op: &'static str) -> impl FnOnce(DbErr) -> QueueError {
    move |source| QueueError::Backend { op, source }
}
