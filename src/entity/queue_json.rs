//! Payload entity model for Sea-ORM database interaction.
//!
//! Every queued event is serialized exactly once into this table, however
//! many destinations are waiting for it.

use sea_orm::entity::prelude::*;

use crate::events::EventKind;

/// A serialized event waiting to be sent to one or more destinations.
///
/// # Database Schema
///
/// | Column     | Type                     | Description                          |
/// |------------|--------------------------|--------------------------------------|
/// | json_nid   | BIGINT (Primary Key, AI) | Payload NID, never reused            |
/// | event_kind | TEXT                     | `pdu` or `edu`                       |
/// | json_body  | BLOB / BYTEA             | MessagePack serialized event         |
///
/// # Usage
///
/// Rows are created and deleted by
/// [`FederationQueueStore`](crate::FederationQueueStore) only; a row exists
/// exactly while an association in `federation_queue_pdus` or
/// `federation_queue_edus` references it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "federation_queue_json")]
pub struct Model {
    /// Monotonically increasing payload id assigned by the database.
    ///
    /// Wrapped in a [`Receipt`](crate::Receipt) before it reaches callers.
    #[sea_orm(primary_key)]
    pub json_nid: i64,

    /// The kind the payload was queued as.
    ///
    /// Only associations of the same kind may reference the row; a PDU body
    /// handed to the EDU drain would fail to decode.
    pub event_kind: EventKind,

    /// The encoded event. Opaque to the queue.
    pub json_body: Vec<u8>,
}

/// Required enum for Sea-ORM entity relations.
///
/// Associations reference payloads by NID without a declared foreign key,
/// so this enum is empty.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// Default active model behaviour; NIDs come from the database.
impl ActiveModelBehavior for ActiveModel {}
