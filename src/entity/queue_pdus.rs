//! PDU association entity model.

use sea_orm::entity::prelude::*;

/// One PDU payload that still has to reach one destination.
///
/// The composite primary key makes associating the same payload with the
/// same destination twice a no-op.
///
/// # Database Schema
///
/// | Column         | Type            | Description                          |
/// |----------------|-----------------|--------------------------------------|
/// | transaction_id | TEXT            | Reserved for batching, always empty  |
/// | server_name    | TEXT (PK)       | Destination server                   |
/// | json_nid       | BIGINT (PK)     | Payload in `federation_queue_json`   |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "federation_queue_pdus")]
pub struct Model {
    /// Batch the row was sent in. Always empty; kept for schema
    /// compatibility with transaction-based senders.
    #[sea_orm(column_type = "Text")]
    pub transaction_id: String,

    /// Destination server name, e.g. `example.org:8448`.
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub server_name: String,

    /// NID of the payload row in `federation_queue_json`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub json_nid: i64,
}

/// Required enum for Sea-ORM entity relations. The payload is looked up by
/// NID, not through a declared relation.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// Default active model behaviour.
impl ActiveModelBehavior for ActiveModel {}
