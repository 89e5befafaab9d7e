//! EDU association entity model.

use sea_orm::entity::prelude::*;

/// One EDU payload that still has to reach one destination.
///
/// # Database Schema
///
/// | Column      | Type            | Description                                    |
/// |-------------|-----------------|------------------------------------------------|
/// | edu_type    | TEXT            | EDU type, e.g. `m.typing`                      |
/// | server_name | TEXT (PK)       | Destination server                             |
/// | json_nid    | BIGINT (PK)     | Payload in `federation_queue_json`             |
/// | expires_at  | BIGINT NULL     | Unix milliseconds; `NULL` means never expire   |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "federation_queue_edus")]
pub struct Model {
    /// The EDU type the expiry was computed from, e.g. `m.typing`.
    #[sea_orm(column_type = "Text")]
    pub edu_type: String,

    /// Destination server name, e.g. `example.org:8448`.
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub server_name: String,

    /// NID of the payload row in `federation_queue_json`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub json_nid: i64,

    /// After this instant the association is swept whether or not it was
    /// delivered.
    pub expires_at: Option<i64>,
}

/// Required enum for Sea-ORM entity relations. The payload is looked up by
/// NID, not through a declared relation.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// Default active model behaviour.
impl ActiveModelBehavior for ActiveModel {}
