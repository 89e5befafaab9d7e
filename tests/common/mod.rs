#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Once;

use federation_queue_seaorm_store::entity::{queue_edus, queue_json, queue_pdus};
use federation_queue_seaorm_store::migration::{Migrator, MigratorTrait};
use federation_queue_seaorm_store::{Edu, FederationQueueStore, Pdu, Receipt, ServerName};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, EntityTrait, PaginatorTrait, QuerySelect,
};
use serde_json::json;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "federation_queue_seaorm_store=debug".into()),
            )
            .try_init();
    });
}

/// A migrated in-memory SQLite database. A single pooled connection keeps
/// every query on the same in-memory database.
pub async fn connect() -> DatabaseConnection {
    init_tracing();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let conn = Database::connect(options)
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&conn, None).await.expect("run migrations");
    conn
}

pub async fn store() -> FederationQueueStore {
    FederationQueueStore::new(connect().await)
}

pub fn server(name: &str) -> ServerName {
    ServerName::from(name)
}

pub fn pdu(n: u32) -> Pdu {
    Pdu {
        room_version: "10".to_owned(),
        event_id: format!("$event{n}:origin.example"),
        room_id: "!room:origin.example".to_owned(),
        sender: "@alice:origin.example".to_owned(),
        event_type: "m.room.message".to_owned(),
        content: json!({ "msgtype": "m.text", "body": format!("message {n}") }),
    }
}

pub fn edu(edu_type: &str, destination: &str) -> Edu {
    Edu {
        edu_type: edu_type.to_owned(),
        origin: "origin.example".to_owned(),
        destination: destination.to_owned(),
        content: json!({ "room_id": "!room:origin.example", "user_id": "@alice:origin.example" }),
    }
}

pub async fn payload_count(conn: &DatabaseConnection) -> u64 {
    queue_json::Entity::find().count(conn).await.unwrap()
}

pub async fn payload_exists(conn: &DatabaseConnection, receipt: Receipt) -> bool {
    queue_json::Entity::find_by_id(receipt.nid())
        .one(conn)
        .await
        .unwrap()
        .is_some()
}

pub async fn pdu_association_count(conn: &DatabaseConnection) -> u64 {
    queue_pdus::Entity::find().count(conn).await.unwrap()
}

pub async fn edu_association_count(conn: &DatabaseConnection) -> u64 {
    queue_edus::Entity::find().count(conn).await.unwrap()
}

/// Checks that a payload row exists exactly when something references it.
pub async fn assert_payloads_match_references(conn: &DatabaseConnection) {
    let payloads: BTreeSet<i64> = queue_json::Entity::find()
        .select_only()
        .column(queue_json::Column::JsonNid)
        .into_tuple::<i64>()
        .all(conn)
        .await
        .unwrap()
        .into_iter()
        .collect();

    let mut referenced: BTreeSet<i64> = queue_pdus::Entity::find()
        .select_only()
        .column(queue_pdus::Column::JsonNid)
        .into_tuple::<i64>()
        .all(conn)
        .await
        .unwrap()
        .into_iter()
        .collect();
    referenced.extend(
        queue_edus::Entity::find()
            .select_only()
            .column(queue_edus::Column::JsonNid)
            .into_tuple::<i64>()
            .all(conn)
            .await
            .unwrap(),
    );

    assert_eq!(payloads, referenced, "payload rows must match referenced NIDs");
}
