mod common;

use federation_queue_seaorm_store::{edu_types, QueueError};
use sea_orm::ConnectionTrait;

use common::*;

#[tokio::test]
async fn failed_association_insert_leaves_no_payload() {
    let store = store().await;
    let conn = store.connection().clone();
    conn.execute_unprepared("DROP TABLE federation_queue_pdus")
        .await
        .unwrap();

    let err = store
        .queue_pdu([&server("remote.example")], &pdu(1))
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Backend { op: "insert_association", .. }));
    assert_eq!(payload_count(&conn).await, 0);
}

#[tokio::test]
async fn failed_edu_association_insert_leaves_no_payload() {
    let store = store().await;
    let conn = store.connection().clone();
    conn.execute_unprepared("DROP TABLE federation_queue_edus")
        .await
        .unwrap();

    let err = store
        .queue_edu(
            [&server("remote.example")],
            edu_types::TYPING,
            &edu(edu_types::TYPING, "remote.example"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Backend { op: "insert_association", .. }));
    assert_eq!(payload_count(&conn).await, 0);
}

#[tokio::test]
async fn clean_failing_midway_keeps_association_payload_and_cache() {
    let store = store().await;
    let conn = store.connection().clone();
    let dest = server("remote.example");
    let receipt = store.queue_pdu([&dest], &pdu(1)).await.unwrap();
    store.pending_pdus(&dest, 10).await.unwrap();
    assert_eq!(store.stats().cached_pdus, 1);

    // The association delete succeeds, then counting EDU references fails.
    conn.execute_unprepared(
        "ALTER TABLE federation_queue_edus RENAME TO federation_queue_edus_moved",
    )
    .await
    .unwrap();
    let err = store.clean_pdus(&dest, [&receipt]).await.unwrap_err();
    assert!(matches!(err, QueueError::Backend { op: "reference_count", .. }));

    assert_eq!(pdu_association_count(&conn).await, 1);
    assert!(payload_exists(&conn, receipt).await);
    assert_eq!(store.stats().cached_pdus, 1);

    conn.execute_unprepared(
        "ALTER TABLE federation_queue_edus_moved RENAME TO federation_queue_edus",
    )
    .await
    .unwrap();
    store.clean_pdus(&dest, [&receipt]).await.unwrap();
    assert_eq!(payload_count(&conn).await, 0);
    assert_eq!(store.stats().cached_pdus, 0);
}
