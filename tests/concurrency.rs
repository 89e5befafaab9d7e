mod common;

use federation_queue_seaorm_store::{edu_types, FederationQueueStore, ServerName, WriterMode};
use time::OffsetDateTime;

use common::*;

const PRODUCERS: u32 = 8;
const EVENTS_PER_PRODUCER: u32 = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queue_drain_clean_and_sweep_keep_payloads_consistent() {
    let store = store().await;
    let conn = store.connection().clone();
    assert_eq!(store.writer_mode(), WriterMode::Exclusive);
    let destinations = [server("a.example"), server("b.example")];

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let store = store.clone();
        let destinations = destinations.clone();
        producers.push(tokio::spawn(async move {
            for n in 0..EVENTS_PER_PRODUCER {
                store
                    .queue_pdu(&destinations, &pdu(producer * 100 + n))
                    .await
                    .unwrap();
                store
                    .queue_edu(
                        &destinations,
                        edu_types::RECEIPT,
                        &edu(edu_types::RECEIPT, destinations[0].as_str()),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let total = u64::from(PRODUCERS * EVENTS_PER_PRODUCER);
    assert_eq!(payload_count(&conn).await, total * 2);
    assert_eq!(pdu_association_count(&conn).await, total * 2);
    assert_eq!(edu_association_count(&conn).await, total * 2);

    let mut consumers = Vec::new();
    for destination in destinations.iter().cloned() {
        consumers.push(tokio::spawn(drain_pdus(store.clone(), destination.clone())));
        consumers.push(tokio::spawn(drain_edus(store.clone(), destination)));
    }
    let sweeper = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                store.sweep_expired(OffsetDateTime::now_utc()).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut delivered = 0;
    for consumer in consumers {
        delivered += consumer.await.unwrap();
    }
    sweeper.await.unwrap();

    assert_eq!(delivered, total * 4);
    assert_eq!(payload_count(&conn).await, 0);
    assert!(store.pending_destinations().await.unwrap().is_empty());
    assert_payloads_match_references(&conn).await;
    assert_eq!(store.stats().cached_pdus, 0);
    assert_eq!(store.stats().cached_edus, 0);
}

async fn drain_pdus(store: FederationQueueStore, dest: ServerName) -> u64 {
    let mut delivered = 0;
    loop {
        let batch = store.pending_pdus(&dest, 7).await.unwrap();
        if batch.is_empty() {
            return delivered;
        }
        delivered += batch.len() as u64;
        store.clean_pdus(&dest, batch.keys()).await.unwrap();
    }
}

async fn drain_edus(store: FederationQueueStore, dest: ServerName) -> u64 {
    let mut delivered = 0;
    loop {
        let batch = store.pending_edus(&dest, 7).await.unwrap();
        if batch.is_empty() {
            return delivered;
        }
        delivered += batch.len() as u64;
        store.clean_edus(&dest, batch.keys()).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cleans_of_a_shared_payload_collect_it_once() {
    let store: FederationQueueStore =
        FederationQueueStore::new(connect().await).with_writer_mode(WriterMode::Concurrent);
    let conn = store.connection().clone();
    let destinations: Vec<ServerName> = (0..4)
        .map(|n| server(&format!("dest{n}.example")))
        .collect();

    let mut receipts = Vec::new();
    for n in 0..20 {
        receipts.push(store.queue_pdu(&destinations, &pdu(n)).await.unwrap());
    }

    let mut cleaners = Vec::new();
    for destination in destinations {
        let store = store.clone();
        let receipts = receipts.clone();
        cleaners.push(tokio::spawn(async move {
            for receipt in &receipts {
                store.clean_pdus(&destination, [receipt]).await.unwrap();
            }
        }));
    }
    for cleaner in cleaners {
        cleaner.await.unwrap();
    }

    assert_eq!(pdu_association_count(&conn).await, 0);
    assert_eq!(payload_count(&conn).await, 0);
    assert_payloads_match_references(&conn).await;
}
