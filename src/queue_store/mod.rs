use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{debug, warn};

use crate::cache::{NidCache, DEFAULT_CACHE_CAPACITY};
use crate::error::{backend, QueueError, QueueResult};
use crate::events::{decode, encode, Edu, EventKind, Pdu, QueuePayload, ServerName};
use crate::expiry::ExpiryPolicy;
use crate::receipt::Receipt;
use crate::tables;
use crate::writer::{WriteTxn, Writer, WriterMode};

mod edus;
mod pdus;
mod sweep;

pub use sweep::ExpiredEduDeletion;

/// The outbound federation queue, backed by Sea-ORM.
///
/// Each queued event is serialized once into `federation_queue_json` and then
/// referenced from `federation_queue_pdus` or `federation_queue_edus` by every
/// destination that still needs it. The sender drains a destination with
/// [`pending_pdus`](Self::pending_pdus) / [`pending_edus`](Self::pending_edus)
/// and acknowledges delivery with [`clean_pdus`](Self::clean_pdus) /
/// [`clean_edus`](Self::clean_edus); the payload row disappears together with
/// its last association.
///
/// Delivery is at-least-once: anything drained but not cleaned is returned
/// again by the next drain.
///
/// # Usage
///
/// ```no_run
/// use federation_queue_seaorm_store::{FederationQueueStore, ServerName};
/// use federation_queue_seaorm_store::migration::{Migrator, MigratorTrait};
/// use sea_orm::Database;
///
/// # async fn example(pdu: federation_queue_seaorm_store::Pdu) -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Database::connect("sqlite://queue.db?mode=rwc").await?;
/// Migrator::up(&conn, None).await?;
///
/// let store: FederationQueueStore = FederationQueueStore::new(conn);
/// let remote = ServerName::from("remote.example");
///
/// store.queue_pdu([&remote], &pdu).await?;
///
/// let batch = store.pending_pdus(&remote, 50).await?;
/// // ... send the transaction ...
/// store.clean_pdus(&remote, batch.keys()).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Error Handling
///
/// - Database errors → [`QueueError::Backend`], naming the failed step
/// - Serialization errors → [`QueueError::Encode`]
/// - Corrupt payloads → [`QueueError::Decode`], failing the whole drain
/// - A PDU receipt used for EDU destinations, or the reverse →
///   [`QueueError::WrongKind`]
pub struct FederationQueueStore<P = Pdu, E = Edu> {
    conn: DatabaseConnection,
    writer: Arc<Writer>,
    pdu_cache: Arc<NidCache<P>>,
    edu_cache: Arc<NidCache<E>>,
    expiry: Arc<ExpiryPolicy>,
    decoded: Arc<DecodeCounters>,
}

/// Point-in-time counters, mostly useful to tests and metrics exporters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// PDU payloads deserialized from the database.
    pub pdus_decoded: u64,
    /// EDU payloads deserialized from the database.
    pub edus_decoded: u64,
    /// PDU drains answered from the cache, counted per NID.
    pub pdu_cache_hits: u64,
    /// PDU drains that had to read the payload table, counted per NID.
    pub pdu_cache_misses: u64,
    /// EDU drains answered from the cache, counted per NID.
    pub edu_cache_hits: u64,
    /// EDU drains that had to read the payload table, counted per NID.
    pub edu_cache_misses: u64,
    /// Decoded PDUs currently held in the cache.
    pub cached_pdus: usize,
    /// Decoded EDUs currently held in the cache.
    pub cached_edus: usize,
}

#[derive(Debug, Default)]
struct DecodeCounters {
    pdus: AtomicU64,
    edus: AtomicU64,
}

impl DecodeCounters {
    fn record(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Pdu => &self.pdus,
            EventKind::Edu => &self.edus,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What kind of association row a queue operation writes.
enum Association<'a> {
    Pdu,
    Edu {
        edu_type: &'a str,
        expires_at: Option<i64>,
    },
}

impl Association<'_> {
    fn kind(&self) -> EventKind {
        match self {
            Association::Pdu => EventKind::Pdu,
            Association::Edu { .. } => EventKind::Edu,
        }
    }
}

impl<P, E> FederationQueueStore<P, E>
where
    P: QueuePayload,
    E: QueuePayload,
{
    /// Creates a queue store over an already migrated connection.
    ///
    /// The writer mode follows the backend (exclusive for SQLite), caches
    /// hold [`DEFAULT_CACHE_CAPACITY`] entries per event kind and EDUs use
    /// [`ExpiryPolicy::default`].
    pub fn new(conn: DatabaseConnection) -> Self {
        let mode = WriterMode::for_backend(conn.get_database_backend());
        Self {
            conn,
            writer: Arc::new(Writer::new(mode)),
            pdu_cache: Arc::new(NidCache::new(DEFAULT_CACHE_CAPACITY)),
            edu_cache: Arc::new(NidCache::new(DEFAULT_CACHE_CAPACITY)),
            expiry: Arc::new(ExpiryPolicy::default()),
            decoded: Arc::new(DecodeCounters::default()),
        }
    }

    /// Forces a writer mode, e.g. [`WriterMode::Exclusive`] on a Postgres
    /// deployment that must not run queue transactions in parallel.
    pub fn with_writer_mode(mut self, mode: WriterMode) -> Self {
        self.writer = Arc::new(Writer::new(mode));
        self
    }

    /// Sets how many decoded events are cached per event kind.
    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.pdu_cache = Arc::new(NidCache::new(capacity));
        self.edu_cache = Arc::new(NidCache::new(capacity));
        self
    }

    /// Replaces the expiry policy applied to EDUs queued without an explicit
    /// per-call policy.
    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry = Arc::new(policy);
        self
    }

    /// The connection the store was created with.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// How atomic units are scheduled, see [`WriterMode`].
    pub fn writer_mode(&self) -> WriterMode {
        self.writer.mode()
    }

    /// The policy applied to EDUs queued without a per-call policy.
    pub fn expiry_policy(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    /// A snapshot of the decode and cache counters. Clones of the store
    /// share one set of counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pdus_decoded: self.decoded.pdus.load(Ordering::Relaxed),
            edus_decoded: self.decoded.edus.load(Ordering::Relaxed),
            pdu_cache_hits: self.pdu_cache.hits(),
            pdu_cache_misses: self.pdu_cache.misses(),
            edu_cache_hits: self.edu_cache.hits(),
            edu_cache_misses: self.edu_cache.misses(),
            cached_pdus: self.pdu_cache.len(),
            cached_edus: self.edu_cache.len(),
        }
    }

    /// Every destination with at least one pending PDU or EDU.
    #[tracing::instrument(skip(self))]
    pub async fn pending_destinations(&self) -> QueueResult<BTreeSet<ServerName>> {
        let mut destinations = self.destinations(EventKind::Pdu).await?;
        destinations.extend(self.destinations(EventKind::Edu).await?);
        Ok(destinations)
    }

    async fn destinations(&self, kind: EventKind) -> QueueResult<BTreeSet<ServerName>> {
        let names = tables::select_destinations(&self.conn, kind)
            .await
            .map_err(backend("select_destinations"))?;
        Ok(names.into_iter().map(ServerName::from).collect())
    }

    async fn begin(&self) -> QueueResult<WriteTxn<'_>> {
        self.writer.begin(&self.conn).await.map_err(backend("begin"))
    }

    /// Stores `event` and associates it with every destination in one
    /// atomic unit.
    async fn store_and_associate<T: QueuePayload>(
        &self,
        destinations: &[&ServerName],
        event: &T,
        association: Association<'_>,
    ) -> QueueResult<Receipt> {
        if destinations.is_empty() {
            return Err(QueueError::NoDestinations);
        }
        let body = encode(event)?;

        let txn = self.begin().await?;
        let nid = tables::json::insert(txn.conn(), association.kind(), body)
            .await
            .map_err(backend("insert_queue_json"))?;
        insert_associations(txn.conn(), &association, destinations, nid)
            .await
            .map_err(backend("insert_association"))?;
        txn.commit().await.map_err(backend("commit"))?;

        debug!(
            kind = %association.kind(),
            nid,
            destinations = destinations.len(),
            "queued payload"
        );
        Ok(Receipt::new(nid))
    }

    /// Adds destinations to an already stored payload of the same kind. All
    /// destinations are associated or none are.
    async fn associate(
        &self,
        destinations: &[&ServerName],
        receipt: Receipt,
        association: Association<'_>,
    ) -> QueueResult<()> {
        if destinations.is_empty() {
            return Ok(());
        }

        let txn = self.begin().await?;
        // The lock keeps a concurrent clean from collecting the payload
        // between this check and the insert.
        let stored = tables::json::lock(txn.conn(), &[receipt.nid()])
            .await
            .map_err(backend("lock_queue_json"))?;
        let expected = association.kind();
        match stored.get(&receipt.nid()) {
            None => return Err(QueueError::UnknownReceipt(receipt)),
            Some(&stored) if stored != expected => {
                return Err(QueueError::WrongKind {
                    receipt,
                    expected,
                    stored,
                })
            }
            Some(_) => {}
        }
        insert_associations(txn.conn(), &association, destinations, receipt.nid())
            .await
            .map_err(backend("insert_association"))?;
        txn.commit().await.map_err(backend("commit"))?;

        debug!(
            kind = %association.kind(),
            nid = receipt.nid(),
            destinations = destinations.len(),
            "associated payload"
        );
        Ok(())
    }

    /// Reads up to `limit` pending events for `destination`, serving what it
    /// can from `cache` and decoding the rest.
    async fn pending<T: QueuePayload>(
        &self,
        kind: EventKind,
        cache: &Arc<NidCache<T>>,
        destination: &ServerName,
        limit: u64,
    ) -> QueueResult<BTreeMap<Receipt, Arc<T>>> {
        let mut events = BTreeMap::new();
        if limit == 0 {
            return Ok(events);
        }

        // Only selects happen here, but going through the writer keeps the
        // pending list and the payload fetch consistent with each other.
        let mut txn = self.begin().await?;
        let nids = tables::select_pending(txn.conn(), kind, destination.as_str(), limit)
            .await
            .map_err(backend("select_pending"))?;

        let mut retrieve = Vec::with_capacity(nids.len());
        for nid in nids {
            match cache.get(nid) {
                Some(event) => {
                    events.insert(Receipt::new(nid), event);
                }
                None => retrieve.push(nid),
            }
        }

        let blobs = tables::json::select_many(txn.conn(), &retrieve)
            .await
            .map_err(backend("select_queue_json"))?;
        if blobs.len() < retrieve.len() {
            warn!(
                %kind,
                %destination,
                missing = retrieve.len() - blobs.len(),
                "pending payloads vanished before they could be read"
            );
        }

        let mut fetched = Vec::with_capacity(blobs.len());
        for (nid, blob) in blobs {
            let event = Arc::new(decode::<T>(nid, &blob)?);
            self.decoded.record(kind);
            fetched.push((nid, Arc::clone(&event)));
            events.insert(Receipt::new(nid), event);
        }

        let decoded = fetched.len();
        let cache = Arc::clone(cache);
        txn.after_commit(move || {
            for (nid, event) in fetched {
                cache.insert(nid, event);
            }
        });
        txn.commit().await.map_err(backend("commit"))?;

        debug!(%kind, %destination, events = events.len(), decoded, "drained destination");
        Ok(events)
    }

    /// Removes `destination`'s associations for `receipts` and garbage
    /// collects payloads nothing references any more.
    async fn clean<'a>(
        &self,
        kind: EventKind,
        destination: &ServerName,
        receipts: impl IntoIterator<Item = &'a Receipt>,
    ) -> QueueResult<()> {
        let nids: Vec<i64> = receipts
            .into_iter()
            .map(Receipt::nid)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if nids.is_empty() {
            return Err(QueueError::EmptyReceipts);
        }

        let mut txn = self.begin().await?;
        // Counting references is only sound while nobody else can add or
        // drop one for the same payloads.
        let present: Vec<i64> = tables::json::lock(txn.conn(), &nids)
            .await
            .map_err(backend("lock_queue_json"))?
            .into_keys()
            .collect();
        let removed = tables::delete_many(txn.conn(), kind, destination.as_str(), &nids)
            .await
            .map_err(backend("delete_associations"))?;
        let orphans = tables::unreferenced(txn.conn(), &present)
            .await
            .map_err(backend("reference_count"))?;
        tables::json::delete_many(txn.conn(), &orphans)
            .await
            .map_err(backend("delete_queue_json"))?;

        let payloads = orphans.len();
        self.evict_after_commit(&mut txn, orphans);
        txn.commit().await.map_err(backend("commit"))?;

        debug!(%kind, %destination, removed, payloads, "cleaned delivered events");
        Ok(())
    }

    /// Drops cached copies of deleted payloads once the delete is durable.
    fn evict_after_commit(&self, txn: &mut WriteTxn<'_>, nids: Vec<i64>) {
        if nids.is_empty() {
            return;
        }
        let pdu_cache = Arc::clone(&self.pdu_cache);
        let edu_cache = Arc::clone(&self.edu_cache);
        txn.after_commit(move || {
            for nid in nids {
                pdu_cache.evict(nid);
                edu_cache.evict(nid);
            }
        });
    }
}

async fn insert_associations<C: ConnectionTrait>(
    db: &C,
    association: &Association<'_>,
    destinations: &[&ServerName],
    nid: i64,
) -> Result<(), DbErr> {
    for destination in destinations {
        match association {
            Association::Pdu => tables::pdus::insert(db, destination.as_str(), nid).await?,
            Association::Edu {
                edu_type,
                expires_at,
            } => {
                tables::edus::insert(db, destination.as_str(), nid, edu_type, *expires_at).await?
            }
        }
    }
    Ok(())
}

impl<P, E> Clone for FederationQueueStore<P, E> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            writer: Arc::clone(&self.writer),
            pdu_cache: Arc::clone(&self.pdu_cache),
            edu_cache: Arc::clone(&self.edu_cache),
            expiry: Arc::clone(&self.expiry),
            decoded: Arc::clone(&self.decoded),
        }
    }
}

impl<P, E> Debug for FederationQueueStore<P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationQueueStore")
            .field("backend", &self.conn.get_database_backend())
            .field("writer", &self.writer)
            .field("pdu_cache", &self.pdu_cache)
            .field("edu_cache", &self.edu_cache)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
