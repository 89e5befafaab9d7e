//! Row-level operations on the three queue tables.
//!
//! Everything here runs against any [`ConnectionTrait`], so the same
//! functions serve a bare connection and an open [`WriteTxn`](crate::writer::WriteTxn).
//! Composing them into atomic units is the queue store's job.

use sea_orm::{ConnectionTrait, DbErr};

use crate::events::EventKind;

pub mod edus;
pub mod json;
pub mod pdus;

/// Most NIDs bound into one `IN (...)` list. Longer lists are split into
/// several statements so large receipt sets stay under SQLite's bound
/// parameter limit.
pub const MAX_NIDS_PER_STATEMENT: usize = 500;

pub async fn select_pending<C: ConnectionTrait>(
    db: &C,
    kind: EventKind,
    destination: &str,
    limit: u64,
) -> Result<Vec<i64>, DbErr> {
    match kind {
        EventKind::Pdu => pdus::select_pending(db, destination, limit).await,
        EventKind::Edu => edus::select_pending(db, destination, limit).await,
    }
}

pub async fn delete_many<C: ConnectionTrait>(
    db: &C,
    kind: EventKind,
    destination: &str,
    nids: &[i64],
) -> Result<u64, DbErr> {
    match kind {
        EventKind::Pdu => pdus::delete_many(db, destination, nids).await,
        EventKind::Edu => edus::delete_many(db, destination, nids).await,
    }
}

pub async fn select_destinations<C: ConnectionTrait>(
    db: &C,
    kind: EventKind,
) -> Result<Vec<String>, DbErr> {
    match kind {
        EventKind::Pdu => pdus::select_destinations(db).await,
        EventKind::Edu => edus::select_destinations(db).await,
    }
}

/// References to `nid` from both association tables.
///
/// A payload may only be deleted once this reaches zero; counting one table
/// alone would let a PDU clean delete a payload an EDU still points at.
pub async fn reference_count<C: ConnectionTrait>(db: &C, nid: i64) -> Result<u64, DbErr> {
    Ok(pdus::reference_count(db, nid).await? + edus::reference_count(db, nid).await?)
}

/// The subset of `nids` that nothing references any more.
pub async fn unreferenced<C: ConnectionTrait>(db: &C, nids: &[i64]) -> Result<Vec<i64>, DbErr> {
    let mut orphans = Vec::new();
    for &nid in nids {
        if reference_count(db, nid).await? == 0 {
            orphans.push(nid);
        }
    }
    Ok(orphans)
}
