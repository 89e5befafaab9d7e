//! The payload store: `federation_queue_json`.

use std::collections::{BTreeMap, HashMap};

use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use super::MAX_NIDS_PER_STATEMENT;
use crate::entity::queue_json::{self, ActiveModel as JsonActiveModel, Entity as JsonEntity};
use crate::events::EventKind;

/// Stores `body` as a payload of `kind` and returns the NID the database
/// assigned to it.
///
/// Must run in the same transaction as the association insert that will
/// reference the new row.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    kind: EventKind,
    body: Vec<u8>,
) -> Result<i64, DbErr> {
    let model = JsonActiveModel {
        json_nid: NotSet,
        event_kind: Set(kind),
        json_body: Set(body),
    };
    let result = JsonEntity::insert(model).exec(db).await?;
    Ok(result.last_insert_id)
}

/// Locks the payload rows for `nids` until the transaction ends and returns
/// the kind of every one that still exists.
///
/// Anything that decides a payload's fate from its reference count, or adds
/// a reference to it, takes this lock first, so two such decisions about
/// one payload never overlap. Rows are locked in ascending NID order.
/// SQLite has no row locks and runs the plain select.
pub async fn lock<C: ConnectionTrait>(
    db: &C,
    nids: &[i64],
) -> Result<BTreeMap<i64, EventKind>, DbErr> {
    let mut kinds = BTreeMap::new();
    for chunk in nids.chunks(MAX_NIDS_PER_STATEMENT) {
        let rows = JsonEntity::find()
            .select_only()
            .column(queue_json::Column::JsonNid)
            .column(queue_json::Column::EventKind)
            .filter(queue_json::Column::JsonNid.is_in(chunk.iter().copied()))
            .order_by_asc(queue_json::Column::JsonNid)
            .lock_exclusive()
            .into_tuple::<(i64, EventKind)>()
            .all(db)
            .await?;
        kinds.extend(rows);
    }
    Ok(kinds)
}

/// Fetches the payloads for `nids`. Rows that no longer exist are simply
/// missing from the returned map.
pub async fn select_many<C: ConnectionTrait>(
    db: &C,
    nids: &[i64],
) -> Result<HashMap<i64, Vec<u8>>, DbErr> {
    let mut bodies = HashMap::with_capacity(nids.len());
    for chunk in nids.chunks(MAX_NIDS_PER_STATEMENT) {
        let rows = JsonEntity::find()
            .filter(queue_json::Column::JsonNid.is_in(chunk.iter().copied()))
            .all(db)
            .await?;
        bodies.extend(rows.into_iter().map(|row| (row.json_nid, row.json_body)));
    }
    Ok(bodies)
}

/// Deletes payload rows. The caller must already have established that
/// nothing references them.
pub async fn delete_many<C: ConnectionTrait>(db: &C, nids: &[i64]) -> Result<u64, DbErr> {
    let mut deleted = 0;
    for chunk in nids.chunks(MAX_NIDS_PER_STATEMENT) {
        let result = JsonEntity::delete_many()
            .filter(queue_json::Column::JsonNid.is_in(chunk.iter().copied()))
            .exec(db)
            .await?;
        deleted += result.rows_affected;
    }
    Ok(deleted)
}
