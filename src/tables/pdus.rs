//! PDU associations: `federation_queue_pdus`.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::MAX_NIDS_PER_STATEMENT;
use crate::entity::queue_pdus::{self, ActiveModel as PduActiveModel, Entity as PduEntity};

/// Associates a payload with a destination. Re-associating an existing pair
/// leaves the table unchanged.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    destination: &str,
    nid: i64,
) -> Result<(), DbErr> {
    let model = PduActiveModel {
        transaction_id: Set(String::new()),
        server_name: Set(destination.to_owned()),
        json_nid: Set(nid),
    };
    PduEntity::insert(model)
        .on_conflict(
            OnConflict::columns([queue_pdus::Column::ServerName, queue_pdus::Column::JsonNid])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Up to `limit` NIDs waiting for `destination`, oldest first.
pub async fn select_pending<C: ConnectionTrait>(
    db: &C,
    destination: &str,
    limit: u64,
) -> Result<Vec<i64>, DbErr> {
    PduEntity::find()
        .select_only()
        .column(queue_pdus::Column::JsonNid)
        .filter(queue_pdus::Column::ServerName.eq(destination))
        .order_by_asc(queue_pdus::Column::JsonNid)
        .limit(limit)
        .into_tuple::<i64>()
        .all(db)
        .await
}

/// Removes the named associations for `destination` only.
pub async fn delete_many<C: ConnectionTrait>(
    db: &C,
    destination: &str,
    nids: &[i64],
) -> Result<u64, DbErr> {
    let mut deleted = 0;
    for chunk in nids.chunks(MAX_NIDS_PER_STATEMENT) {
        let result = PduEntity::delete_many()
            .filter(queue_pdus::Column::ServerName.eq(destination))
            .filter(queue_pdus::Column::JsonNid.is_in(chunk.iter().copied()))
            .exec(db)
            .await?;
        deleted += result.rows_affected;
    }
    Ok(deleted)
}

/// Number of destinations still waiting for `nid`.
pub async fn reference_count<C: ConnectionTrait>(db: &C, nid: i64) -> Result<u64, DbErr> {
    PduEntity::find()
        .filter(queue_pdus::Column::JsonNid.eq(nid))
        .count(db)
        .await
}

/// Every destination with at least one pending PDU.
pub async fn select_destinations<C: ConnectionTrait>(db: &C) -> Result<Vec<String>, DbErr> {
    PduEntity::find()
        .select_only()
        .column(queue_pdus::Column::ServerName)
        .distinct()
        .into_tuple::<String>()
        .all(db)
        .await
}
