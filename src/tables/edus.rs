//! EDU associations: `federation_queue_edus`.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::MAX_NIDS_PER_STATEMENT;
use crate::entity::queue_edus::{self, ActiveModel as EduActiveModel, Entity as EduEntity};

/// Associates a payload with a destination. If the pair already exists the
/// original row, including its expiry, is kept.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    destination: &str,
    nid: i64,
    edu_type: &str,
    expires_at: Option<i64>,
) -> Result<(), DbErr> {
    let model = EduActiveModel {
        edu_type: Set(edu_type.to_owned()),
        server_name: Set(destination.to_owned()),
        json_nid: Set(nid),
        expires_at: Set(expires_at),
    };
    EduEntity::insert(model)
        .on_conflict(
            OnConflict::columns([queue_edus::Column::ServerName, queue_edus::Column::JsonNid])
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
    EduEntity::find()
        .select_only()
        .column(queue_edus::Column::JsonNid)
        .filter(queue_edus::Column::ServerName.eq(destination))
        .order_by_asc(queue_edus::Column::JsonNid)
        .limit(limit)
        .into_tuple::<i64>()
        .all(db)
        .await
}

pub async fn delete_many<C: ConnectionTrait>(
    db: &C,
    destination: &str,
    nids: &[i64],
) -> Result<u64, DbErr> {
    let mut deleted = 0;
    for chunk in nids.chunks(MAX_NIDS_PER_STATEMENT) {
        let result = EduEntity::delete_many()
            .filter(queue_edus::Column::ServerName.eq(destination))
            .filter(queue_edus::Column::JsonNid.is_in(chunk.iter().copied()))
            .exec(db)
            .await?;
        deleted += result.rows_affected;
    }
    Ok(deleted)
}

pub async fn reference_count<C: ConnectionTrait>(db: &C, nid: i64) -> Result<u64, DbErr> {
    EduEntity::find()
        .filter(queue_edus::Column::JsonNid.eq(nid))
        .count(db)
        .await
}

pub async fn select_destinations<C: ConnectionTrait>(db: &C) -> Result<Vec<String>, DbErr> {
    EduEntity::find()
        .select_only()
        .column(queue_edus::Column::ServerName)
        .distinct()
        .into_tuple::<String>()
        .all(db)
        .await
}

/// NIDs with at least one association whose expiry is before `cutoff`
/// (unix milliseconds). Associations without an expiry never match.
pub async fn select_expired<C: ConnectionTrait>(db: &C, cutoff: i64) -> Result<Vec<i64>, DbErr> {
    EduEntity::find()
        .select_only()
        .column(queue_edus::Column::JsonNid)
        .filter(queue_edus::Column::ExpiresAt.is_not_null())
        .filter(queue_edus::Column::ExpiresAt.lt(cutoff))
        .distinct()
        .order_by_asc(queue_edus::Column::JsonNid)
        .into_tuple::<i64>()
        .all(db)
        .await
}

/// Deletes the associations of `nids` whose expiry is before `cutoff`.
///
/// Restricting the delete to NIDs the caller already selected keeps it from
/// removing rows that expired in between, whose payloads the caller would
/// then not know to collect.
pub async fn delete_expired<C: ConnectionTrait>(
    db: &C,
    cutoff: i64,
    nids: &[i64],
) -> Result<u64, DbErr> {
    let mut deleted = 0;
    for chunk in nids.chunks(MAX_NIDS_PER_STATEMENT) {
        let result = EduEntity::delete_many()
            .filter(queue_edus::Column::JsonNid.is_in(chunk.iter().copied()))
            .filter(queue_edus::Column::ExpiresAt.is_not_null())
            .filter(queue_edus::Column::ExpiresAt.lt(cutoff))
            .exec(db)
            .await?;
        deleted += result.rows_affected;
    }
    Ok(deleted)
}
