use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionSession, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ids,
    position::{clamp_position, next_after, plan_insertion, plan_removal, plan_reorder, Shift},
    task::Task,
};
use crate::{
    entities::{board, column, task},
    retry::retry_on_sqlite_busy,
};

#[derive(Debug, Error)]
pub enum ColumnError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Column not found")]
    ColumnNotFound,
    #[error("Board not found")]
    BoardNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ColumnWithTasks {
    #[serde(flatten)]
    #[ts(flatten)]
    pub column: Column,
    pub tasks: Vec<Task>,
}

impl std::ops::Deref for ColumnWithTasks {
    type Target = Column;
    fn deref(&self) -> &Self::Target {
        &self.column
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateColumn {
    pub board_id: Uuid,
    pub name: String,
    /// Appended after the last column when omitted.
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct UpdateColumn {
    pub name: Option<String>,
}

/// What a committed column move did, for logging.
#[derive(Debug, Clone, Copy)]
struct ColumnMove {
    old_position: i32,
    new_position: i32,
    requested: i32,
}

impl Column {
    fn from_parts(model: column::Model, board_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            board_id,
            name: model.name,
            position: model.position,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    async fn from_model<C: ConnectionTrait>(db: &C, model: column::Model) -> Result<Self, DbErr> {
        let board_id = ids::board_uuid_by_id(db, model.board_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Board not found".to_string()))?;
        Ok(Self::from_parts(model, board_id))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = column::Entity::find()
            .filter(column::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_id_with_tasks<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<ColumnWithTasks>, DbErr> {
        let Some(column) = Self::find_by_id(db, id).await? else {
            return Ok(None);
        };
        let tasks = Task::find_by_column_id(db, id).await?;
        Ok(Some(ColumnWithTasks { column, tasks }))
    }

    /// Columns of a board ordered by position. Empty for an unknown board.
    pub async fn find_by_board_id<C: ConnectionTrait>(
        db: &C,
        board_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(board_row_id) = ids::board_id_by_uuid(db, board_id).await? else {
            return Ok(Vec::new());
        };
        let records = column::Entity::find()
            .filter(column::Column::BoardId.eq(board_row_id))
            .order_by_asc(column::Column::Position)
            .order_by_asc(column::Column::Id)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_parts(model, board_id))
            .collect())
    }

    /// Columns of a board with their tasks, both ordered by position.
    pub async fn find_by_board_id_with_tasks<C: ConnectionTrait>(
        db: &C,
        board_id: Uuid,
    ) -> Result<Vec<ColumnWithTasks>, DbErr> {
        let Some(board_row_id) = ids::board_id_by_uuid(db, board_id).await? else {
            return Ok(Vec::new());
        };
        let columns = column::Entity::find()
            .filter(column::Column::BoardId.eq(board_row_id))
            .order_by_asc(column::Column::Position)
            .order_by_asc(column::Column::Id)
            .all(db)
            .await?;
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let column_row_ids: Vec<i64> = columns.iter().map(|c| c.id).collect();
        let task_models = task::Entity::find()
            .filter(task::Column::ColumnId.is_in(column_row_ids))
            .order_by_asc(task::Column::Position)
            .order_by_asc(task::Column::Id)
            .all(db)
            .await?;

        let column_uuids: HashMap<i64, Uuid> = columns.iter().map(|c| (c.id, c.uuid)).collect();
        let mut tasks_by_column: HashMap<i64, Vec<Task>> = HashMap::new();
        for model in task_models {
            let column_row_id = model.column_id;
            let Some(column_uuid) = column_uuids.get(&column_row_id).copied() else {
                continue;
            };
            tasks_by_column
                .entry(column_row_id)
                .or_default()
                .push(Task::from_parts(model, column_uuid)?);
        }

        Ok(columns
            .into_iter()
            .map(|model| {
                let tasks = tasks_by_column.remove(&model.id).unwrap_or_default();
                ColumnWithTasks {
                    column: Self::from_parts(model, board_id),
                    tasks,
                }
            })
            .collect())
    }

    /// Position a column appended to the board would get.
    pub async fn next_position<C: ConnectionTrait>(
        db: &C,
        board_id: Uuid,
    ) -> Result<i32, ColumnError> {
        let board_row_id = ids::board_id_by_uuid(db, board_id)
            .await?
            .ok_or(ColumnError::BoardNotFound)?;
        Ok(next_after(max_position(db, board_row_id).await?))
    }

    pub async fn create<C>(db: &C, data: &CreateColumn) -> Result<Self, ColumnError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let column_id = Uuid::new_v4();
        let created = retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            // Touching the board takes the write lock before the board's
            // positions are read.
            let claimed = board::Entity::update_many()
                .col_expr(board::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(board::Column::Uuid.eq(data.board_id))
                .exec(&tx)
                .await?;
            if claimed.rows_affected == 0 {
                return Ok(None);
            }
            let Some(board_row_id) = ids::board_id_by_uuid(&tx, data.board_id).await? else {
                return Ok(None);
            };

            let next = next_after(max_position(&tx, board_row_id).await?);
            let position = match data.position {
                Some(requested) => {
                    let position = clamp_position(requested, next);
                    if position != requested {
                        tracing::warn!(
                            board_id = %data.board_id,
                            requested,
                            position,
                            "Column position out of range, clamped"
                        );
                    }
                    if position < next {
                        shift_board(&tx, board_row_id, plan_insertion(position)).await?;
                    }
                    position
                }
                None => next,
            };

            let now = Utc::now();
            let model = column::ActiveModel {
                uuid: Set(column_id),
                board_id: Set(board_row_id),
                name: Set(data.name.trim().to_string()),
                position: Set(position),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&tx)
            .await?;

            tx.commit().await?;
            Ok(Some(model))
        })
        .await?;

        let model = created.ok_or(ColumnError::BoardNotFound)?;
        Ok(Self::from_parts(model, data.board_id))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateColumn,
    ) -> Result<Self, ColumnError> {
        let record = column::Entity::find()
            .filter(column::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(ColumnError::ColumnNotFound)?;

        let mut active: column::ActiveModel = record.into();
        if let Some(name) = &data.name {
            active.name = Set(name.trim().to_string());
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        Ok(Self::from_model(db, updated).await?)
    }

    /// Deletes the column (its tasks cascade) and closes the gap it leaves.
    pub async fn delete<C>(db: &C, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            if claim_column(&tx, id).await? == 0 {
                return Ok(0);
            }
            let Some(model) = column::Entity::find()
                .filter(column::Column::Uuid.eq(id))
                .one(&tx)
                .await?
            else {
                return Ok(0);
            };

            let result = column::Entity::delete_by_id(model.id).exec(&tx).await?;
            shift_board(&tx, model.board_id, plan_removal(model.position)).await?;
            tx.commit().await?;
            Ok(result.rows_affected)
        })
        .await
    }

    /// Moves a column to `new_position` within its board.
    ///
    /// Out-of-range positions are clamped to `[0, columns - 1]`. All sibling
    /// shifts and the final assignment commit together or not at all.
    pub async fn reposition<C>(
        db: &C,
        id: Uuid,
        new_position: i32,
    ) -> Result<ColumnWithTasks, ColumnError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let moved = retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            let Some(moved) = reposition_in(&tx, id, new_position).await? else {
                return Ok(None);
            };
            tx.commit().await?;
            Ok(Some(moved))
        })
        .await?;

        let moved = moved.ok_or(ColumnError::ColumnNotFound)?;
        if moved.new_position != moved.requested {
            tracing::warn!(
                column_id = %id,
                requested = moved.requested,
                position = moved.new_position,
                "Column position out of range, clamped"
            );
        }
        tracing::debug!(
            column_id = %id,
            from = moved.old_position,
            to = moved.new_position,
            "Repositioned column"
        );

        Self::find_by_id_with_tasks(db, id)
            .await?
            .ok_or(ColumnError::ColumnNotFound)
    }
}

/// Runs one column move on an open transaction. `None` when the column is gone.
async fn reposition_in<C: ConnectionTrait>(
    tx: &C,
    id: Uuid,
    requested: i32,
) -> Result<Option<ColumnMove>, DbErr> {
    if claim_column(tx, id).await? == 0 {
        return Ok(None);
    }

    let model = column::Entity::find()
        .filter(column::Column::Uuid.eq(id))
        .one(tx)
        .await?
        .ok_or(DbErr::RecordNotFound("Column not found".to_string()))?;

    let count = column::Entity::find()
        .filter(column::Column::BoardId.eq(model.board_id))
        .count(tx)
        .await? as i32;
    let new_position = clamp_position(requested, count - 1);

    if let Some(shift) = plan_reorder(model.position, new_position) {
        shift_board(tx, model.board_id, shift).await?;
    }

    column::Entity::update_many()
        .col_expr(column::Column::Position, Expr::value(new_position))
        .filter(column::Column::Id.eq(model.id))
        .exec(tx)
        .await?;

    Ok(Some(ColumnMove {
        old_position: model.position,
        new_position,
        requested,
    }))
}

/// Bumps `updated_at` on the column. Run first in a transaction so SQLite
/// hands it the write lock before any position is read.
async fn claim_column<C: ConnectionTrait>(tx: &C, id: Uuid) -> Result<u64, DbErr> {
    let claimed = column::Entity::update_many()
        .col_expr(column::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(column::Column::Uuid.eq(id))
        .exec(tx)
        .await?;
    Ok(claimed.rows_affected)
}

async fn max_position<C: ConnectionTrait>(db: &C, board_row_id: i64) -> Result<Option<i32>, DbErr> {
    column::Entity::find()
        .select_only()
        .column(column::Column::Position)
        .filter(column::Column::BoardId.eq(board_row_id))
        .order_by_desc(column::Column::Position)
        .into_tuple::<i32>()
        .one(db)
        .await
}

async fn shift_board<C: ConnectionTrait>(
    db: &C,
    board_row_id: i64,
    shift: Shift,
) -> Result<u64, DbErr> {
    let result = column::Entity::update_many()
        .col_expr(
            column::Column::Position,
            Expr::col(column::Column::Position).add(shift.delta),
        )
        .filter(column::Column::BoardId.eq(board_row_id))
        .filter(shift.condition(column::Column::Position))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::{
        DBService,
        models::{
            board::{Board, CreateBoard},
            position::is_dense,
            task::CreateTask,
        },
    };

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    /// Board with the default columns; returns them as A, B, C.
    async fn board_with_columns(db: &DatabaseConnection) -> (Uuid, [Uuid; 3]) {
        let board = Board::create(
            db,
            &CreateBoard {
                name: "Product".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        let columns = Column::find_by_board_id(db, board.id).await.unwrap();
        (board.id, [columns[0].id, columns[1].id, columns[2].id])
    }

    async fn positions(db: &DatabaseConnection, ids: &[Uuid]) -> Vec<i32> {
        let mut result = Vec::new();
        for id in ids {
            result.push(Column::find_by_id(db, *id).await.unwrap().unwrap().position);
        }
        result
    }

    async fn board_positions(db: &DatabaseConnection, board_id: Uuid) -> Vec<i32> {
        Column::find_by_board_id(db, board_id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.position)
            .collect()
    }

    #[tokio::test]
    async fn moving_last_column_to_front_shifts_others_right() {
        let db = setup_db().await;
        let (_, [a, b, c]) = board_with_columns(&db).await;

        let moved = Column::reposition(&db, c, 0).await.unwrap();
        assert_eq!(moved.position, 0);
        assert_eq!(positions(&db, &[a, b, c]).await, vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn moving_first_column_to_end_shifts_others_left() {
        let db = setup_db().await;
        let (_, [a, b, c]) = board_with_columns(&db).await;

        Column::reposition(&db, a, 2).await.unwrap();
        assert_eq!(positions(&db, &[a, b, c]).await, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn same_position_is_a_no_op() {
        let db = setup_db().await;
        let (_, [a, b, c]) = board_with_columns(&db).await;

        Column::reposition(&db, b, 1).await.unwrap();
        assert_eq!(positions(&db, &[a, b, c]).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn out_of_range_position_is_clamped() {
        let db = setup_db().await;
        let (_, [a, b, c]) = board_with_columns(&db).await;

        let moved = Column::reposition(&db, a, 42).await.unwrap();
        assert_eq!(moved.position, 2);
        assert_eq!(positions(&db, &[a, b, c]).await, vec![2, 0, 1]);

        let moved = Column::reposition(&db, c, -3).await.unwrap();
        assert_eq!(moved.position, 0);
        assert_eq!(positions(&db, &[a, b, c]).await, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn missing_column_is_not_found() {
        let db = setup_db().await;
        let (board_id, _) = board_with_columns(&db).await;

        let err = Column::reposition(&db, Uuid::new_v4(), 0).await.unwrap_err();
        assert!(matches!(err, ColumnError::ColumnNotFound));
        assert_eq!(board_positions(&db, board_id).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn positions_stay_dense_over_a_sequence_of_moves() {
        let db = setup_db().await;
        let (board_id, [a, b, c]) = board_with_columns(&db).await;
        let d = Column::create(
            &db,
            &CreateColumn {
                board_id,
                name: "Review".to_string(),
                position: None,
            },
        )
        .await
        .unwrap()
        .id;

        let moves = [(d, 0), (a, 3), (b, 1), (c, 2), (d, 3), (a, 0), (b, 2)];
        for (id, position) in moves {
            Column::reposition(&db, id, position).await.unwrap();
            assert!(is_dense(&board_positions(&db, board_id).await));
        }
        assert_eq!(positions(&db, &[a, b, c, d]).await, vec![0, 2, 1, 3]);
    }

    #[tokio::test]
    async fn reposition_returns_tasks_in_order() {
        let db = setup_db().await;
        let (_, [a, _, c]) = board_with_columns(&db).await;
        for title in ["First", "Second"] {
            Task::create(&db, &CreateTask::new(c, title)).await.unwrap();
        }

        let moved = Column::reposition(&db, c, 0).await.unwrap();
        let titles: Vec<_> = moved.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(Column::find_by_id(&db, a).await.unwrap().unwrap().position, 1);
    }

    #[tokio::test]
    async fn failure_before_final_set_rolls_back_shift() {
        let db = setup_db().await;
        let (_, [a, b, c]) = board_with_columns(&db).await;
        let row_id = ids::column_id_by_uuid(&db, c).await.unwrap().unwrap();
        db.execute_unprepared(&format!(
            "CREATE TRIGGER fail_column_move BEFORE UPDATE OF position ON columns \
             WHEN OLD.id = {row_id} BEGIN SELECT RAISE(ABORT, 'forced failure'); END;"
        ))
        .await
        .unwrap();

        let err = Column::reposition(&db, c, 0).await.unwrap_err();
        assert!(matches!(err, ColumnError::Database(_)));
        assert_eq!(positions(&db, &[a, b, c]).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn next_position_follows_last_column() {
        let db = setup_db().await;
        let (board_id, _) = board_with_columns(&db).await;

        assert_eq!(Column::next_position(&db, board_id).await.unwrap(), 3);
        let err = Column::next_position(&db, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ColumnError::BoardNotFound));
    }

    #[tokio::test]
    async fn next_position_is_zero_for_empty_board() {
        let db = setup_db().await;
        let (board_id, ids) = board_with_columns(&db).await;
        for id in ids {
            Column::delete(&db, id).await.unwrap();
        }

        assert_eq!(Column::next_position(&db, board_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_with_position_inserts_and_shifts() {
        let db = setup_db().await;
        let (board_id, [a, b, c]) = board_with_columns(&db).await;

        let inserted = Column::create(
            &db,
            &CreateColumn {
                board_id,
                name: "Blocked".to_string(),
                position: Some(1),
            },
        )
        .await
        .unwrap();
        assert_eq!(inserted.position, 1);
        assert_eq!(positions(&db, &[a, b, c]).await, vec![0, 2, 3]);

        let appended = Column::create(
            &db,
            &CreateColumn {
                board_id,
                name: "Archive".to_string(),
                position: Some(99),
            },
        )
        .await
        .unwrap();
        assert_eq!(appended.position, 4);
        assert!(is_dense(&board_positions(&db, board_id).await));
    }

    #[tokio::test]
    async fn create_for_missing_board_fails() {
        let db = setup_db().await;
        let err = Column::create(
            &db,
            &CreateColumn {
                board_id: Uuid::new_v4(),
                name: "Orphan".to_string(),
                position: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ColumnError::BoardNotFound));
    }

    #[tokio::test]
    async fn delete_compacts_siblings() {
        let db = setup_db().await;
        let (board_id, [a, b, c]) = board_with_columns(&db).await;

        assert_eq!(Column::delete(&db, b).await.unwrap(), 1);
        assert_eq!(positions(&db, &[a, c]).await, vec![0, 1]);
        assert_eq!(Column::next_position(&db, board_id).await.unwrap(), 2);
        assert_eq!(Column::delete(&db, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rename_keeps_position() {
        let db = setup_db().await;
        let (_, [_, b, _]) = board_with_columns(&db).await;

        let renamed = Column::update(
            &db,
            b,
            &UpdateColumn {
                name: Some(" Doing ".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Doing");
        assert_eq!(renamed.position, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_and_deletes_keep_board_dense() {
        let path = std::env::temp_dir().join(format!("tiles-columns-{}.db", Uuid::new_v4()));
        let db = DBService::connect(&format!("sqlite://{}", path.display()))
            .await
            .unwrap()
            .pool;
        let (board_id, [_, b, _]) = board_with_columns(&db).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let data = CreateColumn {
                    board_id,
                    name: format!("Stage {i}"),
                    position: (i % 2 == 0).then_some(1),
                };
                Column::create(&db, &data).await.map(|_| ())
            }));
        }
        {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                Column::delete(&db, b).await.map(|_| ()).map_err(ColumnError::from)
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let positions = board_positions(&db, board_id).await;
        assert_eq!(positions.len(), 22);
        assert!(is_dense(&positions), "{positions:?}");

        drop(db);
        let _ = std::fs::remove_file(&path);
    }
}
