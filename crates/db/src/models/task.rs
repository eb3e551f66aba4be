use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionSession, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ids,
    position::{clamp_position, next_after, plan_insertion, plan_removal, plan_reorder, Shift},
};
pub use crate::types::{EstimateSize, ItemType, Priority};
use crate::{
    entities::{column, task},
    retry::retry_on_sqlite_busy,
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Task not found")]
    TaskNotFound,
    #[error("Column not found")]
    ColumnNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
    pub project_number: Option<String>,
    pub assignee: Option<String>,
    pub assigner: Option<String>,
    pub priority: Option<Priority>,
    pub item_type: Option<ItemType>,
    pub initiative: Option<String>,
    pub estimate_size: Option<EstimateSize>,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Appended after the last task when omitted.
    pub position: Option<i32>,
    pub project_number: Option<String>,
    pub assignee: Option<String>,
    pub assigner: Option<String>,
    pub priority: Option<Priority>,
    pub item_type: Option<ItemType>,
    pub initiative: Option<String>,
    pub estimate_size: Option<EstimateSize>,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
}

impl CreateTask {
    pub fn new(column_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            column_id,
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update of the descriptive fields.
///
/// A missing key leaves the field alone, an explicit `null` clears it.
/// Moving a task goes through [`Task::reposition`].
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub project_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub assignee: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub assigner: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub priority: Option<Option<Priority>>,
    #[serde(default, deserialize_with = "present")]
    pub item_type: Option<Option<ItemType>>,
    #[serde(default, deserialize_with = "present")]
    pub initiative: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub estimate_size: Option<Option<EstimateSize>>,
    #[serde(default, deserialize_with = "present")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

/// Distinguishes `"key": null` (`Some(None)`) from a missing key (`None`).
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|t| t == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

fn tags_to_json(tags: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        normalize_tags(tags)
            .into_iter()
            .map(serde_json::Value::String)
            .collect(),
    )
}

#[derive(Debug, Clone, Copy)]
struct TaskMove {
    from_column: i64,
    to_column: i64,
    old_position: i32,
    new_position: i32,
    requested: i32,
}

enum MoveOutcome {
    Moved(TaskMove),
    TaskMissing,
    ColumnMissing,
}

impl Task {
    pub(crate) fn from_parts(model: task::Model, column_id: Uuid) -> Result<Self, DbErr> {
        let tags: Vec<String> = serde_json::from_value(model.tags)
            .map_err(|err| DbErr::Custom(format!("Invalid tags for task {}: {err}", model.uuid)))?;
        Ok(Self {
            id: model.uuid,
            column_id,
            title: model.title,
            description: model.description,
            position: model.position,
            project_number: model.project_number,
            assignee: model.assignee,
            assigner: model.assigner,
            priority: model.priority,
            item_type: model.item_type,
            initiative: model.initiative,
            estimate_size: model.estimate_size,
            start_date: model.start_date,
            deadline: model.deadline,
            tags,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, DbErr> {
        let column_id = ids::column_uuid_by_id(db, model.column_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Column not found".to_string()))?;
        Self::from_parts(model, column_id)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Tasks of a column ordered by position. Empty for an unknown column.
    pub async fn find_by_column_id<C: ConnectionTrait>(
        db: &C,
        column_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(column_row_id) = ids::column_id_by_uuid(db, column_id).await? else {
            return Ok(Vec::new());
        };
        let records = task::Entity::find()
            .filter(task::Column::ColumnId.eq(column_row_id))
            .order_by_asc(task::Column::Position)
            .order_by_asc(task::Column::Id)
            .all(db)
            .await?;
        records
            .into_iter()
            .map(|model| Self::from_parts(model, column_id))
            .collect()
    }

    /// Position a task appended to the column would get.
    pub async fn next_position<C: ConnectionTrait>(
        db: &C,
        column_id: Uuid,
    ) -> Result<i32, TaskError> {
        let column_row_id = ids::column_id_by_uuid(db, column_id)
            .await?
            .ok_or(TaskError::ColumnNotFound)?;
        Ok(next_after(max_position(db, column_row_id).await?))
    }

    pub async fn create<C>(db: &C, data: &CreateTask) -> Result<Self, TaskError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let task_id = Uuid::new_v4();
        let created = retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            // Touching the column takes the write lock before its positions
            // are read.
            let claimed = column::Entity::update_many()
                .col_expr(column::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(column::Column::Uuid.eq(data.column_id))
                .exec(&tx)
                .await?;
            if claimed.rows_affected == 0 {
                return Ok(None);
            }
            let Some(column_row_id) = ids::column_id_by_uuid(&tx, data.column_id).await? else {
                return Ok(None);
            };

            let next = next_after(max_position(&tx, column_row_id).await?);
            let position = match data.position {
                Some(requested) => {
                    let position = clamp_position(requested, next);
                    if position != requested {
                        tracing::warn!(
                            column_id = %data.column_id,
                            requested,
                            position,
                            "Task position out of range, clamped"
                        );
                    }
                    if position < next {
                        shift_column(&tx, column_row_id, plan_insertion(position)).await?;
                    }
                    position
                }
                None => next,
            };

            let now = Utc::now();
            let model = task::ActiveModel {
                uuid: Set(task_id),
                column_id: Set(column_row_id),
                title: Set(data.title.trim().to_string()),
                description: Set(non_blank(data.description.clone())),
                position: Set(position),
                project_number: Set(non_blank(data.project_number.clone())),
                assignee: Set(non_blank(data.assignee.clone())),
                assigner: Set(non_blank(data.assigner.clone())),
                priority: Set(data.priority),
                item_type: Set(data.item_type),
                initiative: Set(non_blank(data.initiative.clone())),
                estimate_size: Set(data.estimate_size),
                start_date: Set(data.start_date),
                deadline: Set(data.deadline),
                tags: Set(tags_to_json(data.tags.as_deref().unwrap_or_default())),
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

        let model = created.ok_or(TaskError::ColumnNotFound)?;
        Ok(Self::from_parts(model, data.column_id)?)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateTask,
    ) -> Result<Self, TaskError> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TaskError::TaskNotFound)?;

        let mut active: task::ActiveModel = record.into();
        if let Some(title) = &data.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = &data.description {
            active.description = Set(non_blank(description.clone()));
        }
        if let Some(project_number) = &data.project_number {
            active.project_number = Set(non_blank(project_number.clone()));
        }
        if let Some(assignee) = &data.assignee {
            active.assignee = Set(non_blank(assignee.clone()));
        }
        if let Some(assigner) = &data.assigner {
            active.assigner = Set(non_blank(assigner.clone()));
        }
        if let Some(priority) = data.priority {
            active.priority = Set(priority);
        }
        if let Some(item_type) = data.item_type {
            active.item_type = Set(item_type);
        }
        if let Some(initiative) = &data.initiative {
            active.initiative = Set(non_blank(initiative.clone()));
        }
        if let Some(estimate_size) = data.estimate_size {
            active.estimate_size = Set(estimate_size);
        }
        if let Some(start_date) = data.start_date {
            active.start_date = Set(start_date);
        }
        if let Some(deadline) = data.deadline {
            active.deadline = Set(deadline);
        }
        if let Some(tags) = &data.tags {
            active.tags = Set(tags_to_json(tags));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        Ok(Self::from_model(db, updated).await?)
    }

    /// Deletes the task and closes the gap it leaves in its column.
    pub async fn delete<C>(db: &C, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            if claim_task(&tx, id).await? == 0 {
                return Ok(0);
            }
            let Some(model) = task::Entity::find()
                .filter(task::Column::Uuid.eq(id))
                .one(&tx)
                .await?
            else {
                return Ok(0);
            };

            let result = task::Entity::delete_by_id(model.id).exec(&tx).await?;
            shift_column(&tx, model.column_id, plan_removal(model.position)).await?;
            tx.commit().await?;
            Ok(result.rows_affected)
        })
        .await
    }

    /// Moves a task to `new_position` in `new_column_id`, which may be the
    /// column it is already in.
    ///
    /// Within a column the position is clamped to `[0, tasks - 1]`; into
    /// another column it is clamped to `[0, tasks in target]`, the latter
    /// meaning append. Both columns are renumbered in the same transaction
    /// as the final assignment.
    pub async fn reposition<C>(
        db: &C,
        id: Uuid,
        new_column_id: Uuid,
        new_position: i32,
    ) -> Result<Self, TaskError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let outcome = retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            let outcome = reposition_in(&tx, id, new_column_id, new_position).await?;
            if let MoveOutcome::Moved(_) = outcome {
                tx.commit().await?;
            }
            Ok(outcome)
        })
        .await?;

        let moved = match outcome {
            MoveOutcome::Moved(moved) => moved,
            MoveOutcome::TaskMissing => return Err(TaskError::TaskNotFound),
            MoveOutcome::ColumnMissing => return Err(TaskError::ColumnNotFound),
        };
        if moved.new_position != moved.requested {
            tracing::warn!(
                task_id = %id,
                requested = moved.requested,
                position = moved.new_position,
                "Task position out of range, clamped"
            );
        }
        tracing::debug!(
            task_id = %id,
            column_id = %new_column_id,
            cross_column = moved.from_column != moved.to_column,
            from = moved.old_position,
            to = moved.new_position,
            "Repositioned task"
        );

        Self::find_by_id(db, id)
            .await?
            .ok_or(TaskError::TaskNotFound)
    }
}

/// Runs one task move on an open transaction. Anything other than
/// [`MoveOutcome::Moved`] leaves the transaction to be rolled back.
async fn reposition_in<C: ConnectionTrait>(
    tx: &C,
    id: Uuid,
    new_column_id: Uuid,
    requested: i32,
) -> Result<MoveOutcome, DbErr> {
    if claim_task(tx, id).await? == 0 {
        return Ok(MoveOutcome::TaskMissing);
    }

    let model = task::Entity::find()
        .filter(task::Column::Uuid.eq(id))
        .one(tx)
        .await?
        .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;
    let Some(target_column) = ids::column_id_by_uuid(tx, new_column_id).await? else {
        return Ok(MoveOutcome::ColumnMissing);
    };

    let count = task::Entity::find()
        .filter(task::Column::ColumnId.eq(target_column))
        .count(tx)
        .await? as i32;

    let new_position = if target_column == model.column_id {
        let new_position = clamp_position(requested, count - 1);
        if let Some(shift) = plan_reorder(model.position, new_position) {
            shift_column(tx, target_column, shift).await?;
        }
        new_position
    } else {
        let new_position = clamp_position(requested, count);
        shift_column(tx, model.column_id, plan_removal(model.position)).await?;
        shift_column(tx, target_column, plan_insertion(new_position)).await?;
        new_position
    };

    task::Entity::update_many()
        .col_expr(task::Column::ColumnId, Expr::value(target_column))
        .col_expr(task::Column::Position, Expr::value(new_position))
        .filter(task::Column::Id.eq(model.id))
        .exec(tx)
        .await?;

    Ok(MoveOutcome::Moved(TaskMove {
        from_column: model.column_id,
        to_column: target_column,
        old_position: model.position,
        new_position,
        requested,
    }))
}

/// Bumps `updated_at` on the task. Run first in a transaction so SQLite
/// hands it the write lock before any position is read.
async fn claim_task<C: ConnectionTrait>(tx: &C, id: Uuid) -> Result<u64, DbErr> {
    let claimed = task::Entity::update_many()
        .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(task::Column::Uuid.eq(id))
        .exec(tx)
        .await?;
    Ok(claimed.rows_affected)
}

async fn max_position<C: ConnectionTrait>(
    db: &C,
    column_row_id: i64,
) -> Result<Option<i32>, DbErr> {
    task::Entity::find()
        .select_only()
        .column(task::Column::Position)
        .filter(task::Column::ColumnId.eq(column_row_id))
        .order_by_desc(task::Column::Position)
        .into_tuple::<i32>()
        .one(db)
        .await
}

async fn shift_column<C: ConnectionTrait>(
    db: &C,
    column_row_id: i64,
    shift: Shift,
) -> Result<u64, DbErr> {
    let result = task::Entity::update_many()
        .col_expr(
            task::Column::Position,
            Expr::col(task::Column::Position).add(shift.delta),
        )
        .filter(task::Column::ColumnId.eq(column_row_id))
        .filter(shift.condition(task::Column::Position))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
