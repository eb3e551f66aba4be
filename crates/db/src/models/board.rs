use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::column::{Column, ColumnWithTasks};
use crate::{
    entities::{board, column},
    retry::retry_on_sqlite_busy,
};

/// Columns every new board starts with, in display order.
pub const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Board not found")]
    BoardNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct BoardWithColumns {
    #[serde(flatten)]
    #[ts(flatten)]
    pub board: Board,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct BoardWithFullData {
    #[serde(flatten)]
    #[ts(flatten)]
    pub board: Board,
    pub columns: Vec<ColumnWithTasks>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateBoard {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct UpdateBoard {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Board {
    fn from_model(model: board::Model) -> Self {
        Self {
            id: model.uuid,
            name: model.name,
            description: model.description,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = board::Entity::find()
            .order_by_desc(board::Column::CreatedAt)
            .order_by_desc(board::Column::Id)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = board::Entity::find()
            .filter(board::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_with_columns<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<BoardWithColumns>, DbErr> {
        let Some(board) = Self::find_by_id(db, id).await? else {
            return Ok(None);
        };
        let columns = Column::find_by_board_id(db, id).await?;
        Ok(Some(BoardWithColumns { board, columns }))
    }

    pub async fn find_with_full_data<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<BoardWithFullData>, DbErr> {
        let Some(board) = Self::find_by_id(db, id).await? else {
            return Ok(None);
        };
        let columns = Column::find_by_board_id_with_tasks(db, id).await?;
        Ok(Some(BoardWithFullData { board, columns }))
    }

    /// Creates the board together with its default columns.
    pub async fn create<C>(db: &C, data: &CreateBoard) -> Result<Self, DbErr>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let board_id = Uuid::new_v4();
        retry_on_sqlite_busy(|| async move {
            let tx = db.begin().await?;
            let now = Utc::now();
            let model = board::ActiveModel {
                uuid: Set(board_id),
                name: Set(data.name.trim().to_string()),
                description: Set(data.description.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&tx)
            .await?;

            for (position, name) in DEFAULT_COLUMNS.iter().enumerate() {
                column::ActiveModel {
                    uuid: Set(Uuid::new_v4()),
                    board_id: Set(model.id),
                    name: Set(name.to_string()),
                    position: Set(position as i32),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&tx)
                .await?;
            }

            tx.commit().await?;
            Ok(Self::from_model(model))
        })
        .await
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateBoard,
    ) -> Result<Self, BoardError> {
        let record = board::Entity::find()
            .filter(board::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(BoardError::BoardNotFound)?;

        let mut active: board::ActiveModel = record.into();
        if let Some(name) = &data.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = &data.description {
            // Empty string clears the description.
            active.description = Set(Some(description.clone()).filter(|d| !d.trim().is_empty()));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        Ok(Self::from_model(updated))
    }

    /// Columns and tasks go with the board via `ON DELETE CASCADE`.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = board::Entity::delete_many()
            .filter(board::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
