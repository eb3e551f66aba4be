use sea_orm::entity::prelude::*;

use crate::types::{EstimateSize, ItemType, Priority};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub column_id: i64,
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
    pub start_date: Option<DateTimeUtc>,
    pub deadline: Option<DateTimeUtc>,
    pub tags: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
