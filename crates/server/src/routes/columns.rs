use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::{
    column::{Column, ColumnError, ColumnWithTasks, CreateColumn, UpdateColumn},
    task::Task,
};
use deployment::Deployment;
use serde::Deserialize;
use ts_rs::TS;
use utils_core::response::ApiResponse;

use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::load_column_middleware,
    routes::{check_optional_position, require_position, require_text},
};

#[derive(Debug, Deserialize, TS)]
pub struct RepositionColumnRequest {
    pub position: Option<i32>,
}

pub async fn get_column(
    Extension(column): Extension<Column>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ColumnWithTasks>>, ApiError> {
    let tasks = Task::find_by_column_id(&deployment.db().pool, column.id).await?;
    Ok(ResponseJson(ApiResponse::success(ColumnWithTasks {
        column,
        tasks,
    })))
}

pub async fn get_column_tasks(
    Extension(column): Extension<Column>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = Task::find_by_column_id(&deployment.db().pool, column.id).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn create_column(
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<CreateColumn>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Column>>, ApiError> {
    let Json(mut payload) = payload?;
    payload.name = require_text("name", Some(&payload.name))?;
    check_optional_position(payload.position)?;

    tracing::debug!(
        "Creating column '{}' in board {}",
        payload.name,
        payload.board_id
    );
    let column = Column::create(&deployment.db().pool, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(column)))
}

pub async fn update_column(
    Extension(column): Extension<Column>,
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<UpdateColumn>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Column>>, ApiError> {
    let Json(mut payload) = payload?;
    if let Some(name) = payload.name.as_deref() {
        payload.name = Some(require_text("name", Some(name))?);
    }

    let column = Column::update(&deployment.db().pool, column.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(column)))
}

pub async fn reposition_column(
    Extension(column): Extension<Column>,
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<RepositionColumnRequest>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<ColumnWithTasks>>, ApiError> {
    let Json(payload) = payload?;
    let position = require_position(payload.position)?;

    let column = Column::reposition(&deployment.db().pool, column.id, position).await?;
    Ok(ResponseJson(ApiResponse::success(column)))
}

pub async fn delete_column(
    Extension(column): Extension<Column>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Column::delete(&deployment.db().pool, column.id).await?;
    if rows_affected == 0 {
        return Err(ColumnError::ColumnNotFound.into());
    }
    tracing::info!(column_id = %column.id, board_id = %column.board_id, "Deleted column");
    Ok(ResponseJson(ApiResponse::success_with_message(
        (),
        "Column deleted successfully",
    )))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let column_id_router = Router::new()
        .route("/", get(get_column).put(update_column).delete(delete_column))
        .route("/position", put(reposition_column))
        .route("/tasks", get(get_column_tasks))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_column_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/", post(create_column))
        .nest("/{column_id}", column_id_router);

    Router::new().nest("/columns", inner)
}
