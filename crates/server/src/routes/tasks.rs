use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::task::{CreateTask, Task, TaskError, UpdateTask};
use deployment::Deployment;
use serde::Deserialize;
use ts_rs::TS;
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::load_task_middleware,
    routes::{check_optional_position, require_position, require_text},
};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RepositionTaskRequest {
    pub column_id: Option<Uuid>,
    pub position: Option<i32>,
}

pub async fn get_task(
    Extension(task): Extension<Task>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn create_task(
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<CreateTask>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let Json(mut payload) = payload?;
    payload.title = require_text("title", Some(&payload.title))?;
    check_optional_position(payload.position)?;

    tracing::debug!(
        "Creating task '{}' in column {}",
        payload.title,
        payload.column_id
    );
    let task = Task::create(&deployment.db().pool, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<UpdateTask>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let Json(mut payload) = payload?;
    if let Some(title) = payload.title.as_deref() {
        payload.title = Some(require_text("title", Some(title))?);
    }

    let task = Task::update(&deployment.db().pool, task.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn reposition_task(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<RepositionTaskRequest>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let Json(payload) = payload?;
    let column_id = payload
        .column_id
        .ok_or(ApiError::BadRequest("columnId is required".to_string()))?;
    let position = require_position(payload.position)?;

    let task = Task::reposition(&deployment.db().pool, task.id, column_id, position).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Task::delete(&deployment.db().pool, task.id).await?;
    if rows_affected == 0 {
        return Err(TaskError::TaskNotFound.into());
    }
    tracing::info!(task_id = %task.id, column_id = %task.column_id, "Deleted task");
    Ok(ResponseJson(ApiResponse::success_with_message(
        (),
        "Task deleted successfully",
    )))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let task_id_router = Router::new()
        .route("/", get(get_task).put(update_task).delete(delete_task))
        .route("/position", put(reposition_task))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_task_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/", post(create_task))
        .nest("/{task_id}", task_id_router);

    Router::new().nest("/tasks", inner)
}
