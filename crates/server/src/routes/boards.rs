use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    board::{Board, BoardError, BoardWithColumns, BoardWithFullData, CreateBoard, UpdateBoard},
    column::{Column, ColumnWithTasks},
};
use deployment::Deployment;
use utils_core::response::ApiResponse;

use crate::{
    DeploymentImpl, error::ApiError, middleware::load_board_middleware, routes::require_text,
};

pub async fn get_boards(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Board>>>, ApiError> {
    let boards = Board::find_all(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(boards)))
}

pub async fn get_board(
    Extension(board): Extension<Board>,
) -> Result<ResponseJson<ApiResponse<Board>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub async fn get_board_with_columns(
    Extension(board): Extension<Board>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<BoardWithColumns>>, ApiError> {
    let board = Board::find_with_columns(&deployment.db().pool, board.id)
        .await?
        .ok_or(BoardError::BoardNotFound)?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub async fn get_board_full(
    Extension(board): Extension<Board>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<BoardWithFullData>>, ApiError> {
    let board = Board::find_with_full_data(&deployment.db().pool, board.id)
        .await?
        .ok_or(BoardError::BoardNotFound)?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub async fn get_board_columns(
    Extension(board): Extension<Board>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<ColumnWithTasks>>>, ApiError> {
    let columns = Column::find_by_board_id_with_tasks(&deployment.db().pool, board.id).await?;
    Ok(ResponseJson(ApiResponse::success(columns)))
}

pub async fn create_board(
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<CreateBoard>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Board>>, ApiError> {
    let Json(mut payload) = payload?;
    payload.name = require_text("name", Some(&payload.name))?;

    tracing::debug!("Creating board '{}'", payload.name);
    let board = Board::create(&deployment.db().pool, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub async fn update_board(
    Extension(board): Extension<Board>,
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<UpdateBoard>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<Board>>, ApiError> {
    let Json(mut payload) = payload?;
    if let Some(name) = payload.name.as_deref() {
        payload.name = Some(require_text("name", Some(name))?);
    }

    let board = Board::update(&deployment.db().pool, board.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub async fn delete_board(
    Extension(board): Extension<Board>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Board::delete(&deployment.db().pool, board.id).await?;
    if rows_affected == 0 {
        return Err(BoardError::BoardNotFound.into());
    }
    tracing::info!(board_id = %board.id, "Deleted board");
    Ok(ResponseJson(ApiResponse::success_with_message(
        (),
        "Board deleted successfully",
    )))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let board_id_router = Router::new()
        .route("/", get(get_board).put(update_board).delete(delete_board))
        .route("/with-columns", get(get_board_with_columns))
        .route("/full", get(get_board_full))
        .route("/columns", get(get_board_columns))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_board_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/", get(get_boards).post(create_board))
        .nest("/{board_id}", board_id_router);

    Router::new().nest("/boards", inner)
}
