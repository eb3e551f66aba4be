use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{board::BoardError, column::ColumnError, task::TaskError},
};
use thiserror::Error;
use utils_core::response::ApiResponse;

#[derive(Debug, Error, ts_rs::TS)]
#[ts(type = "string")]
pub enum ApiError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Json(#[from] JsonRejection),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Board(err) => match err {
                BoardError::BoardNotFound => (StatusCode::NOT_FOUND, "BoardError"),
                BoardError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BoardError"),
            },
            ApiError::Column(err) => match err {
                ColumnError::ColumnNotFound | ColumnError::BoardNotFound => {
                    (StatusCode::NOT_FOUND, "ColumnError")
                }
                ColumnError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ColumnError"),
            },
            ApiError::Task(err) => match err {
                TaskError::TaskNotFound | TaskError::ColumnNotFound => {
                    (StatusCode::NOT_FOUND, "TaskError")
                }
                TaskError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TaskError"),
            },
            ApiError::Database(db_err) => match db_err {
                DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            },
            ApiError::Json(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
        };

        // Store failures are logged in full and answered with a generic message.
        let error_message = match &self {
            ApiError::Board(BoardError::BoardNotFound) => "Board not found".to_string(),
            ApiError::Column(ColumnError::ColumnNotFound) => "Column not found".to_string(),
            ApiError::Column(ColumnError::BoardNotFound) => "Board not found".to_string(),
            ApiError::Task(TaskError::TaskNotFound) => "Task not found".to_string(),
            ApiError::Task(TaskError::ColumnNotFound) => "Column not found".to_string(),
            ApiError::Json(rejection) => rejection.body_text(),
            ApiError::NotFound(msg) => msg.clone(),
            ApiError::BadRequest(msg) => msg.clone(),
            _ if status_code.is_server_error() => "Operation failed".to_string(),
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
