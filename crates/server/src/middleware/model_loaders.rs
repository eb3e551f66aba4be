use std::{fmt::Display, future::Future};

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use db::{
    DBService,
    models::{board::Board, column::Column, task::Task},
};
use deployment::Deployment;
use uuid::Uuid;

use crate::error::ApiError;

pub trait ModelLoaderDeps {
    fn db_service(&self) -> &DBService;
}

impl<D> ModelLoaderDeps for D
where
    D: Deployment,
{
    fn db_service(&self) -> &DBService {
        self.db()
    }
}

async fn fetch_model_or_error<M, E, Fut>(
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<M, ApiError>
where
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    match load_future.await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::debug!("{model_name} {model_id} not found");
            Err(ApiError::NotFound(format!("{model_name} not found")))
        }
        Err(error) => {
            tracing::error!("Failed to fetch {model_name} {model_id}: {error}");
            Err(ApiError::Internal(format!("Failed to fetch {model_name}")))
        }
    }
}

/// Parses a path id, answering 400 inside the usual envelope when it is not
/// a uuid.
fn parse_model_id(model_name: &'static str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::debug!("Malformed {model_name} id {raw:?}");
        ApiError::BadRequest(format!("Invalid {} id", model_name.to_lowercase()))
    })
}

async fn load_request_extension<M, E, Fut>(
    request: Request,
    next: Next,
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<Response, ApiError>
where
    M: Clone + Send + Sync + 'static,
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    let model = fetch_model_or_error(model_name, model_id, load_future).await?;
    let mut request = request;
    request.extensions_mut().insert(model);
    Ok(next.run(request).await)
}

pub async fn load_board_middleware<S>(
    State(deployment): State<S>,
    Path(board_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: ModelLoaderDeps,
{
    let board_id = parse_model_id("Board", &board_id)?;
    load_request_extension(
        request,
        next,
        "Board",
        board_id,
        Board::find_by_id(&deployment.db_service().pool, board_id),
    )
    .await
}

pub async fn load_column_middleware<S>(
    State(deployment): State<S>,
    Path(column_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: ModelLoaderDeps,
{
    let column_id = parse_model_id("Column", &column_id)?;
    load_request_extension(
        request,
        next,
        "Column",
        column_id,
        Column::find_by_id(&deployment.db_service().pool, column_id),
    )
    .await
}

pub async fn load_task_middleware<S>(
    State(deployment): State<S>,
    Path(task_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: ModelLoaderDeps,
{
    let task_id = parse_model_id("Task", &task_id)?;
    load_request_extension(
        request,
        next,
        "Task",
        task_id,
        Task::find_by_id(&deployment.db_service().pool, task_id),
    )
    .await
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::{fetch_model_or_error, parse_model_id};

    #[tokio::test]
    async fn missing_model_is_not_found() {
        let result = fetch_model_or_error::<String, &'static str, _>(
            "Column",
            uuid::Uuid::new_v4(),
            async { Ok(None) },
        )
        .await;

        assert_eq!(
            result.unwrap_err().into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_internal_error() {
        let result = fetch_model_or_error::<String, &'static str, _>(
            "Column",
            uuid::Uuid::new_v4(),
            async { Err("db unavailable") },
        )
        .await;

        assert_eq!(
            result.unwrap_err().into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn malformed_id_is_bad_request() {
        let error = parse_model_id("Task", "not-a-uuid").unwrap_err();
        assert_eq!(error.to_string(), "Bad request: Invalid task id");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_model_id("Task", &id.to_string()).unwrap(), id);
    }
}
