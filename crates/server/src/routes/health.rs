use axum::response::Json as ResponseJson;
use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

#[derive(Debug, Serialize, TS)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, TS)]
pub struct ApiInfo {
    pub message: String,
    pub version: String,
}

pub async fn health_check() -> ResponseJson<HealthStatus> {
    ResponseJson(HealthStatus {
        status: "OK".to_string(),
        timestamp: Utc::now(),
    })
}

pub async fn api_info() -> ResponseJson<ApiInfo> {
    ResponseJson(ApiInfo {
        message: "Task Tiles API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
