use crate::models::TaskStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub task_id: String,
    pub filename: String,
    pub file_size: u64,
    pub output_format: String,
    pub message: String,
    pub status_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}
