use super::types::{ErrorResponse, TaskStatusResponse};
use crate::AppState;
use crate::api::error::AppError;
use axum::{
    Json,
    extract::{Path, State},
};

#[utoipa::path(
    get,
    path = "/status/{task_id}",
    params(
        ("task_id" = String, Path, description = "Identifier returned by the upload")
    ),
    responses(
        (status = 200, description = "Current task status", body = TaskStatusResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "conversion"
)]
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let record = state.registry.get(&task_id)?;

    Ok(Json(TaskStatusResponse {
        task_id,
        status: record.status,
        details: record.details,
        timestamp: record.timestamp,
    }))
}
