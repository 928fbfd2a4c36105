use super::types::{ErrorResponse, UploadResponse};
use crate::AppState;
use crate::api::error::AppError;
use crate::services::chunked_writer::WriteError;
use crate::services::ingestion::IngestError;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

pub const UPLOAD_MESSAGE: &str = "File uploaded successfully and queued for JSON processing";

fn is_length_limit(message: &str) -> bool {
    message.contains("length limit exceeded")
}

fn too_large() -> AppError {
    AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
}

#[utoipa::path(
    post,
    path = "/upload/to-json",
    request_body(content = Multipart, content_type = "multipart/form-data", description = "Office document in the `file` field"),
    responses(
        (status = 200, description = "File stored and queued for conversion", body = UploadResponse),
        (status = 400, description = "Missing file name or unsupported extension", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "File could not be saved", body = ErrorResponse)
    ),
    tag = "conversion"
)]
pub async fn upload_to_json(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    // Use a result to capture errors so we can consume the multipart stream if needed
    let result: Result<Json<UploadResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let err_msg = e.to_string();
            if is_length_limit(&err_msg) {
                too_large()
            } else {
                AppError::BadRequest(err_msg)
            }
        })? {
            if field.name() != Some("file") {
                continue;
            }

            let filename = field.file_name().map(str::to_string);
            let reader = StreamReader::new(field.map_err(std::io::Error::other));

            let receipt = state
                .ingestion
                .accept(filename.as_deref(), reader)
                .await
                .map_err(|e| match e {
                    IngestError::Write(WriteError::Read(ref io)) if is_length_limit(&io.to_string()) => {
                        too_large()
                    }
                    other => other.into(),
                })?;

            return Ok(Json(UploadResponse {
                status_url: format!("/status/{}", receipt.task_id),
                task_id: receipt.task_id,
                filename: receipt.filename,
                file_size: receipt.file_size,
                output_format: "json".to_string(),
                message: UPLOAD_MESSAGE.to_string(),
            }));
        }

        Err(AppError::BadRequest("No file provided".to_string()))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Consume the remaining multipart stream so the client sees our response, not a reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}
