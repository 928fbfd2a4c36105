use crate::config::ServiceConfig;
use crate::models::{TaskStatus, UploadedFile};
use crate::services::chunked_writer::{WriteError, write_chunked};
use crate::services::task_registry::{RegistryError, TaskRegistry};
use crate::services::worker::{ConversionHandle, ConversionWorker};
use crate::utils::validation::{ValidationError, stored_filename, validate_filename};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

pub const UPLOADING_DETAILS: &str = "Saving file to disk in chunks";
pub const QUEUED_DETAILS: &str = "File uploaded successfully, processing queued for JSON output";
pub const SAVE_FAILED_DETAILS: &str = "Failed to save file";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{}", .0.message)]
    Validation(#[from] ValidationError),

    #[error("Failed to save file: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What the caller gets back once the upload is on disk
#[derive(Debug)]
pub struct IngestReceipt {
    pub task_id: String,
    pub filename: String,
    pub file_size: u64,
    pub stored_path: PathBuf,
    pub conversion: ConversionHandle,
}

/// Accepts uploads: validates, stores them in chunks and hands them to the
/// conversion worker.
#[derive(Debug, Clone)]
pub struct IngestionService {
    registry: TaskRegistry,
    worker: ConversionWorker,
    upload_dir: PathBuf,
    chunk_size: usize,
}

impl IngestionService {
    pub fn new(config: &ServiceConfig, registry: TaskRegistry, worker: ConversionWorker) -> Self {
        Self {
            registry,
            worker,
            upload_dir: config.upload_dir.clone(),
            chunk_size: config.chunk_size,
        }
    }

    /// Stores the stream as a new task and schedules its conversion.
    ///
    /// Returns as soon as the bytes are on disk; the conversion continues in
    /// the background. Invalid names are rejected before any file or task is
    /// created.
    pub async fn accept<R>(&self, filename: Option<&str>, reader: R) -> Result<IngestReceipt, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let validated = validate_filename(filename)?;
        let original = filename.unwrap_or_default().trim().to_string();

        let task_id = Uuid::new_v4().to_string();
        let stored_path = self.upload_dir.join(stored_filename(
            &validated.stem,
            &task_id,
            &validated.extension,
        ));

        self.registry
            .set_status(&task_id, TaskStatus::Uploading, UPLOADING_DETAILS)?;

        let file_size = match write_chunked(reader, &stored_path, self.chunk_size).await {
            Ok(written) => written,
            Err(e) => {
                tracing::error!("Upload for task {} failed: {}", task_id, e);
                if let Err(registry_err) =
                    self.registry
                        .set_status(&task_id, TaskStatus::Failed, SAVE_FAILED_DETAILS)
                {
                    tracing::error!("Could not mark task {} as failed: {}", task_id, registry_err);
                }
                return Err(e.into());
            }
        };

        let upload = UploadedFile::new(stored_path.clone(), original.clone(), task_id.clone());
        self.registry
            .set_status(&task_id, TaskStatus::Queued, QUEUED_DETAILS)?;

        tracing::info!(
            "Task {} queued: {} ({} bytes, {})",
            task_id,
            original,
            file_size,
            validated.format.label()
        );
        let conversion = self.worker.submit(upload);

        Ok(IngestReceipt {
            task_id,
            filename: original,
            file_size,
            stored_path,
            conversion,
        })
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }
}
