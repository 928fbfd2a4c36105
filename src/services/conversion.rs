use crate::models::{ProcessedResult, TaskStatus, UploadedFile};
use crate::services::extractors::{DocumentFormat, ExtractionError};
use crate::services::task_registry::{RegistryError, TaskRegistry};
use crate::utils::validation::{output_filename, sanitize_filename, split_filename};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Extraction task failed: {0}")]
    Worker(String),
}

/// Turns one uploaded file into its JSON document and drives the task to
/// a terminal status.
#[derive(Debug, Clone)]
pub struct ConversionOrchestrator {
    registry: TaskRegistry,
    processed_dir: PathBuf,
}

impl ConversionOrchestrator {
    pub fn new(registry: TaskRegistry, processed_dir: PathBuf) -> Self {
        Self {
            registry,
            processed_dir,
        }
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Converts `upload` and records the outcome in the registry.
    ///
    /// Every failure ends as a `failed` status carrying the error message; the
    /// returned error only reports what happened. The raw upload is removed
    /// last whatever the outcome.
    pub async fn run(&self, upload: UploadedFile) -> Result<ProcessedResult, ConversionError> {
        let task_id = upload.task_id().to_string();
        let outcome = self.convert(&upload).await;

        match &outcome {
            Ok(result) => {
                tracing::info!("Task {} completed: {}", task_id, result.path.display());
            }
            Err(e) => {
                if matches!(e, ConversionError::Extraction(ExtractionError::NoUsableContent(_))) {
                    tracing::warn!("Task {} produced no output: {}", task_id, e);
                } else {
                    tracing::error!("Error processing file for task {}: {}", task_id, e);
                }
                if let Err(registry_err) =
                    self.registry
                        .set_status(&task_id, TaskStatus::Failed, e.to_string())
                {
                    tracing::error!(
                        "Could not mark task {} as failed: {}",
                        task_id,
                        registry_err
                    );
                }
            }
        }

        let raw_path = upload.path().to_path_buf();
        match upload.remove().await {
            Ok(()) => tracing::info!("Removed temporary file: {}", raw_path.display()),
            Err(e) => tracing::warn!(
                "Failed to remove temporary file {}: {}",
                raw_path.display(),
                e
            ),
        }

        outcome
    }

    async fn convert(&self, upload: &UploadedFile) -> Result<ProcessedResult, ConversionError> {
        let task_id = upload.task_id();
        self.registry
            .set_status(task_id, TaskStatus::Processing, "Starting file processing")?;

        if !tokio::fs::try_exists(upload.path()).await.unwrap_or(false) {
            return Err(ConversionError::NotFound(upload.path().to_path_buf()));
        }

        let format = DocumentFormat::from_filename(upload.original_filename()).ok_or_else(|| {
            ExtractionError::UnsupportedFormat(upload.original_filename().to_string())
        })?;
        self.registry.set_status(
            task_id,
            TaskStatus::Processing,
            format!("Reading {} file", format.label()),
        )?;

        let source = upload.path().to_path_buf();
        let content = tokio::task::spawn_blocking(move || format.extract(&source))
            .await
            .map_err(|e| ConversionError::Worker(e.to_string()))??;

        if content.is_empty() {
            tracing::warn!("Task {}: {} file yielded no content", task_id, format.label());
        }

        let (stem, _) = split_filename(&sanitize_filename(upload.original_filename()));
        let file_name = output_filename(&stem, task_id);
        let path = self.processed_dir.join(&file_name);
        let json = serde_json::to_vec_pretty(&content)?;
        write_atomically(&path, &json).await?;

        self.registry.set_status(
            task_id,
            TaskStatus::Completed,
            format!("Output saved to {file_name}"),
        )?;

        Ok(ProcessedResult { path, file_name })
    }
}

/// Writes `bytes` next to `path` and renames into place, so readers never
/// see a half-written document.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".part");
    let staging = PathBuf::from(staging);

    let result = match tokio::fs::write(&staging, bytes).await {
        Ok(()) => tokio::fs::rename(&staging, path).await,
        Err(e) => Err(e),
    };

    if let Err(source) = result {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(ConversionError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
