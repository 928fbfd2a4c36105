use crate::models::{ProcessedResult, UploadedFile};
use crate::services::conversion::{ConversionError, ConversionOrchestrator};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

pub type ConversionHandle = JoinHandle<Result<ProcessedResult, ConversionError>>;

/// Runs conversions in the background, at most `max_concurrent` at a time.
#[derive(Debug, Clone)]
pub struct ConversionWorker {
    orchestrator: Arc<ConversionOrchestrator>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl ConversionWorker {
    pub fn new(orchestrator: ConversionOrchestrator, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        tracing::info!(
            "🚀 Conversion worker started ({} concurrent conversions)",
            max_concurrent
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            tracker: TaskTracker::new(),
        }
    }

    /// Schedules the conversion of `upload` and returns immediately.
    ///
    /// The handle resolves to the orchestrator's outcome; callers are free to
    /// drop it.
    pub fn submit(&self, upload: UploadedFile) -> ConversionHandle {
        let orchestrator = self.orchestrator.clone();
        let permits = self.permits.clone();
        tracing::debug!("Queued conversion for task {}", upload.task_id());

        self.tracker.spawn(async move {
            // The semaphore is never closed, so this only waits.
            let _permit = permits.acquire_owned().await.ok();
            orchestrator.run(upload).await
        })
    }

    /// Conversions scheduled or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every scheduled conversion to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            tracing::info!(
                "🛑 Waiting for {} conversion(s) to finish",
                self.tracker.len()
            );
        }
        self.tracker.wait().await;
        tracing::info!("🛑 Conversion worker stopped");
    }
}
