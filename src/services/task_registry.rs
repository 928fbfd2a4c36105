use crate::models::{TaskRecord, TaskStatus};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// In-memory status table shared by the ingestion and conversion services.
///
/// Clones share the same map. Each update runs under the entry lock of its
/// key, so writers on different tasks never observe each other's records
/// half-written. Records are kept for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the record for `task_id`, stamping the current time.
    ///
    /// Refuses to move a task backwards, past the next step, or out of a
    /// terminal status.
    pub fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        details: impl Into<String>,
    ) -> Result<TaskRecord, RegistryError> {
        let record = TaskRecord {
            status,
            details: Some(details.into()),
            timestamp: Utc::now(),
        };

        match self.tasks.entry(task_id.to_string()) {
            Entry::Occupied(mut existing) => {
                let current = existing.get().status;
                if !current.can_advance_to(status) {
                    return Err(RegistryError::InvalidTransition {
                        task_id: task_id.to_string(),
                        from: current,
                        to: status,
                    });
                }
                existing.insert(record.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }

        tracing::debug!("Task {} -> {}", task_id, status);
        Ok(record)
    }

    pub fn get(&self, task_id: &str) -> Result<TaskRecord, RegistryError> {
        self.tasks
            .get(task_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(task_id.to_string()))
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
