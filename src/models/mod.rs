use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Lifecycle of an upload: `uploading → queued → processing → {completed | failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Uploading,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Position in the forward-only ordering; both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Uploading => 0,
            TaskStatus::Queued => 1,
            TaskStatus::Processing => 2,
            TaskStatus::Completed | TaskStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a record in `self` may be overwritten with `next`.
    ///
    /// Moves go one step forward at a time, except that any non-terminal
    /// status may fail. Re-stamping a non-terminal status (to refresh its
    /// details) is allowed; a terminal status is final.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskStatus::Failed => true,
            _ => next.rank() == self.rank() || next.rank() == self.rank() + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Uploading => "uploading",
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one task as held by the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A raw upload sitting in the uploads directory, waiting for conversion.
///
/// Owned by whoever is responsible for removing it; dropping it without
/// calling [`UploadedFile::remove`] still deletes the file.
#[derive(Debug)]
pub struct UploadedFile {
    path: PathBuf,
    original_filename: String,
    task_id: String,
    armed: bool,
}

impl UploadedFile {
    pub fn new(path: PathBuf, original_filename: String, task_id: String) -> Self {
        Self {
            path,
            original_filename,
            task_id,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Deletes the raw file. A file that is already gone is not an error.
    pub async fn remove(mut self) -> std::io::Result<()> {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// The JSON document written for a completed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedResult {
    pub path: PathBuf,
    pub file_name: String,
}

/// One block of word-processing content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentBlock {
    Paragraph { text: String, index: usize },
    Table { data: Vec<Vec<String>>, index: usize },
}

impl DocumentBlock {
    pub fn index(&self) -> usize {
        match self {
            DocumentBlock::Paragraph { index, .. } | DocumentBlock::Table { index, .. } => *index,
        }
    }
}

/// One element found on a slide
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SlideElement {
    Paragraph { text: String },
    Table { data: Vec<Vec<String>> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideContent {
    pub slide_number: usize,
    pub elements: Vec<SlideElement>,
}

/// Format-specific extraction output; serializes to the bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedContent {
    Tabular(Vec<Map<String, Value>>),
    WordProcessing(Vec<DocumentBlock>),
    Presentation(Vec<SlideContent>),
}

impl ExtractedContent {
    pub fn len(&self) -> usize {
        match self {
            ExtractedContent::Tabular(records) => records.len(),
            ExtractedContent::WordProcessing(blocks) => blocks.len(),
            ExtractedContent::Presentation(slides) => slides.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_ordering() {
        assert!(TaskStatus::Uploading.can_advance_to(TaskStatus::Queued));
        assert!(TaskStatus::Queued.can_advance_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_advance_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_advance_to(TaskStatus::Failed));
        assert!(!TaskStatus::Processing.can_advance_to(TaskStatus::Queued));
        assert!(!TaskStatus::Completed.can_advance_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_advance_to(TaskStatus::Failed));
    }

    #[test]
    fn test_status_cannot_skip_steps() {
        assert!(!TaskStatus::Uploading.can_advance_to(TaskStatus::Processing));
        assert!(!TaskStatus::Uploading.can_advance_to(TaskStatus::Completed));
        assert!(!TaskStatus::Queued.can_advance_to(TaskStatus::Completed));
        assert!(TaskStatus::Uploading.can_advance_to(TaskStatus::Failed));
        assert!(TaskStatus::Queued.can_advance_to(TaskStatus::Failed));
        assert!(TaskStatus::Processing.can_advance_to(TaskStatus::Completed));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(json!(TaskStatus::Processing), json!("processing"));
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_content_serialization_shapes() {
        let blocks = ExtractedContent::WordProcessing(vec![
            DocumentBlock::Paragraph {
                text: "Intro".to_string(),
                index: 0,
            },
            DocumentBlock::Table {
                data: vec![vec!["a".to_string(), "b".to_string()]],
                index: 4,
            },
        ]);
        assert_eq!(
            serde_json::to_value(&blocks).unwrap(),
            json!([
                {"type": "paragraph", "text": "Intro", "index": 0},
                {"type": "table", "data": [["a", "b"]], "index": 4}
            ])
        );

        let slides = ExtractedContent::Presentation(vec![SlideContent {
            slide_number: 1,
            elements: vec![SlideElement::Paragraph {
                text: "Title".to_string(),
            }],
        }]);
        assert_eq!(
            serde_json::to_value(&slides).unwrap(),
            json!([{"slide_number": 1, "elements": [{"type": "paragraph", "text": "Title"}]}])
        );
    }

    #[test]
    fn test_uploaded_file_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.docx");
        std::fs::write(&path, b"data").unwrap();

        let file = UploadedFile::new(path.clone(), "raw.docx".to_string(), "t1".to_string());
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_uploaded_file_remove_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.xlsx");
        let file = UploadedFile::new(path, "gone.xlsx".to_string(), "t2".to_string());
        assert!(file.remove().await.is_ok());
    }
}
