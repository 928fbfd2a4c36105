use crate::models::ExtractedContent;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod ooxml;
pub mod presentation;
pub mod spreadsheet;
pub mod word;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not a valid Office Open XML package: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Document part missing: {0}")]
    MissingPart(String),

    #[error(
        "Legacy binary {format} documents are not supported; save the file as {modern_extension} and upload it again"
    )]
    LegacyFormat {
        format: &'static str,
        modern_extension: &'static str,
    },

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// The document parsed but holds nothing worth converting.
    #[error("{0}")]
    NoUsableContent(String),
}

type Extractor = fn(&Path) -> Result<ExtractedContent, ExtractionError>;

/// The document families the service converts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Tabular,
    WordProcessing,
    Presentation,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 3] = [
        DocumentFormat::Tabular,
        DocumentFormat::WordProcessing,
        DocumentFormat::Presentation,
    ];

    /// Accepted extensions, lower-case with the leading dot; the OOXML one first.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DocumentFormat::Tabular => &[".xlsx", ".xls"],
            DocumentFormat::WordProcessing => &[".docx", ".doc"],
            DocumentFormat::Presentation => &[".pptx", ".ppt"],
        }
    }

    /// Looks up the family for an extension such as `.XLSX` or `docx`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let normalized = format!(".{}", extension.trim_start_matches('.').to_lowercase());
        Self::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&normalized.as_str()))
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Application name used in status messages.
    pub fn label(self) -> &'static str {
        match self {
            DocumentFormat::Tabular => "Excel",
            DocumentFormat::WordProcessing => "Word",
            DocumentFormat::Presentation => "PowerPoint",
        }
    }

    fn extractor(self) -> Extractor {
        match self {
            DocumentFormat::Tabular => spreadsheet::extract,
            DocumentFormat::WordProcessing => word::extract,
            DocumentFormat::Presentation => presentation::extract,
        }
    }

    /// Runs this family's extractor on `path`. Blocking.
    pub fn extract(self, path: &Path) -> Result<ExtractedContent, ExtractionError> {
        (self.extractor())(path)
    }
}

/// Every accepted extension, in family order.
pub fn supported_extensions() -> Vec<&'static str> {
    DocumentFormat::ALL
        .into_iter()
        .flat_map(|format| format.extensions().iter().copied())
        .collect()
}
