use crate::services::extractors::{DocumentFormat, supported_extensions};
use std::path::Path;

const MAX_NAME_BYTES: usize = 255;

/// Room left in a 255-byte file name for `processed_`, `_<uuid>` and the extension
const MAX_STEM_BYTES: usize = 180;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A client file name that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFilename {
    pub format: DocumentFormat,
    /// Sanitized stem, safe to use inside our own file names
    pub stem: String,
    /// Lower-cased extension including the dot
    pub extension: String,
}

/// Checks that a file name was supplied and carries a supported extension.
///
/// Runs before anything touches the disk.
pub fn validate_filename(filename: Option<&str>) -> Result<ValidatedFilename, ValidationError> {
    let filename = filename.map(str::trim).unwrap_or("");
    if filename.is_empty() {
        return Err(ValidationError {
            code: "NO_FILE",
            message: "No file provided".to_string(),
        });
    }

    let (stem, extension) = split_filename(&sanitize_filename(filename));
    let format = DocumentFormat::from_extension(&extension).ok_or_else(|| ValidationError {
        code: "UNSUPPORTED_EXTENSION",
        message: format!(
            "Only {} files are allowed",
            supported_extensions().join(", ")
        ),
    })?;

    Ok(ValidatedFilename {
        format,
        stem,
        extension,
    })
}

/// Sanitizes filename to prevent path traversal and injection attacks
pub fn sanitize_filename(filename: &str) -> String {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    // Get only the filename component (remove any path)
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.len() <= MAX_NAME_BYTES {
        return sanitized;
    }

    // Shorten the stem so the extension survives.
    match sanitized.rfind('.') {
        Some(dot) if dot > 0 && sanitized.len() - dot < MAX_NAME_BYTES => {
            let (stem, extension) = sanitized.split_at(dot);
            let stem = truncate_utf8(stem, MAX_NAME_BYTES - extension.len());
            format!("{stem}{extension}")
        }
        _ => truncate_utf8(&sanitized, MAX_NAME_BYTES).to_string(),
    }
}

/// Splits a sanitized name into stem and lower-cased `.ext` (empty when absent).
pub fn split_filename(name: &str) -> (String, String) {
    let path = Path::new(name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let stem = truncate_utf8(stem, MAX_STEM_BYTES);
    let stem = if stem.is_empty() { "file" } else { stem };
    (stem.to_string(), extension)
}

/// Raw upload name: `{stem}_{task_id}{ext}`
pub fn stored_filename(stem: &str, task_id: &str, extension: &str) -> String {
    format!("{stem}_{task_id}{extension}")
}

/// Converted output name: `processed_{stem}_{task_id}.json`
pub fn output_filename(stem: &str, task_id: &str) -> String {
    format!("processed_{stem}_{task_id}.json")
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
