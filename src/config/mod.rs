use std::env;
use std::path::PathBuf;

/// Default read/write chunk for uploads: 1 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Runtime configuration for the ingestion and conversion pipeline
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Chunk size used when streaming uploads to disk (default: 1 MiB)
    pub chunk_size: usize,

    /// Directory holding raw uploads until conversion finishes (default: "uploads")
    pub upload_dir: PathBuf,

    /// Directory receiving the JSON results (default: "processed_data")
    pub processed_dir: PathBuf,

    /// Maximum accepted upload size in bytes (default: 1 GB)
    pub max_file_size: usize,

    /// Conversions allowed to run at the same time (default: 4)
    pub max_concurrent_conversions: usize,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed_data"),
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            max_concurrent_conversions: 4,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(default.chunk_size),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            processed_dir: env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.processed_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_concurrent_conversions: env::var("MAX_CONCURRENT_CONVERSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.max_concurrent_conversions),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Same defaults, rooted under `base` (used by tests and ad-hoc runs)
    pub fn with_root(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            upload_dir: base.join("uploads"),
            processed_dir: base.join("processed_data"),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.processed_dir, PathBuf::from("processed_data"));
        assert_eq!(config.max_concurrent_conversions, 4);
    }

    #[test]
    fn test_with_root() {
        let config = ServiceConfig::with_root("/tmp/converter");
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/converter/uploads"));
        assert_eq!(
            config.processed_dir,
            PathBuf::from("/tmp/converter/processed_data")
        );
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_from_env_overrides_and_fallbacks() {
        unsafe {
            env::set_var("CHUNK_SIZE", "0");
            env::set_var("MAX_CONCURRENT_CONVERSIONS", "not-a-number");
            env::set_var("UPLOAD_DIR", "/srv/incoming");
        }
        let config = ServiceConfig::from_env();
        unsafe {
            env::remove_var("CHUNK_SIZE");
            env::remove_var("MAX_CONCURRENT_CONVERSIONS");
            env::remove_var("UPLOAD_DIR");
        }

        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_concurrent_conversions, 4);
        assert_eq!(config.upload_dir, PathBuf::from("/srv/incoming"));
    }
}
