use crate::config::ServiceConfig;
use anyhow::Context;
use std::path::Path;
use tracing::{info, warn};

/// Creates the upload and output directories and clears half-written
/// outputs left behind by an interrupted run.
pub async fn setup_storage(config: &ServiceConfig) -> anyhow::Result<()> {
    for dir in [&config.upload_dir, &config.processed_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let removed = remove_staging_files(&config.processed_dir).await?;
    if removed > 0 {
        warn!("🧹 Removed {} unfinished output file(s)", removed);
    }

    info!(
        "📁 Storage: uploads in {}, output in {}",
        config.upload_dir.display(),
        config.processed_dir.display()
    );
    Ok(())
}

async fn remove_staging_files(dir: &Path) -> anyhow::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("part") {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
