use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read upload stream: {0}")]
    Read(std::io::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Streams `reader` into `destination` one chunk at a time and returns the byte count.
///
/// At most `chunk_size` bytes are buffered. On failure the partially written
/// destination is removed. The reader is consumed either way.
pub async fn write_chunked<R>(
    mut reader: R,
    destination: &Path,
    chunk_size: usize,
) -> Result<u64, WriteError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(destination)
        .await
        .map_err(|source| WriteError::Create {
            path: destination.to_path_buf(),
            source,
        })?;

    let result = copy_in_chunks(&mut reader, &mut file, destination, chunk_size.max(1)).await;
    drop(reader);
    drop(file);

    match result {
        Ok(total) => {
            tracing::info!(
                "File saved successfully: {} ({} bytes)",
                destination.display(),
                total
            );
            Ok(total)
        }
        Err(e) => {
            tracing::error!("Error saving file in chunks: {}", e);
            if let Err(remove_err) = tokio::fs::remove_file(destination).await
                && remove_err.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(
                    "Failed to remove partial file {}: {}",
                    destination.display(),
                    remove_err
                );
            }
            Err(e)
        }
    }
}

async fn copy_in_chunks<R>(
    reader: &mut R,
    file: &mut File,
    destination: &Path,
    chunk_size: usize,
) -> Result<u64, WriteError>
where
    R: AsyncRead + Unpin,
{
    let write_err = |source| WriteError::Write {
        path: destination.to_path_buf(),
        source,
    };

    let mut buffer = vec![0u8; chunk_size];
    let mut total: u64 = 0;

    loop {
        let mut n = 0;
        while n < chunk_size {
            let read = reader
                .read(&mut buffer[n..])
                .await
                .map_err(WriteError::Read)?;
            if read == 0 {
                break;
            }
            n += read;
        }

        if n == 0 {
            break;
        }

        file.write_all(&buffer[..n]).await.map_err(write_err)?;
        total += n as u64;

        if n < chunk_size {
            break;
        }
    }

    file.flush().await.map_err(write_err)?;
    Ok(total)
}
