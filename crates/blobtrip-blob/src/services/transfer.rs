//! Upload local files into a container and download blobs back to disk

use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::container::Container;
use super::store::BlobStore;
use crate::error::BlobError;

const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Information about an uploaded blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobInfo {
    pub name: String,
    pub uri: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Moves file contents between the local disk and a container
#[derive(Clone)]
pub struct BlobTransfer {
    store: Arc<dyn BlobStore>,
}

impl BlobTransfer {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload `source` as `blob_name`, defaulting to the file's own name.
    /// An existing blob of the same name is overwritten.
    pub async fn upload(
        &self,
        container: &Container,
        source: &Path,
        blob_name: Option<&str>,
    ) -> Result<BlobInfo, BlobError> {
        container.ensure_live()?;

        let metadata = tokio::fs::metadata(source)
            .await
            .map_err(|e| BlobError::local_io(source, e))?;
        if !metadata.is_file() {
            return Err(BlobError::local_io(
                source,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let name = match blob_name {
            Some(name) => name.to_string(),
            None => file_name_of(source)?,
        };
        if name.is_empty() {
            return Err(BlobError::InvalidName("blob name is empty".to_string()));
        }

        let content_type = guess_content_type(&name);
        debug!(
            "PUT {}/{} ({} bytes, {})",
            container.name(),
            name,
            metadata.len(),
            content_type
        );

        let size = self
            .store
            .put_blob(container.name(), &name, source, content_type)
            .await?;

        let info = BlobInfo {
            uri: self.store.blob_uri(container.name(), &name),
            name,
            content_type: content_type.to_string(),
            size,
            uploaded_at: Utc::now(),
        };
        info!("Uploaded {} ({} bytes)", info.uri, info.size);
        Ok(info)
    }

    /// Download `blob_name` into `destination`, replacing any existing
    /// content. Returns the number of bytes written.
    pub async fn download(
        &self,
        container: &Container,
        blob_name: &str,
        destination: &Path,
    ) -> Result<u64, BlobError> {
        container.ensure_live()?;

        debug!("GET {}/{} -> {}", container.name(), blob_name, destination.display());
        let mut reader = self.store.open_blob(container.name(), blob_name).await?;

        let mut file = File::create(destination)
            .await
            .map_err(|e| BlobError::local_io(destination, e))?;

        // Read failures come from the service stream, write failures from the disk
        let mut buf = BytesMut::with_capacity(DOWNLOAD_CHUNK_SIZE);
        let mut written = 0u64;
        loop {
            buf.clear();
            let read = reader.read_buf(&mut buf).await.map_err(|e| {
                BlobError::Service(format!(
                    "GET {}/{} failed after {} bytes: {}",
                    container.name(),
                    blob_name,
                    written,
                    e
                ))
            })?;
            if read == 0 {
                break;
            }
            file.write_all(&buf)
                .await
                .map_err(|e| BlobError::local_io(destination, e))?;
            written += read as u64;
        }
        file.flush()
            .await
            .map_err(|e| BlobError::local_io(destination, e))?;

        info!("Downloaded {} bytes to {}", written, destination.display());
        Ok(written)
    }
}

fn file_name_of(path: &Path) -> Result<String, BlobError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            BlobError::InvalidName(format!("cannot derive a blob name from {}", path.display()))
        })
}

/// Guess content type from the blob name's extension
pub fn guess_content_type(name: &str) -> &'static str {
    let extension = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => return "application/octet-stream",
    };

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        _ => "application/octet-stream",
    }
}
