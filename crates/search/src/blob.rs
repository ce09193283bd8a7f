use std::path::Path;

use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

use nl2sql_core::config::StorageConfig;

use crate::error::SearchError;
use crate::index::IndexType;

/// Uploads generated dictionary files to a blob container through a SAS URL.
pub struct BlobUploader {
    client: reqwest::Client,
    container_url: Url,
}

impl BlobUploader {
    pub fn new(container_sas_url: &str) -> Result<Self, SearchError> {
        Ok(Self {
            client: reqwest::Client::new(),
            container_url: Url::parse(container_sas_url)?,
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, SearchError> {
        let url = config
            .container_sas_url
            .as_deref()
            .ok_or(SearchError::NotConfigured("StorageAccount__ContainerSasUrl"))?;
        Self::new(url)
    }

    /// Blob URL for `{folder}/{relative}`, keeping the SAS query string.
    pub fn blob_url(&self, folder: &str, relative: &Path) -> Result<Url, SearchError> {
        let mut url = self.container_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SearchError::NotConfigured("StorageAccount__ContainerSasUrl"))?;
            segments.pop_if_empty().push(folder);
            for part in relative.iter() {
                segments.push(&part.to_string_lossy());
            }
        }
        Ok(url)
    }

    /// Upload every `.json` / `.jsonl` file under `local_dir` into `folder`.
    /// Returns the number of blobs written. Unreadable directory entries
    /// fail the upload.
    pub async fn upload_directory(&self, local_dir: &Path, folder: &str) -> Result<usize, SearchError> {
        let mut uploaded = 0;
        for entry in WalkDir::new(local_dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_dictionary_file(path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(local_dir) else {
                continue;
            };

            let url = self.blob_url(folder, relative)?;
            let body = tokio::fs::read(path).await?;
            let response = self
                .client
                .put(url)
                .header("x-ms-blob-type", "BlockBlob")
                .header("Content-Type", content_type(path))
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SearchError::from_status(status.as_u16(), body));
            }
            uploaded += 1;
        }
        info!("Uploaded {} files to {}", uploaded, folder);
        Ok(uploaded)
    }

    /// Upload the store folders found under a dictionary output directory.
    pub async fn upload_dictionary(&self, base_dir: &Path) -> Result<usize, SearchError> {
        let mut total = 0;
        for index_type in IndexType::ALL {
            let dir = base_dir.join(index_type.folder());
            if !dir.is_dir() {
                warn!("Skipping missing folder {}", dir.display());
                continue;
            }
            total += self.upload_directory(&dir, index_type.folder()).await?;
        }
        Ok(total)
    }
}

fn is_dictionary_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("jsonl")
    )
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => "application/jsonl",
        _ => "application/json",
    }
}
