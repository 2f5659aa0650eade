use uuid::Uuid;

use crate::{
    api::error,
    modules::file_upload::{model::StoredBlob, store::BlobStore},
};

/// Writes images under a local directory served as static files.
///
/// No resizing happens here, so the thumbnail URL points at the original.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    upload_dir: String,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(upload_dir: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { upload_dir: upload_dir.into(), base_url: base_url.into() }
    }

    fn generate_filename(mime_type: &str) -> String {
        let extension = mime_guess::get_mime_extensions_str(mime_type)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        format!("{}.{}", Uuid::now_v7(), extension)
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<StoredBlob, error::SystemError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let filename = Self::generate_filename(mime_type);
        let file_path = format!("{}/{}", self.upload_dir, filename);
        tokio::fs::write(&file_path, &bytes).await?;

        log::debug!("Stored {} bytes at {}", bytes.len(), file_path);

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), filename);
        Ok(StoredBlob { thumbnail_url: url.clone(), url })
    }
}
