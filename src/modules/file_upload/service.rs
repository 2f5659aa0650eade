use std::sync::Arc;

use crate::api::error;
use crate::modules::file_upload::{
    model::{StoredBlob, UploadConfig},
    store::BlobStore,
};

#[derive(Clone)]
pub struct ImageUploadService<B>
where
    B: BlobStore + Send + Sync,
{
    store: Arc<B>,
    config: UploadConfig,
}

impl<B> ImageUploadService<B>
where
    B: BlobStore + Send + Sync,
{
    pub fn new(store: Arc<B>, config: UploadConfig) -> Self {
        Self { store, config }
    }

    pub fn max_file_size(&self) -> usize {
        self.config.max_file_size
    }

    /// Validate image type and size
    pub fn validate(&self, file_size: usize, mime_type: &str) -> Result<(), error::SystemError> {
        if file_size == 0 {
            return Err(error::SystemError::bad_request("Image is empty"));
        }

        if file_size > self.config.max_file_size {
            return Err(error::SystemError::bad_request(format!(
                "Image size exceeds maximum allowed size of {} bytes",
                self.config.max_file_size
            )));
        }

        if !self.config.allowed_mime_types.iter().any(|m| m.eq_ignore_ascii_case(mime_type)) {
            return Err(error::SystemError::bad_request(format!(
                "File type '{}' is not allowed",
                mime_type
            )));
        }

        Ok(())
    }

    /// Hand the bytes to the blob store. Every store failure is reported as a retryable
    /// upload error.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<StoredBlob, error::SystemError> {
        self.validate(bytes.len(), mime_type)?;

        self.store.upload(bytes, mime_type).await.map_err(|e| match e {
            error::SystemError::Upload(cause) => error::SystemError::Upload(cause),
            other => error::SystemError::upload(other.to_string()),
        })
    }
}
