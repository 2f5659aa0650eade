use crate::{api::error, modules::file_upload::model::StoredBlob};

/// Opaque, replaceable image storage. Only the returned URLs are persisted.
#[async_trait::async_trait]
pub trait BlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<StoredBlob, error::SystemError>;
}
