use serde::{Deserialize, Serialize};

/// Where an uploaded image ended up in the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub url: String,
    pub thumbnail_url: String,
}

/// Image upload policy
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
}

impl UploadConfig {
    pub fn with_max_file_size(max_file_size: usize) -> Self {
        Self { max_file_size, ..Self::default() }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10MB
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
                "image/heic".to_string(),
            ],
        }
    }
}
