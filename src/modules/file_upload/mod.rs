pub mod model;
pub mod service;
pub mod store;
pub mod store_local;

pub use model::{StoredBlob, UploadConfig};
pub use service::ImageUploadService;
pub use store::BlobStore;
pub use store_local::LocalBlobStore;
