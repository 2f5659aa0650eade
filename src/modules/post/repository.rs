use uuid::Uuid;

use crate::{api::error, modules::post::schema::PostSnapshot};

#[async_trait::async_trait]
pub trait PostRepository {
    async fn find_post(&self, id: &Uuid) -> Result<Option<PostSnapshot>, error::SystemError>;
}
