use uuid::Uuid;

use crate::{api::error, modules::user::schema::UserProfile};

#[async_trait::async_trait]
pub trait UserRepository {
    async fn find_profile(&self, id: &Uuid) -> Result<Option<UserProfile>, error::SystemError>;
}
