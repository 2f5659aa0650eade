use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    modules::conversation::{repository::ConversationRepository, schema::ConversationEntity},
};

/// Read-only lookup of the active conversation between two users about one post.
pub struct ConversationResolver<C>
where
    C: ConversationRepository + Send + Sync,
{
    conversation_repo: Arc<C>,
}

impl<C> Clone for ConversationResolver<C>
where
    C: ConversationRepository + Send + Sync,
{
    fn clone(&self) -> Self {
        Self { conversation_repo: self.conversation_repo.clone() }
    }
}

impl<C> ConversationResolver<C>
where
    C: ConversationRepository + Send + Sync,
{
    pub fn new(conversation_repo: Arc<C>) -> Self {
        Self { conversation_repo }
    }

    /// `post_id` is mandatory: a pair of users may hold one conversation per post,
    /// so a lookup by pair alone is ambiguous.
    pub async fn find_active_conversation(
        &self,
        current_user_id: Uuid,
        other_user_id: Uuid,
        post_id: Option<Uuid>,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let post_id = post_id.ok_or_else(|| error::SystemError::bad_request("postId is required"))?;

        let conversation = self
            .conversation_repo
            .find_active_by_user(&current_user_id)
            .await?
            .into_iter()
            .find(|c| {
                c.post_id == post_id && c.other_participant(&current_user_id) == Some(other_user_id)
            });

        Ok(conversation)
    }
}
