use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        conversation::{
            model::{ConversationSummaryRow, NewConversation},
            schema::ConversationEntity,
        },
        message::{model::InsertMessage, schema::MessageEntity},
    },
};

#[async_trait::async_trait]
pub trait ConversationRepository {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError>;

    async fn find_active_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationEntity>, error::SystemError>;

    /// Insert the conversation and its first message atomically.
    ///
    /// A second active conversation for the same (post, pair) fails with
    /// `SystemError::Conflict` on `conversations_active_unique`.
    async fn create_with_message(
        &self,
        conversation: &NewConversation,
        first_message: &InsertMessage,
    ) -> Result<(ConversationEntity, MessageEntity), error::SystemError>;

    /// Soft delete. Returns false if the conversation was not active.
    async fn deactivate(&self, conversation_id: &Uuid) -> Result<bool, error::SystemError>;

    /// One page of the active conversations of `user_id`, most recent activity first.
    async fn find_summaries_by_user(
        &self,
        user_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummaryRow>, error::SystemError>;

    async fn count_active_by_user(&self, user_id: &Uuid) -> Result<i64, error::SystemError>;
}
