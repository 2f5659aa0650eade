use uuid::Uuid;

use crate::modules::message::model::InsertMessage;
use crate::{api::error, modules::message::schema::MessageEntity};

#[async_trait::async_trait]
pub trait MessageRepository {
    /// Append to an active conversation and bump its `last_message_at` in one transaction.
    ///
    /// Returns `None` when the conversation is missing or no longer active.
    async fn append(
        &self,
        message: &InsertMessage,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    async fn find_by_client_id(
        &self,
        conversation_id: &Uuid,
        sender_id: &Uuid,
        client_message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    /// Ordered by `(created_at, id)` ascending.
    async fn find_page(
        &self,
        conversation_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    async fn count(&self, conversation_id: &Uuid) -> Result<i64, error::SystemError>;

    /// Mark everything the other participant sent as read; returns how many rows changed.
    async fn mark_read(
        &self,
        conversation_id: &Uuid,
        reader_id: &Uuid,
    ) -> Result<u64, error::SystemError>;

    /// Messages sent by `sender_id` in conversations that are still active.
    async fn count_sent_by(&self, sender_id: &Uuid) -> Result<i64, error::SystemError>;

    /// Unread messages addressed to `reader_id` across their active conversations.
    async fn count_unread_for(&self, reader_id: &Uuid) -> Result<i64, error::SystemError>;
}
