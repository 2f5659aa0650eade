use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{
        model::InsertMessage, repository::MessageRepository, schema::MessageEntity,
    },
};

#[derive(Clone)]
pub struct MessageRepositoryPg {
    pool: sqlx::PgPool,
}

impl MessageRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

/// Insert one message row. Shared with the conversation store's create-with-first-message
/// transaction.
pub async fn insert_message<'e, E>(
    message: &InsertMessage,
    tx: E,
) -> Result<MessageEntity, error::SystemError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let message = sqlx::query_as::<_, MessageEntity>(
        r#"
        INSERT INTO messages (
            id, conversation_id, sender_id, content, message_type,
            media_url, thumbnail_url, client_message_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(message.id)
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(&message.content)
    .bind(message.message_type)
    .bind(&message.media_url)
    .bind(&message.thumbnail_url)
    .bind(message.client_message_id)
    .fetch_one(tx)
    .await?;

    Ok(message)
}

#[async_trait::async_trait]
impl MessageRepository for MessageRepositoryPg {
    async fn append(
        &self,
        message: &InsertMessage,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        // row lock serializes against a concurrent soft delete
        let active = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversations WHERE id = $1 AND is_active = true FOR UPDATE",
        )
        .bind(message.conversation_id)
        .fetch_optional(tx.as_mut())
        .await?;

        if active.is_none() {
            return Ok(None);
        }

        let created = insert_message(message, tx.as_mut()).await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
            .bind(message.conversation_id)
            .bind(created.created_at)
            .execute(tx.as_mut())
            .await?;

        tx.commit().await?;

        Ok(Some(created))
    }

    async fn find_by_client_id(
        &self,
        conversation_id: &Uuid,
        sender_id: &Uuid,
        client_message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1 AND sender_id = $2 AND client_message_id = $3
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(client_message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn find_page(
        &self,
        conversation_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        // index on (conversation_id, created_at, id) where is_deleted = false
        let messages = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1 AND is_deleted = false
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn count(&self, conversation_id: &Uuid) -> Result<i64, error::SystemError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND is_deleted = false",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn mark_read(
        &self,
        conversation_id: &Uuid,
        reader_id: &Uuid,
    ) -> Result<u64, error::SystemError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = true, updated_at = NOW()
            WHERE conversation_id = $1 AND sender_id != $2 AND is_read = false
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_sent_by(&self, sender_id: &Uuid) -> Result<i64, error::SystemError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversations c ON c.id = m.conversation_id AND c.is_active = true
            WHERE m.sender_id = $1 AND m.is_deleted = false
            "#,
        )
        .bind(sender_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn count_unread_for(&self, reader_id: &Uuid) -> Result<i64, error::SystemError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversations c ON c.id = m.conversation_id AND c.is_active = true
            WHERE (c.user1_id = $1 OR c.user2_id = $1)
            AND m.sender_id != $1
            AND m.is_read = false
            AND m.is_deleted = false
            "#,
        )
        .bind(reader_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
