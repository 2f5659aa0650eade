use uuid::Uuid;

use crate::modules::conversation::model::{ConversationSummaryRow, NewConversation};
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::message::{
    model::InsertMessage, repository_pg::insert_message, schema::MessageEntity,
};
use crate::{api::error, modules::conversation::schema::ConversationEntity};

#[derive(Clone)]
pub struct ConversationPgRepository {
    pool: sqlx::PgPool,
}

impl ConversationPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationPgRepository {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let conversation =
            sqlx::query_as::<_, ConversationEntity>("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    async fn find_active_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationEntity>, error::SystemError> {
        let conversations = sqlx::query_as::<_, ConversationEntity>(
            r#"
            SELECT * FROM conversations
            WHERE (user1_id = $1 OR user2_id = $1) AND is_active = true
            ORDER BY last_message_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    async fn create_with_message(
        &self,
        conversation: &NewConversation,
        first_message: &InsertMessage,
    ) -> Result<(ConversationEntity, MessageEntity), error::SystemError> {
        let mut tx = self.pool.begin().await?;

        // conversations_active_unique rejects the loser of a concurrent create here
        let created = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations
                (id, post_id, user1_id, user2_id, post_title, post_type, post_author_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.post_id)
        .bind(conversation.user1_id)
        .bind(conversation.user2_id)
        .bind(&conversation.post_title)
        .bind(&conversation.post_type)
        .bind(conversation.post_author_id)
        .fetch_one(tx.as_mut())
        .await?;

        let message = insert_message(first_message, tx.as_mut()).await?;

        let created = sqlx::query_as::<_, ConversationEntity>(
            "UPDATE conversations SET last_message_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(created.id)
        .bind(message.created_at)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;

        Ok((created, message))
    }

    async fn deactivate(&self, conversation_id: &Uuid) -> Result<bool, error::SystemError> {
        let result = sqlx::query(
            "UPDATE conversations SET is_active = false WHERE id = $1 AND is_active = true",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_summaries_by_user(
        &self,
        user_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummaryRow>, error::SystemError> {
        let rows = sqlx::query_as::<_, ConversationSummaryRow>(
            r#"
            SELECT
                c.*,
                m.content AS last_content,
                m.message_type AS last_message_type,
                m.sender_id AS last_sender_id,
                m.created_at AS last_created_at,
                (
                    SELECT COUNT(*)
                    FROM messages u
                    WHERE u.conversation_id = c.id
                    AND u.sender_id != $1
                    AND u.is_read = false
                    AND u.is_deleted = false
                ) AS unread_count
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT content, message_type, sender_id, created_at
                FROM messages
                WHERE conversation_id = c.id AND is_deleted = false
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ) m ON true
            WHERE (c.user1_id = $1 OR c.user2_id = $1) AND c.is_active = true
            ORDER BY c.last_message_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_active_by_user(&self, user_id: &Uuid) -> Result<i64, error::SystemError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM conversations
            WHERE (user1_id = $1 OR user2_id = $1) AND is_active = true
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
