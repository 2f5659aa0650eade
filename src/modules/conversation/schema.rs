use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ConversationEntity {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub post_title: String,
    pub post_type: String,
    pub post_author_id: Uuid,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_message_at: chrono::DateTime<chrono::Utc>,
}

impl ConversationEntity {
    pub fn has_participant(&self, user_id: &Uuid) -> bool {
        self.user1_id == *user_id || self.user2_id == *user_id
    }

    pub fn other_participant(&self, user_id: &Uuid) -> Option<Uuid> {
        if self.user1_id == *user_id {
            Some(self.user2_id)
        } else if self.user2_id == *user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// Pairs are stored smallest id first so (a, b) and (b, a) hit the same unique index entry.
pub fn ordered_pair(user_a: Uuid, user_b: Uuid) -> (Uuid, Uuid) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}
