use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::modules::{
    conversation::schema::{ordered_pair, ConversationEntity},
    message::{
        model::{MessageResponse, Pagination},
        schema::MessageType,
    },
    post::schema::PostSnapshot,
    user::schema::UserProfile,
};

/// Row to insert for a brand new conversation; post context is copied once, here.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub post_title: String,
    pub post_type: String,
    pub post_author_id: Uuid,
}

impl NewConversation {
    pub fn new(post: &PostSnapshot, user_a: Uuid, user_b: Uuid) -> Self {
        let (user1_id, user2_id) = ordered_pair(user_a, user_b);
        NewConversation {
            id: Uuid::now_v7(),
            post_id: post.id,
            user1_id,
            user2_id,
            post_title: post.title.clone(),
            post_type: post.post_type.clone(),
            post_author_id: post.author_id,
        }
    }
}

/// Conversation plus its last message and the viewer's unread count.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationSummaryRow {
    #[sqlx(flatten)]
    pub conversation: ConversationEntity,
    pub last_content: Option<String>,
    pub last_message_type: Option<MessageType>,
    pub last_sender_id: Option<Uuid>,
    pub last_created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub other_user_id: Uuid,
    #[validate(required(message = "postId is required"))]
    pub post_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 2000, message = "Message content must be at most 2000 characters"))]
    pub initial_message: String,
    pub client_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LookupQuery {
    pub other_user_id: Uuid,
    #[validate(required(message = "postId is required"))]
    pub post_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConversationQueryRequest {
    #[validate(range(min = 1, message = "Page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,
}

/// Post context captured when the conversation was created; serialized flat
/// (`postId`, `postTitle`, ...) onto the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostContext {
    pub post_id: Uuid,
    pub post_title: String,
    pub post_type: String,
    pub post_author_id: Uuid,
}

impl From<&ConversationEntity> for PostContext {
    fn from(conversation: &ConversationEntity) -> Self {
        PostContext {
            post_id: conversation.post_id,
            post_title: conversation.post_title.clone(),
            post_type: conversation.post_type.clone(),
            post_author_id: conversation.post_author_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: Uuid,
    #[serde(flatten)]
    pub post: PostContext,
    pub other_user: UserProfile,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_message_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedConversation {
    pub conversation: ConversationDetail,
    pub message: MessageResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub message_type: MessageType,
    pub sender_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    #[serde(flatten)]
    pub post: PostContext,
    pub other_user: UserProfile,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
    pub last_message_at: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationPage {
    pub conversations: Vec<ConversationSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total_conversations: i64,
    pub total_messages_sent: i64,
    pub total_unread: i64,
}
