use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::modules::file_upload::StoredBlob;
use crate::modules::message::schema::{MessageEntity, MessageType};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A message before it knows which conversation it lands in.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub client_message_id: Option<Uuid>,
}

impl MessageDraft {
    pub fn text(sender_id: Uuid, content: String, client_message_id: Option<Uuid>) -> Self {
        MessageDraft {
            sender_id,
            content,
            message_type: MessageType::Text,
            media_url: None,
            thumbnail_url: None,
            client_message_id,
        }
    }

    pub fn image(
        sender_id: Uuid,
        caption: String,
        blob: &StoredBlob,
        client_message_id: Option<Uuid>,
    ) -> Self {
        MessageDraft {
            sender_id,
            content: caption,
            message_type: MessageType::Image,
            media_url: Some(blob.url.clone()),
            thumbnail_url: Some(blob.thumbnail_url.clone()),
            client_message_id,
        }
    }

    pub fn for_conversation(&self, conversation_id: Uuid) -> InsertMessage {
        InsertMessage {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id: self.sender_id,
            content: self.content.clone(),
            message_type: self.message_type,
            media_url: self.media_url.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            client_message_id: self.client_message_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub client_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub image_url: String,
    pub thumbnail_url: String,
}

/// The one message shape clients see, whatever its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: Option<ImageMetadata>,
    pub client_message_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<MessageEntity> for MessageResponse {
    fn from(entity: MessageEntity) -> Self {
        let metadata = match (entity.message_type, entity.media_url) {
            (MessageType::Image, Some(image_url)) => Some(ImageMetadata {
                thumbnail_url: entity.thumbnail_url.unwrap_or_else(|| image_url.clone()),
                image_url,
            }),
            _ => None,
        };

        MessageResponse {
            id: entity.id,
            conversation_id: entity.conversation_id,
            sender_id: entity.sender_id,
            content: entity.content,
            message_type: entity.message_type,
            metadata,
            client_message_id: entity.client_message_id,
            is_read: entity.is_read,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let pages = (total + limit as i64 - 1) / limit as i64;
        Pagination { page, limit, total, pages }
    }
}

/// One page of a conversation, oldest page first, oldest message first within the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<MessageResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(max = 2000, message = "Message content must be at most 2000 characters"))]
    pub content: String,
    pub client_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MessageQueryRequest {
    #[validate(range(min = 1, message = "Page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub updated_count: u64,
}
