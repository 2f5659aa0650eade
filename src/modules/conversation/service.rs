/// Conversation Service
///
/// Orchestrates the post-centric messaging flows:
/// - Lazy creation: a conversation row only exists once its first message does
/// - Text and image messages, with optional client idempotency keys
/// - Soft delete, so the same (post, pair) can start over later
/// - Listings with derived unread counts
use futures_util::future::try_join_all;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::{self, ACTIVE_CONVERSATION_CONSTRAINT, CLIENT_MESSAGE_CONSTRAINT};
use crate::modules::conversation::model::{
    ConversationDetail, ConversationPage, ConversationSummary, ConversationSummaryRow,
    LastMessage, MessageStats, NewConversation, PostContext, StartedConversation,
};
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::conversation::resolver::ConversationResolver;
use crate::modules::conversation::schema::ConversationEntity;
use crate::modules::file_upload::{BlobStore, ImageUploadService};
use crate::modules::message::model::{
    MessageDraft, MessagePage, MessageResponse, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::modules::message::repository::MessageRepository;
use crate::modules::message::schema::MessageEntity;
use crate::modules::post::{repository::PostRepository, schema::PostSnapshot};
use crate::modules::user::{repository::UserRepository, schema::UserProfile};

pub const MAX_CONTENT_LENGTH: usize = 2000;
pub const IMAGE_PLACEHOLDER: &str = "📷 Image";
pub const DEFAULT_CONVERSATION_PAGE_SIZE: u32 = 20;

/// Where an image message goes: an existing conversation, or the (post, other user)
/// pair whose conversation may not exist yet.
#[derive(Debug, Clone, Copy)]
pub enum ImageTarget {
    Conversation(Uuid),
    Post { other_user_id: Uuid, post_id: Option<Uuid> },
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub caption: Option<String>,
    pub client_message_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ConversationService<C, M, P, U, B>
where
    C: ConversationRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
    P: PostRepository + Send + Sync,
    U: UserRepository + Send + Sync,
    B: BlobStore + Send + Sync,
{
    conversation_repo: Arc<C>,
    message_repo: Arc<M>,
    post_repo: Arc<P>,
    user_repo: Arc<U>,
    uploader: ImageUploadService<B>,
    resolver: ConversationResolver<C>,
}

impl<C, M, P, U, B> ConversationService<C, M, P, U, B>
where
    C: ConversationRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
    P: PostRepository + Send + Sync,
    U: UserRepository + Send + Sync,
    B: BlobStore + Send + Sync,
{
    pub fn with_dependencies(
        conversation_repo: Arc<C>,
        message_repo: Arc<M>,
        post_repo: Arc<P>,
        user_repo: Arc<U>,
        uploader: ImageUploadService<B>,
    ) -> Self {
        log::info!("ConversationService initialized with dependencies");
        ConversationService {
            resolver: ConversationResolver::new(conversation_repo.clone()),
            conversation_repo,
            message_repo,
            post_repo,
            user_repo,
            uploader,
        }
    }

    /// Largest image the uploader accepts; lets the HTTP layer stop reading early.
    pub fn max_image_size(&self) -> usize {
        self.uploader.max_file_size()
    }

    /// Active conversation between the caller and `other_user_id` about `post_id`, if any.
    pub async fn find_active_conversation(
        &self,
        current_user_id: Uuid,
        other_user_id: Uuid,
        post_id: Option<Uuid>,
    ) -> Result<Option<ConversationDetail>, error::SystemError> {
        match self
            .resolver
            .find_active_conversation(current_user_id, other_user_id, post_id)
            .await?
        {
            Some(conversation) => Ok(Some(self.detail(&conversation, &current_user_id).await?)),
            None => Ok(None),
        }
    }

    /// Send the first message about a post.
    ///
    /// Flow:
    /// 1. Validate post, other user and content
    /// 2. Reuse the active conversation if one exists
    /// 3. Otherwise create conversation + first message in one transaction
    /// 4. On a lost creation race, append to the winner's conversation instead
    pub async fn start_conversation(
        &self,
        current_user_id: Uuid,
        other_user_id: Uuid,
        post_id: Option<Uuid>,
        initial_message: String,
        client_message_id: Option<Uuid>,
    ) -> Result<StartedConversation, error::SystemError> {
        let post_id =
            post_id.ok_or_else(|| error::SystemError::bad_request("postId is required"))?;
        let content = normalize_content(&initial_message)?
            .ok_or_else(|| error::SystemError::bad_request("Message content is required"))?;

        let post = self.prepare_open(current_user_id, other_user_id, post_id).await?;

        let draft = MessageDraft::text(current_user_id, content, client_message_id);
        let (conversation, message) =
            self.open_and_append(current_user_id, other_user_id, &post, &draft).await?;

        Ok(StartedConversation {
            conversation: self.detail(&conversation, &current_user_id).await?,
            message: MessageResponse::from(message),
        })
    }

    /// Flow:
    /// 1. Conversation must be active and the sender one of its participants
    /// 2. Return the stored message when the client id was already used
    /// 3. Insert and bump `last_message_at`
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        client_message_id: Option<Uuid>,
    ) -> Result<MessageResponse, error::SystemError> {
        let conversation = self.participant_conversation(&conversation_id, &sender_id).await?;

        let content = normalize_content(&content)?
            .ok_or_else(|| error::SystemError::bad_request("Message content is required"))?;

        let message = self
            .append_to(&conversation, &MessageDraft::text(sender_id, content, client_message_id))
            .await?;

        Ok(MessageResponse::from(message))
    }

    /// Flow:
    /// 1. Validate the image and every precondition that does not need the blob
    /// 2. Short-circuit a retried upload by its client id before touching the blob store
    /// 3. Upload outside any transaction
    /// 4. Insert the metadata, lazily creating the conversation for `ImageTarget::Post`
    pub async fn send_image_message(
        &self,
        target: ImageTarget,
        sender_id: Uuid,
        upload: ImageUpload,
    ) -> Result<MessageResponse, error::SystemError> {
        self.uploader.validate(upload.bytes.len(), &upload.mime_type)?;
        let caption =
            normalize_content(upload.caption.as_deref().unwrap_or_default())?
                .unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string());

        let message = match target {
            ImageTarget::Conversation(conversation_id) => {
                let conversation =
                    self.participant_conversation(&conversation_id, &sender_id).await?;

                if let Some(existing) = self
                    .find_client_message(&conversation, &sender_id, upload.client_message_id)
                    .await?
                {
                    return Ok(MessageResponse::from(existing));
                }

                let blob = self.uploader.upload(upload.bytes, &upload.mime_type).await?;
                let draft =
                    MessageDraft::image(sender_id, caption, &blob, upload.client_message_id);
                self.append_to(&conversation, &draft).await?
            }
            ImageTarget::Post { other_user_id, post_id } => {
                let post_id =
                    post_id.ok_or_else(|| error::SystemError::bad_request("postId is required"))?;
                let post = self.prepare_open(sender_id, other_user_id, post_id).await?;

                if let Some(conversation) = self
                    .resolver
                    .find_active_conversation(sender_id, other_user_id, Some(post_id))
                    .await?
                {
                    if let Some(existing) = self
                        .find_client_message(&conversation, &sender_id, upload.client_message_id)
                        .await?
                    {
                        return Ok(MessageResponse::from(existing));
                    }
                }

                let blob = self.uploader.upload(upload.bytes, &upload.mime_type).await?;
                let draft =
                    MessageDraft::image(sender_id, caption, &blob, upload.client_message_id);
                let (_, message) =
                    self.open_and_append(sender_id, other_user_id, &post, &draft).await?;
                message
            }
        };

        Ok(MessageResponse::from(message))
    }

    /// Soft delete. Messages stay in storage but are no longer reachable through listings.
    pub async fn delete_conversation(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> Result<(), error::SystemError> {
        self.participant_conversation(&conversation_id, &requester_id).await?;

        if !self.conversation_repo.deactivate(&conversation_id).await? {
            return Err(error::SystemError::not_found("Conversation not found"));
        }

        log::info!("Conversation {} deleted by {}", conversation_id, requester_id);
        Ok(())
    }

    pub async fn get_conversation(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        let conversation = self.participant_conversation(&conversation_id, &requester_id).await?;
        self.detail(&conversation, &requester_id).await
    }

    /// Active conversations, most recent activity first.
    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ConversationPage, error::SystemError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_CONVERSATION_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page as i64 - 1) * limit as i64;

        let (rows, total) = tokio::try_join!(
            self.conversation_repo.find_summaries_by_user(&user_id, offset, limit as i64),
            self.conversation_repo.count_active_by_user(&user_id),
        )?;

        let conversations =
            try_join_all(rows.into_iter().map(|row| self.summary(row, user_id))).await?;

        Ok(ConversationPage { conversations, pagination: Pagination::new(page, limit, total) })
    }

    /// Page 1 is the oldest page; messages ascend by `(created_at, id)` within and across pages.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<MessagePage, error::SystemError> {
        self.participant_conversation(&conversation_id, &requester_id).await?;

        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page as i64 - 1) * limit as i64;

        let (messages, total) = tokio::try_join!(
            self.message_repo.find_page(&conversation_id, offset, limit as i64),
            self.message_repo.count(&conversation_id),
        )?;

        Ok(MessagePage {
            messages: messages.into_iter().map(MessageResponse::from).collect(),
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Marks the other participant's messages read; returns how many changed.
    pub async fn mark_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, error::SystemError> {
        self.participant_conversation(&conversation_id, &reader_id).await?;

        self.message_repo.mark_read(&conversation_id, &reader_id).await
    }

    /// Totals over the caller's active conversations only.
    pub async fn message_stats(&self, user_id: Uuid) -> Result<MessageStats, error::SystemError> {
        let (total_conversations, total_messages_sent, total_unread) = tokio::try_join!(
            self.conversation_repo.count_active_by_user(&user_id),
            self.message_repo.count_sent_by(&user_id),
            self.message_repo.count_unread_for(&user_id),
        )?;

        Ok(MessageStats { total_conversations, total_messages_sent, total_unread })
    }

    /// Preconditions for opening a conversation, checked before any write or upload.
    async fn prepare_open(
        &self,
        sender_id: Uuid,
        other_user_id: Uuid,
        post_id: Uuid,
    ) -> Result<PostSnapshot, error::SystemError> {
        if sender_id == other_user_id {
            return Err(error::SystemError::bad_request(
                "Cannot start conversation with yourself",
            ));
        }

        let (post, other_user) = tokio::try_join!(
            self.post_repo.find_post(&post_id),
            self.user_repo.find_profile(&other_user_id),
        )?;

        if other_user.is_none() {
            return Err(error::SystemError::not_found("User not found"));
        }

        post.ok_or_else(|| error::SystemError::not_found("Post not found"))
    }

    /// Append to the active conversation for (post, pair), creating it if needed.
    ///
    /// The partial unique index is the only serialization point: losing the creation
    /// race is expected and resolved by appending to the winner, at most once.
    async fn open_and_append(
        &self,
        sender_id: Uuid,
        other_user_id: Uuid,
        post: &PostSnapshot,
        draft: &MessageDraft,
    ) -> Result<(ConversationEntity, MessageEntity), error::SystemError> {
        if let Some(existing) = self
            .resolver
            .find_active_conversation(sender_id, other_user_id, Some(post.id))
            .await?
        {
            return self.append_and_touch(existing, draft).await;
        }

        let new_conversation = NewConversation::new(post, sender_id, other_user_id);
        let first_message = draft.for_conversation(new_conversation.id);

        match self.conversation_repo.create_with_message(&new_conversation, &first_message).await {
            Ok(created) => {
                log::info!(
                    "Conversation {} created on post {} by {}",
                    created.0.id,
                    post.id,
                    sender_id
                );
                Ok(created)
            }
            Err(err) if err.is_conflict_on(ACTIVE_CONVERSATION_CONSTRAINT) => {
                log::warn!(
                    "Recovered concurrent conversation create on post {} between {} and {}",
                    post.id,
                    sender_id,
                    other_user_id
                );
                let existing = self
                    .resolver
                    .find_active_conversation(sender_id, other_user_id, Some(post.id))
                    .await?
                    .ok_or(err)?;
                self.append_and_touch(existing, draft).await
            }
            Err(err) => Err(err),
        }
    }

    /// Append to a conversation read before the insert, carrying the new
    /// `last_message_at` so callers never see a timestamp older than the message.
    async fn append_and_touch(
        &self,
        mut conversation: ConversationEntity,
        draft: &MessageDraft,
    ) -> Result<(ConversationEntity, MessageEntity), error::SystemError> {
        let message = self.append_to(&conversation, draft).await?;
        conversation.last_message_at = conversation.last_message_at.max(message.created_at);
        Ok((conversation, message))
    }

    async fn append_to(
        &self,
        conversation: &ConversationEntity,
        draft: &MessageDraft,
    ) -> Result<MessageEntity, error::SystemError> {
        if let Some(existing) =
            self.find_client_message(conversation, &draft.sender_id, draft.client_message_id).await?
        {
            return Ok(existing);
        }

        match self.message_repo.append(&draft.for_conversation(conversation.id)).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(error::SystemError::not_found("Conversation not found")),
            // a concurrent retry with the same client id got there first
            Err(err)
                if draft.client_message_id.is_some()
                    && err.is_conflict_on(CLIENT_MESSAGE_CONSTRAINT) =>
            {
                self.find_client_message(conversation, &draft.sender_id, draft.client_message_id)
                    .await?
                    .ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn find_client_message(
        &self,
        conversation: &ConversationEntity,
        sender_id: &Uuid,
        client_message_id: Option<Uuid>,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        match client_message_id {
            Some(client_id) => {
                self.message_repo.find_by_client_id(&conversation.id, sender_id, &client_id).await
            }
            None => Ok(None),
        }
    }

    /// Active conversation that `user_id` takes part in.
    async fn participant_conversation(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<ConversationEntity, error::SystemError> {
        let conversation = self
            .conversation_repo
            .find_by_id(conversation_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        if !conversation.has_participant(user_id) {
            return Err(error::SystemError::forbidden("Access denied to this conversation"));
        }

        Ok(conversation)
    }

    async fn other_user(
        &self,
        conversation: &ConversationEntity,
        viewer_id: &Uuid,
    ) -> Result<UserProfile, error::SystemError> {
        let other_id = conversation
            .other_participant(viewer_id)
            .ok_or_else(|| error::SystemError::forbidden("Access denied to this conversation"))?;

        Ok(self
            .user_repo
            .find_profile(&other_id)
            .await?
            .unwrap_or_else(|| UserProfile::unavailable(other_id)))
    }

    async fn detail(
        &self,
        conversation: &ConversationEntity,
        viewer_id: &Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        Ok(ConversationDetail {
            id: conversation.id,
            post: PostContext::from(conversation),
            other_user: self.other_user(conversation, viewer_id).await?,
            is_active: conversation.is_active,
            created_at: conversation.created_at,
            last_message_at: conversation.last_message_at,
        })
    }

    async fn summary(
        &self,
        row: ConversationSummaryRow,
        viewer_id: Uuid,
    ) -> Result<ConversationSummary, error::SystemError> {
        let other_user = self.other_user(&row.conversation, &viewer_id).await?;

        let last_message = match (
            row.last_content,
            row.last_message_type,
            row.last_sender_id,
            row.last_created_at,
        ) {
            (Some(content), Some(message_type), Some(sender_id), Some(created_at)) => {
                Some(LastMessage { content, message_type, sender_id, created_at })
            }
            _ => None,
        };

        Ok(ConversationSummary {
            id: row.conversation.id,
            post: PostContext::from(&row.conversation),
            other_user,
            last_message,
            unread_count: row.unread_count,
            last_message_at: row.conversation.last_message_at,
            created_at: row.conversation.created_at,
        })
    }
}

/// Trimmed content; `None` when blank.
fn normalize_content(content: &str) -> Result<Option<String>, error::SystemError> {
    let trimmed = content.trim();
    if trimmed.chars().count() > MAX_CONTENT_LENGTH {
        return Err(error::SystemError::bad_request(format!(
            "Message content must be at most {} characters",
            MAX_CONTENT_LENGTH
        )));
    }
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
