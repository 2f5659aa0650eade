//! In-memory stand-ins for Postgres, the account/post tables and the blob store.
//!
//! `MemoryStore` enforces the same partial unique indexes as the migrations so the
//! orchestrator's conflict handling is exercised without a database.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::api::error::{
    self, DbErrorMeta, ACTIVE_CONVERSATION_CONSTRAINT, CLIENT_MESSAGE_CONSTRAINT,
};
use crate::modules::conversation::handle::Backend;
use crate::modules::conversation::model::{ConversationSummaryRow, NewConversation};
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::conversation::schema::ConversationEntity;
use crate::modules::conversation::service::ConversationService;
use crate::modules::file_upload::{BlobStore, ImageUploadService, StoredBlob, UploadConfig};
use crate::modules::message::model::InsertMessage;
use crate::modules::message::repository::MessageRepository;
use crate::modules::message::schema::MessageEntity;
use crate::modules::post::{repository::PostRepository, schema::PostSnapshot};
use crate::modules::user::{repository::UserRepository, schema::UserProfile};

pub mod fixtures {
    use super::*;

    pub fn post(title: &str, author_id: Uuid) -> PostSnapshot {
        PostSnapshot {
            id: Uuid::now_v7(),
            title: title.to_string(),
            post_type: "goods".to_string(),
            author_id,
        }
    }

    pub fn user(name: &str) -> UserProfile {
        UserProfile {
            id: Uuid::now_v7(),
            display_name: name.to_string(),
            username: name.to_lowercase(),
            profile_picture: None,
        }
    }
}

fn unique_violation(constraint: &str) -> error::SystemError {
    error::SystemError::Conflict(Some(DbErrorMeta {
        code: Some("23505".to_string()),
        constraint: Some(constraint.to_string()),
        message: format!("duplicate key value violates unique constraint \"{}\"", constraint),
    }))
}

#[derive(Default)]
struct State {
    conversations: Vec<ConversationEntity>,
    messages: Vec<MessageEntity>,
    posts: Vec<PostSnapshot>,
    users: Vec<UserProfile>,
    ticks: i64,
}

impl State {
    /// Strictly increasing timestamps, like `clock_timestamp()` across commits.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        DateTime::<Utc>::default() + Duration::days(20_000) + Duration::milliseconds(self.ticks)
    }

    fn insert_message(
        &mut self,
        message: &InsertMessage,
    ) -> Result<MessageEntity, error::SystemError> {
        if let Some(client_id) = message.client_message_id {
            let taken = self.messages.iter().any(|m| {
                m.conversation_id == message.conversation_id
                    && m.sender_id == message.sender_id
                    && m.client_message_id == Some(client_id)
            });
            if taken {
                return Err(unique_violation(CLIENT_MESSAGE_CONSTRAINT));
            }
        }

        let entity = MessageEntity {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            message_type: message.message_type,
            media_url: message.media_url.clone(),
            thumbnail_url: message.thumbnail_url.clone(),
            client_message_id: message.client_message_id,
            is_read: false,
            is_deleted: false,
            created_at: self.now(),
            updated_at: None,
        };
        self.messages.push(entity.clone());
        Ok(entity)
    }

    fn touch(&mut self, conversation_id: &Uuid, at: DateTime<Utc>) {
        if let Some(c) = self.conversations.iter_mut().find(|c| c.id == *conversation_id) {
            c.last_message_at = at;
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn add_post(&self, post: PostSnapshot) {
        self.state.lock().unwrap().posts.push(post);
    }

    pub fn add_user(&self, user: UserProfile) {
        self.state.lock().unwrap().users.push(user);
    }

    /// Insert an active conversation directly, bypassing the orchestrator.
    pub fn seed_conversation(
        &self,
        post: &PostSnapshot,
        user_a: Uuid,
        user_b: Uuid,
    ) -> ConversationEntity {
        let new = NewConversation::new(post, user_a, user_b);
        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let entity = ConversationEntity {
            id: new.id,
            post_id: new.post_id,
            user1_id: new.user1_id,
            user2_id: new.user2_id,
            post_title: new.post_title,
            post_type: new.post_type,
            post_author_id: new.post_author_id,
            is_active: true,
            created_at: now,
            last_message_at: now,
        };
        state.conversations.push(entity.clone());
        entity
    }

    pub fn set_active(&self, conversation_id: &Uuid, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.conversations.iter_mut().find(|c| c.id == *conversation_id) {
            c.is_active = active;
        }
    }

    pub fn conversations(&self) -> Vec<ConversationEntity> {
        self.state.lock().unwrap().conversations.clone()
    }

    /// Every stored message of a conversation, including ones hidden from listings.
    pub fn messages_of(&self, conversation_id: &Uuid) -> Vec<MessageEntity> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect()
    }

    pub fn unread_for(&self, conversation_id: &Uuid, reader_id: &Uuid) -> i64 {
        self.messages_of(conversation_id)
            .iter()
            .filter(|m| m.sender_id != *reader_id && !m.is_read && !m.is_deleted)
            .count() as i64
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryStore {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.conversations.iter().find(|c| c.id == *conversation_id).cloned())
    }

    async fn find_active_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<ConversationEntity> = state
            .conversations
            .iter()
            .filter(|c| c.is_active && c.has_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(found)
    }

    async fn create_with_message(
        &self,
        conversation: &NewConversation,
        first_message: &InsertMessage,
    ) -> Result<(ConversationEntity, MessageEntity), error::SystemError> {
        // widen the window between the caller's lookup and this insert
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();

        let duplicate = state.conversations.iter().any(|c| {
            c.is_active
                && c.post_id == conversation.post_id
                && c.user1_id == conversation.user1_id
                && c.user2_id == conversation.user2_id
        });
        if duplicate {
            return Err(unique_violation(ACTIVE_CONVERSATION_CONSTRAINT));
        }

        let now = state.now();
        state.conversations.push(ConversationEntity {
            id: conversation.id,
            post_id: conversation.post_id,
            user1_id: conversation.user1_id,
            user2_id: conversation.user2_id,
            post_title: conversation.post_title.clone(),
            post_type: conversation.post_type.clone(),
            post_author_id: conversation.post_author_id,
            is_active: true,
            created_at: now,
            last_message_at: now,
        });

        let message = match state.insert_message(first_message) {
            Ok(message) => message,
            Err(err) => {
                state.conversations.retain(|c| c.id != conversation.id);
                return Err(err);
            }
        };
        state.touch(&conversation.id, message.created_at);

        let created = state
            .conversations
            .iter()
            .find(|c| c.id == conversation.id)
            .cloned()
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        Ok((created, message))
    }

    async fn deactivate(&self, conversation_id: &Uuid) -> Result<bool, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        match state.conversations.iter_mut().find(|c| c.id == *conversation_id && c.is_active) {
            Some(c) => {
                c.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_summaries_by_user(
        &self,
        user_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummaryRow>, error::SystemError> {
        let conversations = self.find_active_by_user(user_id).await?;
        let state = self.state.lock().unwrap();

        let rows = conversations
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|conversation| {
                let visible: Vec<&MessageEntity> = state
                    .messages
                    .iter()
                    .filter(|m| m.conversation_id == conversation.id && !m.is_deleted)
                    .collect();
                let last = visible.iter().max_by_key(|m| (m.created_at, m.id));
                let unread_count = visible
                    .iter()
                    .filter(|m| m.sender_id != *user_id && !m.is_read)
                    .count() as i64;

                ConversationSummaryRow {
                    last_content: last.map(|m| m.content.clone()),
                    last_message_type: last.map(|m| m.message_type),
                    last_sender_id: last.map(|m| m.sender_id),
                    last_created_at: last.map(|m| m.created_at),
                    unread_count,
                    conversation,
                }
            })
            .collect();

        Ok(rows)
    }

    async fn count_active_by_user(&self, user_id: &Uuid) -> Result<i64, error::SystemError> {
        Ok(self.find_active_by_user(user_id).await?.len() as i64)
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryStore {
    async fn append(
        &self,
        message: &InsertMessage,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let mut state = self.state.lock().unwrap();

        let active = state
            .conversations
            .iter()
            .any(|c| c.id == message.conversation_id && c.is_active);
        if !active {
            return Ok(None);
        }

        let created = state.insert_message(message)?;
        state.touch(&message.conversation_id, created.created_at);
        Ok(Some(created))
    }

    async fn find_by_client_id(
        &self,
        conversation_id: &Uuid,
        sender_id: &Uuid,
        client_message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .find(|m| {
                m.conversation_id == *conversation_id
                    && m.sender_id == *sender_id
                    && m.client_message_id == Some(*client_message_id)
            })
            .cloned())
    }

    async fn find_page(
        &self,
        conversation_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let mut messages: Vec<MessageEntity> = self
            .messages_of(conversation_id)
            .into_iter()
            .filter(|m| !m.is_deleted)
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));

        Ok(messages.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn count(&self, conversation_id: &Uuid) -> Result<i64, error::SystemError> {
        Ok(self.messages_of(conversation_id).iter().filter(|m| !m.is_deleted).count() as i64)
    }

    async fn mark_read(
        &self,
        conversation_id: &Uuid,
        reader_id: &Uuid,
    ) -> Result<u64, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for m in state.messages.iter_mut().filter(|m| {
            m.conversation_id == *conversation_id && m.sender_id != *reader_id && !m.is_read
        }) {
            m.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn count_sent_by(&self, sender_id: &Uuid) -> Result<i64, error::SystemError> {
        let state = self.state.lock().unwrap();
        let sent = state
            .messages
            .iter()
            .filter(|m| m.sender_id == *sender_id && !m.is_deleted)
            .filter(|m| {
                state.conversations.iter().any(|c| c.id == m.conversation_id && c.is_active)
            })
            .count();
        Ok(sent as i64)
    }

    async fn count_unread_for(&self, reader_id: &Uuid) -> Result<i64, error::SystemError> {
        let state = self.state.lock().unwrap();
        let unread = state
            .messages
            .iter()
            .filter(|m| m.sender_id != *reader_id && !m.is_read && !m.is_deleted)
            .filter(|m| {
                state.conversations.iter().any(|c| {
                    c.id == m.conversation_id && c.is_active && c.has_participant(reader_id)
                })
            })
            .count();
        Ok(unread as i64)
    }
}

#[async_trait::async_trait]
impl PostRepository for MemoryStore {
    async fn find_post(&self, id: &Uuid) -> Result<Option<PostSnapshot>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.posts.iter().find(|p| p.id == *id).cloned())
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryStore {
    async fn find_profile(&self, id: &Uuid) -> Result<Option<UserProfile>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == *id).cloned())
    }
}

/// Conversation store whose active-conversation lookups miss the first `misses` times,
/// reproducing a lookup that ran before a concurrent create committed.
pub struct StaleLookup {
    inner: MemoryStore,
    misses: AtomicUsize,
}

impl StaleLookup {
    pub fn new(inner: MemoryStore, misses: usize) -> Self {
        Self { inner, misses: AtomicUsize::new(misses) }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for StaleLookup {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        self.inner.find_by_id(conversation_id).await
    }

    async fn find_active_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationEntity>, error::SystemError> {
        let missed = self
            .misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(Vec::new());
        }
        self.inner.find_active_by_user(user_id).await
    }

    async fn create_with_message(
        &self,
        conversation: &NewConversation,
        first_message: &InsertMessage,
    ) -> Result<(ConversationEntity, MessageEntity), error::SystemError> {
        self.inner.create_with_message(conversation, first_message).await
    }

    async fn deactivate(&self, conversation_id: &Uuid) -> Result<bool, error::SystemError> {
        self.inner.deactivate(conversation_id).await
    }

    async fn find_summaries_by_user(
        &self,
        user_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummaryRow>, error::SystemError> {
        self.inner.find_summaries_by_user(user_id, offset, limit).await
    }

    async fn count_active_by_user(&self, user_id: &Uuid) -> Result<i64, error::SystemError> {
        self.inner.count_active_by_user(user_id).await
    }
}

/// Records uploads and hands back predictable URLs.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    uploads: Arc<Mutex<Vec<(usize, String)>>>,
}

impl MemoryBlobStore {
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Size and mime type of the most recent upload.
    pub fn last_upload(&self) -> Option<(usize, String)> {
        self.uploads.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<StoredBlob, error::SystemError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((bytes.len(), mime_type.to_string()));
        let n = uploads.len();
        Ok(StoredBlob {
            url: format!("https://blobs.test/{}.img", n),
            thumbnail_url: format!("https://blobs.test/{}_thumb.img", n),
        })
    }
}

#[derive(Clone, Default)]
pub struct FailingBlobStore;

#[async_trait::async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        _mime_type: &str,
    ) -> Result<StoredBlob, error::SystemError> {
        Err(error::SystemError::InternalError("blob store unreachable".into()))
    }
}

pub type MemoryService<C = MemoryStore, B = MemoryBlobStore> =
    ConversationService<C, MemoryStore, MemoryStore, MemoryStore, B>;

pub fn service_with<C, B>(
    conversations: Arc<C>,
    store: &MemoryStore,
    blobs: B,
) -> MemoryService<C, B>
where
    C: ConversationRepository + Send + Sync,
    B: BlobStore + Send + Sync,
{
    service_with_limit(conversations, store, blobs, 1024 * 1024)
}

pub fn service_with_limit<C, B>(
    conversations: Arc<C>,
    store: &MemoryStore,
    blobs: B,
    max_image_size: usize,
) -> MemoryService<C, B>
where
    C: ConversationRepository + Send + Sync,
    B: BlobStore + Send + Sync,
{
    let store = Arc::new(store.clone());
    ConversationService::with_dependencies(
        conversations,
        store.clone(),
        store.clone(),
        store,
        ImageUploadService::new(Arc::new(blobs), UploadConfig::with_max_file_size(max_image_size)),
    )
}

pub fn service(store: &MemoryStore) -> MemoryService {
    service_with(Arc::new(store.clone()), store, MemoryBlobStore::default())
}

/// Handler wiring over the in-memory stores.
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    type Conversations = MemoryStore;
    type Messages = MemoryStore;
    type Posts = MemoryStore;
    type Users = MemoryStore;
    type Blobs = MemoryBlobStore;
}
