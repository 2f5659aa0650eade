use std::{sync::Arc, time::Duration};

use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::api::error;
use crate::modules::{
    conversation::{repository::ConversationRepository, service::ConversationService},
    file_upload::BlobStore,
    message::{
        model::{MessagePage, MessageResponse},
        repository::MessageRepository,
    },
    post::repository::PostRepository,
    sync::cache::MessageCache,
    user::repository::UserRepository,
};

/// Anything that can serve oldest-first message pages for a viewer.
#[async_trait::async_trait]
pub trait MessageSource {
    async fn fetch_page(
        &self,
        viewer_id: Uuid,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, error::SystemError>;
}

#[async_trait::async_trait]
impl<C, M, P, U, B> MessageSource for ConversationService<C, M, P, U, B>
where
    C: ConversationRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
    P: PostRepository + Send + Sync,
    U: UserRepository + Send + Sync,
    B: BlobStore + Send + Sync,
{
    async fn fetch_page(
        &self,
        viewer_id: Uuid,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, error::SystemError> {
        self.list_messages(conversation_id, viewer_id, Some(page), Some(limit)).await
    }
}

pub struct MessagePoller<S>
where
    S: MessageSource + Send + Sync,
{
    source: Arc<S>,
    viewer_id: Uuid,
    page_size: u32,
    cache: Arc<Mutex<MessageCache>>,
}

impl<S> MessagePoller<S>
where
    S: MessageSource + Send + Sync,
{
    pub fn new(
        source: Arc<S>,
        viewer_id: Uuid,
        page_size: u32,
        cache: Arc<Mutex<MessageCache>>,
    ) -> Self {
        Self { source, viewer_id, page_size: page_size.max(1), cache }
    }

    /// Fetch everything past what the cache has confirmed and merge it in.
    ///
    /// Pages are oldest-first and append-only, so the first unseen message sits on
    /// page `confirmed / limit + 1`. Walks forward until a short page.
    pub async fn poll_once(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageResponse>, error::SystemError> {
        let confirmed = self.cache.lock().await.confirmed_len(&conversation_id) as u32;
        let mut page = confirmed / self.page_size + 1;
        let mut fetched = Vec::new();

        loop {
            let result = self
                .source
                .fetch_page(self.viewer_id, conversation_id, page, self.page_size)
                .await?;
            let received = result.messages.len();
            fetched.extend(result.messages);

            if received < self.page_size as usize {
                break;
            }
            page += 1;
        }

        let fresh = self.cache.lock().await.merge(conversation_id, fetched);
        tracing::debug!(
            conversation_id = %conversation_id,
            new_messages = fresh.len(),
            "poll complete"
        );

        Ok(fresh)
    }

    /// Poll on `every` until `shutdown` turns true or its sender is dropped.
    ///
    /// Stops on its own when the conversation disappears or access is revoked.
    pub async fn run(
        &self,
        conversation_id: Uuid,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(every);
        tracing::info!(conversation_id = %conversation_id, "message poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.poll_once(conversation_id).await {
                    Ok(fresh) if !fresh.is_empty() => {
                        tracing::info!(
                            conversation_id = %conversation_id,
                            count = fresh.len(),
                            "new messages"
                        );
                    }
                    Ok(_) => {}
                    Err(error::SystemError::NotFound(_) | error::SystemError::Forbidden(_)) => {
                        tracing::info!(
                            conversation_id = %conversation_id,
                            "conversation gone, stopping poller"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            error = %e,
                            "poll failed"
                        );
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(conversation_id = %conversation_id, "message poller stopped");
    }
}
