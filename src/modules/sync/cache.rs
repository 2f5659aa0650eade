use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::modules::message::model::MessageResponse;

#[derive(Debug, Default)]
struct ConversationLog {
    confirmed: Vec<MessageResponse>,
    seen: HashSet<Uuid>,
    /// Optimistic messages not yet echoed by the server, keyed by client message id.
    pending: Vec<(Uuid, MessageResponse)>,
}

/// Client-side view of conversations, rebuilt purely from server responses.
///
/// Confirmed messages stay sorted by `(created_at, id)` and unique by id, so
/// at-least-once delivery from polling is harmless.
#[derive(Debug, Default)]
pub struct MessageCache {
    conversations: HashMap<Uuid, ConversationLog>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a message before the server confirms it. Ignored without a client id,
    /// since nothing could reconcile it later.
    pub fn add_pending(&mut self, message: MessageResponse) -> bool {
        let Some(client_id) = message.client_message_id else {
            return false;
        };

        let log = self.conversations.entry(message.conversation_id).or_default();
        log.pending.retain(|(id, _)| *id != client_id);
        log.pending.push((client_id, message));
        true
    }

    /// Drop an optimistic message whose send failed.
    pub fn discard_pending(&mut self, conversation_id: &Uuid, client_message_id: &Uuid) {
        if let Some(log) = self.conversations.get_mut(conversation_id) {
            log.pending.retain(|(id, _)| id != client_message_id);
        }
    }

    /// Merge server messages; returns the ones not seen before, in order.
    pub fn merge(
        &mut self,
        conversation_id: Uuid,
        incoming: impl IntoIterator<Item = MessageResponse>,
    ) -> Vec<MessageResponse> {
        let log = self.conversations.entry(conversation_id).or_default();

        let mut fresh: Vec<MessageResponse> = incoming
            .into_iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| log.seen.insert(m.id))
            .collect();
        fresh.sort_by_key(|m| (m.created_at, m.id));

        for message in &fresh {
            if let Some(client_id) = message.client_message_id {
                log.pending.retain(|(id, _)| *id != client_id);
            }
        }

        let in_order = match (log.confirmed.last(), fresh.first()) {
            (Some(last), Some(first)) => (last.created_at, last.id) < (first.created_at, first.id),
            _ => true,
        };

        log.confirmed.extend(fresh.iter().cloned());
        if !in_order {
            log.confirmed.sort_by_key(|m| (m.created_at, m.id));
        }

        fresh
    }

    pub fn confirmed_len(&self, conversation_id: &Uuid) -> usize {
        self.conversations.get(conversation_id).map_or(0, |log| log.confirmed.len())
    }

    /// Confirmed messages followed by pending ones.
    pub fn messages(&self, conversation_id: &Uuid) -> Vec<&MessageResponse> {
        match self.conversations.get(conversation_id) {
            Some(log) => log.confirmed.iter().chain(log.pending.iter().map(|(_, m)| m)).collect(),
            None => Vec::new(),
        }
    }

    pub fn forget(&mut self, conversation_id: &Uuid) {
        self.conversations.remove(conversation_id);
    }
}
