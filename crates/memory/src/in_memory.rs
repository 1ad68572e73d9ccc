//! In-memory session store with one async mutex per conversation.
//!
//! The map lock is only ever held for lookups and inserts, never across an
//! await on a conversation lock, so turns on different conversations never
//! wait on each other.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use touchline_core::conversation::{Conversation, ConversationId};
use touchline_core::error::SessionError;
use touchline_core::session::{SessionLease, SessionStore};
use tracing::debug;

type Cell = Arc<Mutex<Conversation>>;

/// Conversations held in process memory. Lost on restart.
pub struct InMemorySessionStore {
    conversations: RwLock<HashMap<ConversationId, Cell>>,
}

/// Result of an eviction sweep.
#[derive(Debug, Default)]
pub(crate) struct Sweep {
    pub removed: Vec<ConversationId>,
    /// Skipped because a turn was in flight
    pub busy: Vec<ConversationId>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    async fn cell(&self, id: &ConversationId) -> Option<Cell> {
        self.conversations.read().await.get(id).cloned()
    }

    async fn is_current(&self, id: &ConversationId, cell: &Cell) -> bool {
        self.conversations
            .read()
            .await
            .get(id)
            .is_some_and(|c| Arc::ptr_eq(c, cell))
    }

    pub(crate) async fn contains(&self, id: &ConversationId) -> bool {
        self.conversations.read().await.contains_key(id)
    }

    /// Insert a conversation loaded from elsewhere unless one with the same id
    /// is already live.
    pub(crate) async fn adopt(&self, conversation: Conversation) {
        let mut map = self.conversations.write().await;
        map.entry(conversation.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(conversation)));
    }

    pub(crate) async fn sweep(&self, max_age: Duration) -> Result<Sweep, SessionError> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| SessionError::Storage(format!("Invalid retention window: {e}")))?;
        let now = Utc::now();
        let entries: Vec<(ConversationId, Cell)> = self
            .conversations
            .read()
            .await
            .iter()
            .map(|(id, cell)| (id.clone(), cell.clone()))
            .collect();

        let mut sweep = Sweep::default();
        for (id, cell) in entries {
            // A held lock means a turn is in flight
            let Ok(guard) = cell.clone().try_lock_owned() else {
                sweep.busy.push(id);
                continue;
            };
            if guard.idle_for(now) <= max_age {
                continue;
            }
            let mut map = self.conversations.write().await;
            if map.get(&id).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                map.remove(&id);
                sweep.removed.push(id);
            }
            drop(map);
            drop(guard);
        }
        Ok(sweep)
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, conversation: Conversation) -> Result<ConversationId, SessionError> {
        let id = conversation.id.clone();
        let mut map = self.conversations.write().await;
        if map.contains_key(&id) {
            return Err(SessionError::Storage(format!("Conversation {id} already exists")));
        }
        map.insert(id.clone(), Arc::new(Mutex::new(conversation)));
        debug!(conversation_id = %id, "Conversation created");
        Ok(id)
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, SessionError> {
        let Some(cell) = self.cell(id).await else {
            return Ok(None);
        };
        let conversation = cell.lock().await.clone();
        Ok(Some(conversation))
    }

    async fn lock(&self, id: &ConversationId) -> Result<Option<SessionLease>, SessionError> {
        let Some(cell) = self.cell(id).await else {
            return Ok(None);
        };
        let guard = cell.clone().lock_owned().await;
        // Deleted or evicted while we waited
        if !self.is_current(id, &cell).await {
            return Ok(None);
        }
        Ok(Some(SessionLease::new(guard)))
    }

    async fn commit(
        &self,
        mut lease: SessionLease,
        mut conversation: Conversation,
    ) -> Result<(), SessionError> {
        if lease.id() != &conversation.id {
            return Err(SessionError::Storage(format!(
                "Lease for {} cannot commit conversation {}",
                lease.id(),
                conversation.id
            )));
        }
        conversation.touch();
        lease.replace(conversation);
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, SessionError> {
        let Some(cell) = self.cell(id).await else {
            return Ok(false);
        };
        let _guard = cell.clone().lock_owned().await;
        let mut map = self.conversations.write().await;
        if map.get(id).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            map.remove(id);
            debug!(conversation_id = %id, "Conversation deleted");
            return Ok(true);
        }
        Ok(false)
    }

    async fn evict_idle(&self, max_age: Duration) -> Result<usize, SessionError> {
        let sweep = self.sweep(max_age).await?;
        if !sweep.busy.is_empty() {
            debug!(busy = sweep.busy.len(), "Skipped conversations with a turn in flight");
        }
        Ok(sweep.removed.len())
    }

    async fn len(&self) -> Result<usize, SessionError> {
        Ok(self.conversations.read().await.len())
    }
}
