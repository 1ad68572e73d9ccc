//! Session store trait — per-conversation state with single-writer turns.
//!
//! A turn takes a [`SessionLease`] with [`SessionStore::lock`], works on a
//! snapshot, and hands the finished conversation back through
//! [`SessionStore::commit`]. Dropping a lease without committing leaves the
//! stored conversation exactly as it was before the turn.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use crate::conversation::{Conversation, ConversationId};
use crate::error::SessionError;

/// Exclusive access to one conversation for the duration of a turn.
pub struct SessionLease {
    guard: OwnedMutexGuard<Conversation>,
}

impl SessionLease {
    pub fn new(guard: OwnedMutexGuard<Conversation>) -> Self {
        Self { guard }
    }

    pub fn id(&self) -> &ConversationId {
        &self.guard.id
    }

    /// A working copy of the committed state.
    pub fn snapshot(&self) -> Conversation {
        self.guard.clone()
    }

    /// Read-only view of the committed state.
    pub fn current(&self) -> &Conversation {
        &self.guard
    }

    /// Replace the committed state. Store implementations call this from
    /// `commit` after any durable write has succeeded.
    pub fn replace(&mut self, conversation: Conversation) {
        *self.guard = conversation;
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.guard.id)
            .finish()
    }
}

/// Conversation storage with per-id turn serialization.
///
/// Implementations guarantee at most one live lease per conversation id.
/// Different ids never block each other.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare backing storage.
    async fn init(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Flush and release backing storage.
    async fn teardown(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Store a new conversation and return its id.
    async fn create(&self, conversation: Conversation) -> Result<ConversationId, SessionError>;

    /// Snapshot of the last committed state. Waits for an in-flight turn.
    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, SessionError>;

    /// Wait for the conversation's turn lock. `None` if the id is unknown
    /// or the conversation was removed while waiting.
    async fn lock(&self, id: &ConversationId) -> Result<Option<SessionLease>, SessionError>;

    /// Atomically publish the result of a turn and release the lock.
    async fn commit(
        &self,
        lease: SessionLease,
        conversation: Conversation,
    ) -> Result<(), SessionError>;

    /// Remove a whole conversation, waiting for any in-flight turn.
    async fn delete(&self, id: &ConversationId) -> Result<bool, SessionError>;

    /// Remove conversations idle for longer than `max_age`. Conversations with
    /// a turn in flight are skipped. Returns the number removed.
    async fn evict_idle(&self, max_age: Duration) -> Result<usize, SessionError>;

    async fn len(&self) -> Result<usize, SessionError>;
}

/// Run a synchronous mutation under the conversation's turn lock and commit it.
///
/// Returns `Ok(None)` when the conversation does not exist.
pub async fn with_lock<T, F>(
    store: &dyn SessionStore,
    id: &ConversationId,
    f: F,
) -> Result<Option<T>, SessionError>
where
    F: FnOnce(&mut Conversation) -> T + Send,
{
    let Some(lease) = store.lock(id).await? else {
        return Ok(None);
    };
    let mut working = lease.snapshot();
    let out = f(&mut working);
    store.commit(lease, working).await?;
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn lease_replace_publishes_state() {
        let conv = Conversation::new("Triage");
        let cell = Arc::new(Mutex::new(conv.clone()));
        {
            let mut lease = SessionLease::new(cell.clone().lock_owned().await);
            let mut working = lease.snapshot();
            working.set_current_agent("Boxing");
            lease.replace(working);
        }
        assert_eq!(cell.lock().await.current_agent(), "Boxing");
    }

    #[tokio::test]
    async fn dropped_lease_keeps_previous_state() {
        let conv = Conversation::new("Triage");
        let cell = Arc::new(Mutex::new(conv));
        {
            let lease = SessionLease::new(cell.clone().lock_owned().await);
            let mut working = lease.snapshot();
            working.set_current_agent("Boxing");
        }
        assert_eq!(cell.lock().await.current_agent(), "Triage");
    }
}
