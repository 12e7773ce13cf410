use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{TimelineResult, UnknownMessageSnafu};
use crate::ids::MessageId;
use crate::message::StreamMessage;

/// Bounded log length; appends past this trim the oldest entries.
pub const DEFAULT_TIMELINE_CAPACITY: usize = 400;

/// Callback invoked with a consistent snapshot after every successful mutation.
pub type SnapshotListener = Arc<dyn Fn(&[StreamMessage]) + Send + Sync>;

struct StoreInner {
    messages: Vec<StreamMessage>,
    capacity: usize,
    listeners: Vec<(u64, SnapshotListener)>,
    next_listener_id: u64,
    last_stamp_unix_millis: u64,
}

/// Append-only message log and the single source of truth for job lifecycles.
///
/// All mutation funnels through `append`/`update`/`remove`, serialized by one
/// internal lock, so readers and listeners never observe a partially-updated
/// message. Listeners run after the lock is released to keep re-entrant reads
/// safe.
pub struct TimelineStore {
    inner: Mutex<StoreInner>,
}

impl TimelineStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                messages: Vec::new(),
                capacity: capacity.max(1),
                listeners: Vec::new(),
                next_listener_id: 0,
                last_stamp_unix_millis: 0,
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_TIMELINE_CAPACITY)
    }

    /// Appends to the tail, stamping a strictly increasing `created_at`.
    pub fn append(&self, mut message: StreamMessage) -> MessageId {
        let id = message.id;
        let (listeners, snapshot) = {
            let mut inner = self.lock_inner();

            let stamp = current_unix_timestamp_millis().max(inner.last_stamp_unix_millis + 1);
            inner.last_stamp_unix_millis = stamp;
            message.created_at_unix_millis = stamp;

            inner.messages.push(message);
            while inner.messages.len() > inner.capacity {
                let trimmed = inner.messages.remove(0);
                tracing::debug!(message_id = %trimmed.id, "trimmed oldest timeline entry");
            }

            inner.observers()
        };

        Self::notify(listeners, &snapshot);
        id
    }

    /// Applies a pure transformation to exactly one entry. The only mutation path
    /// for existing messages.
    pub fn update(
        &self,
        id: MessageId,
        patcher: impl FnOnce(&mut StreamMessage),
    ) -> TimelineResult<()> {
        let (listeners, snapshot) = {
            let mut inner = self.lock_inner();
            let Some(message) = inner.messages.iter_mut().find(|message| message.id == id) else {
                return UnknownMessageSnafu {
                    stage: "update-message",
                    id: id.to_string(),
                }
                .fail();
            };

            patcher(message);
            inner.observers()
        };

        Self::notify(listeners, &snapshot);
        Ok(())
    }

    /// Removes one entry from history. Returns false when the id is unknown.
    pub fn remove(&self, id: MessageId) -> bool {
        let (listeners, snapshot) = {
            let mut inner = self.lock_inner();
            let Some(index) = inner.messages.iter().position(|message| message.id == id) else {
                return false;
            };

            inner.messages.remove(index);
            inner.observers()
        };

        Self::notify(listeners, &snapshot);
        true
    }

    pub fn get(&self, id: MessageId) -> Option<StreamMessage> {
        self.lock_inner()
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
    }

    /// Immutable snapshot of the full log, in append order.
    pub fn snapshot(&self) -> Vec<StreamMessage> {
        self.lock_inner().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.lock_inner().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().messages.is_empty()
    }

    /// Registers a listener invoked after every successful mutation. Dropping the
    /// returned guard unsubscribes.
    pub fn subscribe(self: &Arc<Self>, listener: SnapshotListener) -> Subscription {
        let id = {
            let mut inner = self.lock_inner();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.push((id, listener));
            id
        };

        Subscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.lock_inner()
            .listeners
            .retain(|(listener_id, _)| *listener_id != id);
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // Patchers are pure field writes, so a poisoned lock still holds the
        // last consistent state.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(listeners: Vec<SnapshotListener>, snapshot: &[StreamMessage]) {
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl StoreInner {
    fn observers(&self) -> (Vec<SnapshotListener>, Vec<StreamMessage>) {
        let listeners = self
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        (listeners, self.messages.clone())
    }
}

/// Unsubscribes its listener on drop.
pub struct Subscription {
    store: Weak<TimelineStore>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

fn current_unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}
