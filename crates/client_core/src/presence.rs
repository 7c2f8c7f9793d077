//! Ephemeral "user is doing X" signals with automatic expiry.
//!
//! All tracked users share a single sweep task scheduled for the nearest
//! expiry. Expirations live in a min-heap keyed by deadline; entries whose
//! deadline no longer matches the live map (refreshed or cleared users) are
//! skipped lazily when popped.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    sync::{Arc, Weak},
};

use shared::domain::{ChatActionKind, ChatId, UserId};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingAction {
    pub action: ChatActionKind,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingEvent {
    Changed { chat_id: ChatId },
}

struct TrackerInner {
    actions: HashMap<ChatId, HashMap<UserId, TypingAction>>,
    expiries: BinaryHeap<Reverse<(Instant, ChatId, UserId)>>,
    sweep: Option<JoinHandle<()>>,
}

pub struct TypingTracker {
    ttl: Duration,
    inner: Mutex<TrackerInner>,
    events: broadcast::Sender<TypingEvent>,
    // Handle to self for the spawned sweep; weak so the sweep task never
    // keeps a dropped tracker alive.
    weak_self: Weak<TypingTracker>,
}

impl TypingTracker {
    pub fn new(ttl: Duration, event_capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Arc::new_cyclic(|weak_self| Self {
            ttl,
            inner: Mutex::new(TrackerInner {
                actions: HashMap::new(),
                expiries: BinaryHeap::new(),
                sweep: None,
            }),
            events,
            weak_self: weak_self.clone(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TypingEvent> {
        self.events.subscribe()
    }

    /// Records or refreshes an action for the user; expiry becomes now + TTL.
    /// A `Cancel` action is an explicit removal.
    pub async fn add_action(&self, chat_id: ChatId, user_id: UserId, action: ChatActionKind) {
        if action.is_cancel() {
            self.clear_action(chat_id, user_id).await;
            return;
        }

        let expires_at = Instant::now() + self.ttl;
        {
            let mut inner = self.inner.lock().await;
            inner.actions.entry(chat_id).or_default().insert(
                user_id,
                TypingAction { action, expires_at },
            );
            inner.expiries.push(Reverse((expires_at, chat_id, user_id)));
            self.reschedule_locked(&mut inner);
        }
        let _ = self.events.send(TypingEvent::Changed { chat_id });
    }

    /// Removes the user immediately, independent of remaining TTL.
    pub async fn clear_action(&self, chat_id: ChatId, user_id: UserId) {
        let removed = {
            let mut inner = self.inner.lock().await;
            let removed = inner
                .actions
                .get_mut(&chat_id)
                .and_then(|users| users.remove(&user_id))
                .is_some();
            if removed {
                if inner.actions.get(&chat_id).is_some_and(HashMap::is_empty) {
                    inner.actions.remove(&chat_id);
                }
                self.reschedule_locked(&mut inner);
            }
            removed
        };
        if removed {
            let _ = self.events.send(TypingEvent::Changed { chat_id });
        }
    }

    /// Live (non-expired) actions for one chat, ordered by user id.
    pub async fn actions(&self, chat_id: ChatId) -> Vec<(UserId, ChatActionKind)> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let mut live: Vec<_> = inner
            .actions
            .get(&chat_id)
            .map(|users| {
                users
                    .iter()
                    .filter(|(_, entry)| entry.expires_at > now)
                    .map(|(user_id, entry)| (*user_id, entry.action))
                    .collect()
            })
            .unwrap_or_default();
        live.sort_by_key(|(user_id, _)| *user_id);
        live
    }

    /// Cancels any pending sweep and schedules one for the heap minimum, if
    /// any live entry remains. Heap heads that no longer match the map (the
    /// user refreshed or cleared since the push) are discarded here.
    fn reschedule_locked(&self, inner: &mut TrackerInner) {
        if let Some(pending) = inner.sweep.take() {
            pending.abort();
        }

        let next = loop {
            let Some(Reverse(head)) = inner.expiries.peek().copied() else {
                break None;
            };
            let (deadline, chat_id, user_id) = head;
            let live = inner
                .actions
                .get(&chat_id)
                .and_then(|users| users.get(&user_id))
                .map(|entry| entry.expires_at);
            if live == Some(deadline) {
                break Some(deadline);
            }
            inner.expiries.pop();
        };

        if let Some(deadline) = next {
            let tracker = self.weak_self.clone();
            inner.sweep = Some(tokio::spawn(async move {
                sleep_until(deadline).await;
                if let Some(tracker) = tracker.upgrade() {
                    tracker.sweep().await;
                }
            }));
        }
    }

    async fn sweep(&self) {
        let changed_chats = {
            let mut inner = self.inner.lock().await;
            // This is the pending sweep itself; take it so reschedule does not
            // abort the currently running task.
            inner.sweep.take();

            let now = Instant::now();
            let mut changed_chats = Vec::new();
            while let Some(Reverse(head)) = inner.expiries.peek().copied() {
                let (deadline, chat_id, user_id) = head;
                if deadline > now {
                    break;
                }
                inner.expiries.pop();
                let live = inner
                    .actions
                    .get(&chat_id)
                    .and_then(|users| users.get(&user_id))
                    .map(|entry| entry.expires_at);
                if live != Some(deadline) {
                    continue;
                }
                if let Some(users) = inner.actions.get_mut(&chat_id) {
                    users.remove(&user_id);
                    if users.is_empty() {
                        inner.actions.remove(&chat_id);
                    }
                }
                debug!(chat_id = chat_id.0, user_id = user_id.0, "chat action expired");
                if !changed_chats.contains(&chat_id) {
                    changed_chats.push(chat_id);
                }
            }

            self.reschedule_locked(&mut inner);
            changed_chats
        };

        for chat_id in changed_chats {
            let _ = self.events.send(TypingEvent::Changed { chat_id });
        }
    }
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
