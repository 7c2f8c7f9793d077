//! Keyed entity caches mirroring server-pushed snapshots.
//!
//! Snapshots are replace-on-write: a merge clones the current value, applies
//! the patch, and stores a fresh `Arc`. Handles returned by [`EntityStore::get`]
//! therefore stay valid immutable point-in-time views for as long as the
//! caller keeps them.

use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use shared::{
    domain::{ChatId, MessageId, UserId},
    protocol::{Chat, Message, User},
};
use tracing::debug;

pub trait Entity {
    type Id: Copy + Eq + Hash + Debug;

    fn id(&self) -> Self::Id;
}

impl Entity for Chat {
    type Id = ChatId;

    fn id(&self) -> ChatId {
        self.id
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

impl Entity for Message {
    type Id = MessageId;

    fn id(&self) -> MessageId {
        self.id
    }
}

pub struct EntityStore<T: Entity> {
    kind: &'static str,
    entries: HashMap<T::Id, Arc<T>>,
}

pub type ChatStore = EntityStore<Chat>;
pub type UserStore = EntityStore<User>;
pub type MessageStore = EntityStore<Message>;

impl<T: Entity + Clone> EntityStore<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, id: T::Id) -> Option<Arc<T>> {
        self.entries.get(&id).cloned()
    }

    /// Inserts or replaces the snapshot wholesale, keyed by the entity's own id.
    pub fn set(&mut self, entity: T) -> Arc<T> {
        let snapshot = Arc::new(entity);
        self.entries.insert(snapshot.id(), Arc::clone(&snapshot));
        snapshot
    }

    /// Applies a partial update over the current snapshot. Returns false when
    /// the entity is unknown; the update is dropped in that case rather than
    /// treated as an error, since history may simply not be loaded yet.
    pub fn merge(&mut self, id: T::Id, patch: impl FnOnce(&mut T)) -> bool {
        let Some(current) = self.entries.get(&id) else {
            debug!(kind = self.kind, entity_id = ?id, "dropping update for absent entity");
            return false;
        };
        let mut next = T::clone(current);
        patch(&mut next);
        self.entries.insert(id, Arc::new(next));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
