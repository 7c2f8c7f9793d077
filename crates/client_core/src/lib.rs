//! Client-side state pipeline for the messenger UI.
//!
//! Updates pushed by the remote session are applied, strictly in delivery
//! order, to per-kind entity stores and re-broadcast to any number of
//! subscribed views. Typing-class signals are routed to the expiring
//! [`TypingTracker`] instead of a store.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use anyhow::Result;
use shared::{
    domain::{ChatActionKind, ChatId, MessageId, UserId},
    error::ApiError,
    protocol::{Chat, Command, Message, MessageContent, Update, User},
};
use tokio::{
    sync::{broadcast, RwLock},
    task::JoinHandle,
};
use tracing::{debug, warn};

pub mod config;
pub mod presence;
pub mod store;
pub mod transport;

pub use config::{load_settings, Settings};
pub use presence::{TypingEvent, TypingTracker};
pub use store::{ChatStore, Entity, EntityStore, MessageStore, UserStore};
pub use transport::{MissingRemoteSession, RemoteSession, TransportError, WebSocketSession};

/// Outbound notification stream of the client. `Update` carries the original
/// server payload for every update that was actually applied to a store.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Update(Update),
    TypingChanged { chat_id: ChatId },
    Api(ApiError),
    Error(String),
}

struct Stores {
    chats: ChatStore,
    users: UserStore,
    messages: MessageStore,
}

pub struct MessengerClient {
    session: Arc<dyn RemoteSession>,
    stores: RwLock<Stores>,
    typing: Arc<TypingTracker>,
    events: broadcast::Sender<ClientEvent>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    // Handle to self for the spawned pump; weak so the pump never keeps a
    // dropped client alive.
    weak_self: Weak<MessengerClient>,
}

impl MessengerClient {
    pub fn new(session: Arc<dyn RemoteSession>, settings: &Settings) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Arc::new_cyclic(|weak_self| Self {
            session,
            stores: RwLock::new(Stores {
                chats: ChatStore::new("chat"),
                users: UserStore::new("user"),
                messages: MessageStore::new("message"),
            }),
            typing: TypingTracker::new(settings.typing_ttl(), settings.event_capacity.max(1)),
            events,
            tasks: StdMutex::new(Vec::new()),
            weak_self: weak_self.clone(),
        })
    }

    /// Starts the update pump and the typing-change forwarder. Idempotent.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !tasks.is_empty() {
            return;
        }

        let client = self.weak_self.clone();
        let events = self.events.clone();
        let mut updates = self.session.subscribe_updates();
        tasks.push(tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => {
                        let Some(client) = client.upgrade() else { break };
                        client.apply_update(update).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "update stream lagged; continuing");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = events
                            .send(ClientEvent::Error("session update stream closed".into()));
                        break;
                    }
                }
            }
        }));

        let events = self.events.clone();
        let mut typing_events = self.typing.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                match typing_events.recv().await {
                    Ok(TypingEvent::Changed { chat_id }) => {
                        let _ = events.send(ClientEvent::TypingChanged { chat_id });
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn typing(&self) -> Arc<TypingTracker> {
        Arc::clone(&self.typing)
    }

    pub async fn chat(&self, id: ChatId) -> Option<Arc<Chat>> {
        self.stores.read().await.chats.get(id)
    }

    pub async fn user(&self, id: UserId) -> Option<Arc<User>> {
        self.stores.read().await.users.get(id)
    }

    pub async fn message(&self, id: MessageId) -> Option<Arc<Message>> {
        self.stores.read().await.messages.get(id)
    }

    pub async fn chats_snapshot(&self) -> Vec<Arc<Chat>> {
        self.stores.read().await.chats.snapshot()
    }

    /// Messages of one chat in `(sent_at, id)` order.
    pub async fn messages_for_chat(&self, chat_id: ChatId) -> Vec<Arc<Message>> {
        let mut messages: Vec<_> = self
            .stores
            .read()
            .await
            .messages
            .snapshot()
            .into_iter()
            .filter(|message| message.chat_id == chat_id)
            .collect();
        messages.sort_by_key(|message| (message.sent_at, message.id));
        messages
    }

    pub async fn load_chats(&self, limit: u32) -> Result<()> {
        self.session.send(Command::LoadChats { limit }).await
    }

    pub async fn load_chat_history(
        &self,
        chat_id: ChatId,
        from_message_id: Option<MessageId>,
        limit: u32,
    ) -> Result<()> {
        self.session
            .send(Command::LoadChatHistory {
                chat_id,
                from_message_id,
                limit,
            })
            .await
    }

    pub async fn send_message(&self, chat_id: ChatId, content: MessageContent) -> Result<()> {
        self.session
            .send(Command::SendMessage { chat_id, content })
            .await
    }

    pub async fn send_chat_action(&self, chat_id: ChatId, action: ChatActionKind) -> Result<()> {
        self.session
            .send(Command::SendChatAction { chat_id, action })
            .await
    }

    pub async fn view_messages(&self, chat_id: ChatId, message_ids: Vec<MessageId>) -> Result<()> {
        self.session
            .send(Command::ViewMessages {
                chat_id,
                message_ids,
            })
            .await
    }

    async fn apply_update(&self, update: Update) {
        let applied = match &update {
            Update::NewChat { chat } => {
                self.stores.write().await.chats.set(chat.clone());
                true
            }
            Update::ChatTitle { chat_id, title } => self
                .stores
                .write()
                .await
                .chats
                .merge(*chat_id, |chat| chat.title = title.clone()),
            Update::ChatPhoto { chat_id, photo } => self
                .stores
                .write()
                .await
                .chats
                .merge(*chat_id, |chat| chat.photo = *photo),
            Update::ChatLastMessage {
                chat_id,
                last_message_id,
                order,
            } => self.stores.write().await.chats.merge(*chat_id, |chat| {
                chat.last_message_id = *last_message_id;
                chat.order = *order;
            }),
            Update::ChatUnreadCount {
                chat_id,
                unread_count,
            } => self
                .stores
                .write()
                .await
                .chats
                .merge(*chat_id, |chat| chat.unread_count = *unread_count),
            Update::ChatOrder { chat_id, order } => self
                .stores
                .write()
                .await
                .chats
                .merge(*chat_id, |chat| chat.order = *order),
            Update::NewUser { user } => {
                self.stores.write().await.users.set(user.clone());
                true
            }
            Update::UserStatus { user_id, status } => self
                .stores
                .write()
                .await
                .users
                .merge(*user_id, |user| user.status = *status),
            Update::UserName {
                user_id,
                username,
                first_name,
                last_name,
            } => self.stores.write().await.users.merge(*user_id, |user| {
                user.username = username.clone();
                user.first_name = first_name.clone();
                user.last_name = last_name.clone();
            }),
            Update::NewMessage { message } => {
                self.stores.write().await.messages.set(message.clone());
                true
            }
            Update::MessageContent {
                message_id, content, ..
            } => self
                .stores
                .write()
                .await
                .messages
                .merge(*message_id, |message| message.content = content.clone()),
            Update::MessageEdited {
                message_id,
                edited_at,
                ..
            } => self
                .stores
                .write()
                .await
                .messages
                .merge(*message_id, |message| message.edited_at = Some(*edited_at)),
            Update::ChatAction {
                chat_id,
                user_id,
                action,
            } => {
                // Ephemeral signal; the tracker emits its own change event.
                self.typing.add_action(*chat_id, *user_id, *action).await;
                return;
            }
            Update::Error { error } => {
                let _ = self.events.send(ClientEvent::Api(error.clone()));
                return;
            }
            Update::Unsupported => {
                debug!("dropping unsupported update kind");
                return;
            }
        };

        if applied {
            let _ = self.events.send(ClientEvent::Update(update));
        }
    }

    pub fn close(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MessengerClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
