//! Windowed message rows plus the typing banner for one open chat.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use client_core::{ClientEvent, MessengerClient};
use shared::{
    domain::{ChatActionKind, ChatId, MessageId, UserId},
    protocol::Update,
};
use tokio::sync::broadcast;

use crate::{subscription::ScopedSubscription, viewport::ViewportWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub preview: String,
    pub sent_at: DateTime<Utc>,
    pub edited: bool,
}

pub struct MessageListModel {
    rows: Arc<RwLock<Vec<MessageRow>>>,
    typing_line: Arc<RwLock<Option<String>>>,
    viewport: Mutex<ViewportWindow>,
    _subscription: ScopedSubscription,
}

impl MessageListModel {
    pub async fn new(
        client: Arc<MessengerClient>,
        chat_id: ChatId,
        row_height: i64,
        overscan: i64,
    ) -> Self {
        let rows = Arc::new(RwLock::new(Vec::new()));
        let typing_line = Arc::new(RwLock::new(None));
        let mut events = client.subscribe_events();
        refresh_rows(&client, chat_id, &rows).await;
        refresh_typing_line(&client, chat_id, &typing_line).await;

        let task_client = Arc::clone(&client);
        let task_rows = Arc::clone(&rows);
        let task_typing = Arc::clone(&typing_line);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::Update(update)) if touches_messages(&update, chat_id) => {
                        refresh_rows(&task_client, chat_id, &task_rows).await;
                    }
                    Ok(ClientEvent::TypingChanged { chat_id: changed }) if changed == chat_id => {
                        refresh_typing_line(&task_client, chat_id, &task_typing).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        refresh_rows(&task_client, chat_id, &task_rows).await;
                        refresh_typing_line(&task_client, chat_id, &task_typing).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            rows,
            typing_line,
            viewport: Mutex::new(ViewportWindow::new(0, row_height, overscan)),
            _subscription: ScopedSubscription::from_task(task),
        }
    }

    pub fn rows(&self) -> Vec<MessageRow> {
        self.rows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn visible_rows(&self, scroll_offset: i64, viewport_height: i64) -> Vec<MessageRow> {
        let rows = self
            .rows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut viewport = self
            .viewport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        viewport.set_item_count(rows.len());
        let range = viewport.compute_visible(scroll_offset, viewport_height);
        rows[range].to_vec()
    }

    pub fn should_recompute(&self, scroll_offset: i64) -> bool {
        self.viewport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .should_recompute(scroll_offset)
    }

    /// Banner text for the chat footer, or None when nobody is active.
    pub fn typing_line(&self) -> Option<String> {
        self.typing_line
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

async fn refresh_rows(
    client: &Arc<MessengerClient>,
    chat_id: ChatId,
    rows: &Arc<RwLock<Vec<MessageRow>>>,
) {
    let messages = client.messages_for_chat(chat_id).await;
    let mut next = Vec::with_capacity(messages.len());
    for message in messages {
        let sender_name = match client.user(message.sender_id).await {
            Some(user) => user.display_name(),
            None => format!("user {}", message.sender_id.0),
        };
        next.push(MessageRow {
            message_id: message.id,
            sender_id: message.sender_id,
            sender_name,
            preview: message.content.preview(),
            sent_at: message.sent_at,
            edited: message.edited_at.is_some(),
        });
    }
    *rows.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
}

async fn refresh_typing_line(
    client: &Arc<MessengerClient>,
    chat_id: ChatId,
    typing_line: &Arc<RwLock<Option<String>>>,
) {
    let actions = client.typing().actions(chat_id).await;
    let line = match actions.as_slice() {
        [] => None,
        [(user_id, action)] => {
            let name = match client.user(*user_id).await {
                Some(user) => user.display_name(),
                None => format!("user {}", user_id.0),
            };
            Some(format!("{name} is {}", action_verb(*action)))
        }
        many => Some(format!("{} people are typing", many.len())),
    };
    *typing_line
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = line;
}

fn action_verb(action: ChatActionKind) -> &'static str {
    match action {
        ChatActionKind::Typing => "typing",
        ChatActionKind::RecordingVoiceNote => "recording a voice note",
        ChatActionKind::UploadingPhoto => "uploading a photo",
        ChatActionKind::UploadingVideo => "uploading a video",
        ChatActionKind::UploadingDocument => "uploading a document",
        ChatActionKind::ChoosingSticker => "choosing a sticker",
        // Cancel never survives in the tracker.
        ChatActionKind::Cancel => "typing",
    }
}

fn touches_messages(update: &Update, chat_id: ChatId) -> bool {
    match update {
        Update::NewMessage { message } => message.chat_id == chat_id,
        Update::MessageContent { chat_id: id, .. } | Update::MessageEdited { chat_id: id, .. } => {
            *id == chat_id
        }
        // Sender names feed the rows.
        Update::NewUser { .. } | Update::UserName { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/message_list_tests.rs"]
mod tests;
