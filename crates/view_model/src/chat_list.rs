//! Windowed chat-list rows derived from the chat store.

use std::sync::{Arc, Mutex, RwLock};

use client_core::{ClientEvent, MessengerClient};
use shared::{domain::ChatId, protocol::Update};
use tokio::sync::broadcast;

use crate::{subscription::ScopedSubscription, viewport::ViewportWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub chat_id: ChatId,
    pub title: String,
    pub unread_count: u32,
    pub order: i64,
}

pub struct ChatListModel {
    rows: Arc<RwLock<Vec<ChatRow>>>,
    viewport: Mutex<ViewportWindow>,
    _subscription: ScopedSubscription,
}

impl ChatListModel {
    pub async fn new(client: Arc<MessengerClient>, row_height: i64, overscan: i64) -> Self {
        let rows = Arc::new(RwLock::new(Vec::new()));
        let mut events = client.subscribe_events();
        refresh(&client, &rows).await;

        let task_client = Arc::clone(&client);
        let task_rows = Arc::clone(&rows);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::Update(update)) if touches_chat_list(&update) => {
                        refresh(&task_client, &task_rows).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        refresh(&task_client, &task_rows).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            rows,
            viewport: Mutex::new(ViewportWindow::new(0, row_height, overscan)),
            _subscription: ScopedSubscription::from_task(task),
        }
    }

    pub fn rows(&self) -> Vec<ChatRow> {
        self.rows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The near-visible slice of rows for the current scroll position.
    pub fn visible_rows(&self, scroll_offset: i64, viewport_height: i64) -> Vec<ChatRow> {
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
}

async fn refresh(client: &Arc<MessengerClient>, rows: &Arc<RwLock<Vec<ChatRow>>>) {
    let mut chats = client.chats_snapshot().await;
    chats.sort_by(|a, b| b.order.cmp(&a.order).then(b.id.cmp(&a.id)));
    let next: Vec<ChatRow> = chats
        .into_iter()
        .map(|chat| ChatRow {
            chat_id: chat.id,
            title: chat.title.clone(),
            unread_count: chat.unread_count,
            order: chat.order,
        })
        .collect();
    *rows.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
}

fn touches_chat_list(update: &Update) -> bool {
    matches!(
        update,
        Update::NewChat { .. }
            | Update::ChatTitle { .. }
            | Update::ChatPhoto { .. }
            | Update::ChatLastMessage { .. }
            | Update::ChatUnreadCount { .. }
            | Update::ChatOrder { .. }
    )
}

#[cfg(test)]
#[path = "tests/chat_list_tests.rs"]
mod tests;
