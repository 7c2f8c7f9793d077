use super::*;

use anyhow::Result;
use async_trait::async_trait;
use chrono::TimeZone;
use client_core::{RemoteSession, Settings};
use shared::protocol::{Command, Message, MessageContent, User};
use tokio::time::{sleep, Duration, Instant};

struct FakeRemoteSession {
    updates: broadcast::Sender<Update>,
}

impl FakeRemoteSession {
    fn new() -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        Arc::new(Self { updates })
    }

    fn push(&self, update: Update) {
        self.updates.send(update).expect("pump subscribed");
    }
}

#[async_trait]
impl RemoteSession for FakeRemoteSession {
    async fn send(&self, _command: Command) -> Result<()> {
        Ok(())
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }
}

fn new_user(id: i64, first_name: &str) -> Update {
    Update::NewUser {
        user: User {
            id: UserId(id),
            username: format!("u{id}"),
            first_name: first_name.to_string(),
            last_name: String::new(),
            status: Default::default(),
            profile_photo: None,
        },
    }
}

fn new_message(id: i64, chat_id: i64, sender_id: i64, sent_at_secs: i64, text: &str) -> Update {
    Update::NewMessage {
        message: Message {
            id: MessageId(id),
            chat_id: ChatId(chat_id),
            sender_id: UserId(sender_id),
            content: MessageContent::Text {
                text: text.to_string(),
            },
            sent_at: Utc.timestamp_opt(sent_at_secs, 0).single().expect("timestamp"),
            edited_at: None,
        },
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn rows_resolve_sender_names_in_send_order() {
    let session = FakeRemoteSession::new();
    let client = MessengerClient::new(session.clone(), &Settings::default());
    client.start();
    let model = MessageListModel::new(Arc::clone(&client), ChatId(1), 48, 2).await;

    session.push(new_user(7, "Alice"));
    session.push(new_message(12, 1, 7, 2_000, "second"));
    session.push(new_message(11, 1, 9, 1_000, "first"));
    session.push(new_message(30, 2, 7, 1_500, "other chat"));
    wait_for(|| model.rows().len() == 2).await;

    let rows = model.rows();
    assert_eq!(rows[0].message_id, MessageId(11));
    assert_eq!(rows[1].message_id, MessageId(12));
    assert_eq!(rows[1].sender_name, "Alice");
    // Unknown senders fall back to a numeric placeholder.
    assert_eq!(rows[0].sender_name, "user 9");
    assert_eq!(rows[0].preview, "first");
}

#[tokio::test]
async fn edits_update_preview_and_flag() {
    let session = FakeRemoteSession::new();
    let client = MessengerClient::new(session.clone(), &Settings::default());
    client.start();
    let model = MessageListModel::new(Arc::clone(&client), ChatId(3), 48, 2).await;

    session.push(new_message(5, 3, 1, 100, "draft"));
    wait_for(|| model.rows().len() == 1).await;

    session.push(Update::MessageContent {
        chat_id: ChatId(3),
        message_id: MessageId(5),
        content: MessageContent::Text {
            text: "final".to_string(),
        },
    });
    session.push(Update::MessageEdited {
        chat_id: ChatId(3),
        message_id: MessageId(5),
        edited_at: Utc.timestamp_opt(200, 0).single().expect("timestamp"),
    });
    wait_for(|| {
        model
            .rows()
            .first()
            .is_some_and(|row| row.preview == "final" && row.edited)
    })
    .await;
}

#[tokio::test]
async fn typing_line_names_a_single_active_user() {
    let session = FakeRemoteSession::new();
    let client = MessengerClient::new(session.clone(), &Settings::default());
    client.start();
    let model = MessageListModel::new(Arc::clone(&client), ChatId(1), 48, 2).await;

    session.push(new_user(7, "Alice"));
    session.push(Update::ChatAction {
        chat_id: ChatId(1),
        user_id: UserId(7),
        action: ChatActionKind::Typing,
    });
    wait_for(|| model.typing_line() == Some("Alice is typing".to_string())).await;

    session.push(Update::ChatAction {
        chat_id: ChatId(1),
        user_id: UserId(7),
        action: ChatActionKind::Cancel,
    });
    wait_for(|| model.typing_line().is_none()).await;
}

#[tokio::test]
async fn typing_line_counts_multiple_active_users() {
    let session = FakeRemoteSession::new();
    let client = MessengerClient::new(session.clone(), &Settings::default());
    client.start();
    let model = MessageListModel::new(Arc::clone(&client), ChatId(1), 48, 2).await;

    for (user_id, action) in [
        (UserId(7), ChatActionKind::Typing),
        (UserId(9), ChatActionKind::RecordingVoiceNote),
    ] {
        session.push(Update::ChatAction {
            chat_id: ChatId(1),
            user_id,
            action,
        });
    }
    wait_for(|| model.typing_line() == Some("2 people are typing".to_string())).await;
}

#[tokio::test]
async fn actions_in_other_chats_leave_the_line_untouched() {
    let session = FakeRemoteSession::new();
    let client = MessengerClient::new(session.clone(), &Settings::default());
    client.start();
    let model = MessageListModel::new(Arc::clone(&client), ChatId(1), 48, 2).await;

    session.push(Update::ChatAction {
        chat_id: ChatId(2),
        user_id: UserId(7),
        action: ChatActionKind::Typing,
    });
    // Give the pump a chance to route the action before asserting.
    sleep(Duration::from_millis(50)).await;
    assert!(model.typing_line().is_none());
}
