use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatActionKind, ChatId, FileId, MessageId, UserId, UserStatus},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<FileId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<MessageId>,
    #[serde(default)]
    pub unread_count: u32,
    /// Server-assigned sort key; larger means more recent activity.
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<FileId>,
}

impl User {
    pub fn display_name(&self) -> String {
        if self.first_name.is_empty() && self.last_name.is_empty() {
            return self.username.clone();
        }
        if self.last_name.is_empty() {
            return self.first_name.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Photo {
        file: FileId,
        #[serde(default)]
        caption: String,
    },
    Video {
        file: FileId,
        duration_secs: u32,
        #[serde(default)]
        caption: String,
    },
    Audio {
        file: FileId,
        duration_secs: u32,
        #[serde(default)]
        title: String,
    },
    Document {
        file: FileId,
        file_name: String,
    },
}

impl MessageContent {
    /// Short single-line form used by list rows and last-message previews.
    pub fn preview(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Photo { caption, .. } if !caption.is_empty() => format!("Photo, {caption}"),
            Self::Photo { .. } => "Photo".to_string(),
            Self::Video { caption, .. } if !caption.is_empty() => format!("Video, {caption}"),
            Self::Video { .. } => "Video".to_string(),
            Self::Audio { title, .. } if !title.is_empty() => format!("Audio, {title}"),
            Self::Audio { .. } => "Audio".to_string(),
            Self::Document { file_name, .. } => file_name.clone(),
        }
    }

    pub fn is_playable(&self) -> bool {
        matches!(self, Self::Video { .. } | Self::Audio { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// Inbound server push. One variant per recognized update kind; everything
/// else lands in `Unsupported` and is dropped downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum Update {
    NewChat {
        chat: Chat,
    },
    ChatTitle {
        chat_id: ChatId,
        title: String,
    },
    ChatPhoto {
        chat_id: ChatId,
        photo: Option<FileId>,
    },
    ChatLastMessage {
        chat_id: ChatId,
        last_message_id: Option<MessageId>,
        order: i64,
    },
    ChatUnreadCount {
        chat_id: ChatId,
        unread_count: u32,
    },
    ChatOrder {
        chat_id: ChatId,
        order: i64,
    },
    NewUser {
        user: User,
    },
    UserStatus {
        user_id: UserId,
        status: UserStatus,
    },
    UserName {
        user_id: UserId,
        username: String,
        first_name: String,
        last_name: String,
    },
    NewMessage {
        message: Message,
    },
    MessageContent {
        chat_id: ChatId,
        message_id: MessageId,
        content: MessageContent,
    },
    MessageEdited {
        chat_id: ChatId,
        message_id: MessageId,
        edited_at: DateTime<Utc>,
    },
    ChatAction {
        chat_id: ChatId,
        user_id: UserId,
        action: ChatActionKind,
    },
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unsupported,
}

/// Outbound client command accepted by the remote session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    LoadChats {
        limit: u32,
    },
    LoadChatHistory {
        chat_id: ChatId,
        from_message_id: Option<MessageId>,
        limit: u32,
    },
    SendMessage {
        chat_id: ChatId,
        content: MessageContent,
    },
    SendChatAction {
        chat_id: ChatId,
        action: ChatActionKind,
    },
    ViewMessages {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
}
