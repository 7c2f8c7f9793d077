use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);
    };
}

id_newtype!(ChatId);
id_newtype!(UserId);
id_newtype!(MessageId);
id_newtype!(FileId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum UserStatus {
    Online,
    Offline { last_seen_at: Option<DateTime<Utc>> },
    Recently,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Offline { last_seen_at: None }
    }
}

/// Ephemeral per-user chat signal with a fixed time-to-live on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatActionKind {
    Typing,
    RecordingVoiceNote,
    UploadingPhoto,
    UploadingVideo,
    UploadingDocument,
    ChoosingSticker,
    Cancel,
}

impl ChatActionKind {
    pub fn is_cancel(self) -> bool {
        matches!(self, Self::Cancel)
    }
}
