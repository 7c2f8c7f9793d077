//! View-layer contracts: windowed list models bound to the client state
//! pipeline, with deterministic subscription teardown.

pub mod chat_list;
pub mod message_list;
pub mod subscription;
pub mod viewport;

pub use chat_list::{ChatListModel, ChatRow};
pub use message_list::{MessageListModel, MessageRow};
pub use subscription::ScopedSubscription;
pub use viewport::ViewportWindow;
