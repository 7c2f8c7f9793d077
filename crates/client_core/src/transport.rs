//! The seam to the remote chat backend.
//!
//! Everything downstream only sees [`RemoteSession`]: a sink for typed
//! commands and a broadcast stream of typed updates. The production
//! implementation speaks JSON text frames over a websocket.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::protocol::{Command, Update};
use thiserror::Error;
use tokio::{net::TcpStream, sync::broadcast, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn send(&self, command: Command) -> Result<()>;
    fn subscribe_updates(&self) -> broadcast::Receiver<Update>;
}

/// Null session for construction paths where no backend is wired up yet.
pub struct MissingRemoteSession {
    updates: broadcast::Sender<Update>,
}

impl Default for MissingRemoteSession {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(1);
        Self { updates }
    }
}

#[async_trait]
impl RemoteSession for MissingRemoteSession {
    async fn send(&self, _command: Command) -> Result<()> {
        Err(anyhow!("remote session is unavailable"))
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server url must start with http:// or https://: {0}")]
    UnsupportedScheme(String),
    #[error("invalid server url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct WebSocketSession {
    updates: broadcast::Sender<Update>,
    writer: Mutex<WsSink>,
    reader_task: JoinHandle<()>,
}

impl WebSocketSession {
    pub async fn connect(server_url: &str, event_capacity: usize) -> Result<Arc<Self>> {
        let ws_url = websocket_url(server_url)?;
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        info!(url = %ws_url, "websocket session established");
        let (writer, mut reader) = ws_stream.split();

        let (updates, _) = broadcast::channel(event_capacity.max(1));
        let update_tx = updates.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Update>(&text) {
                        Ok(update) => {
                            let _ = update_tx.send(update);
                        }
                        Err(err) => warn!("discarding malformed server frame: {err}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("websocket receive failed: {err}");
                        break;
                    }
                }
            }
        });

        Ok(Arc::new(Self {
            updates,
            writer: Mutex::new(writer),
            reader_task,
        }))
    }

    pub fn close(&self) {
        self.reader_task.abort();
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl RemoteSession for WebSocketSession {
    async fn send(&self, command: Command) -> Result<()> {
        let raw = serde_json::to_string(&command).context("failed to encode command")?;
        self.writer
            .lock()
            .await
            .send(Message::Text(raw))
            .await
            .context("websocket send failed")
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }
}

fn websocket_url(server_url: &str) -> Result<String, TransportError> {
    let ws_base = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(TransportError::UnsupportedScheme(server_url.to_string()));
    };
    let ws_url = format!("{}/updates", ws_base.trim_end_matches('/'));
    url::Url::parse(&ws_url).map_err(|source| TransportError::InvalidUrl {
        url: ws_url.clone(),
        source,
    })?;
    Ok(ws_url)
}
