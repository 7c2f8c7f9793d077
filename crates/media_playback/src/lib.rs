//! Process-wide playback coordination.
//!
//! At most one playable item is active at a time. Activating a new target
//! atomically supersedes the previous session: observers always see the old
//! target deactivate before the new one activates. The host media element is
//! reached through the [`MediaBackend`]/[`MediaHandle`] seams so that the
//! coordinator stays independent of any concrete player.

use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{ChatId, MessageId};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackTarget {
    /// A media message inside a chat.
    Message {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// A detached content block (e.g. an instant-view embed).
    Block { block_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// Opaque locator handed to the backend; the coordinator never parses it.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Inactive,
    Loading,
    Playing,
    Paused,
    Ended,
}

/// Events emitted by a live media handle back to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaHandleEvent {
    PositionChanged { position_secs: f64 },
    Ended,
    Failed { reason: String },
}

#[async_trait]
pub trait MediaHandle: Send + Sync {
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn seek(&self, position_secs: f64) -> Result<()>;
    async fn set_volume(&self, volume: f64) -> Result<()>;
    async fn set_rate(&self, rate: f64) -> Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<MediaHandleEvent>;
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn load(&self, source: &MediaSource) -> Result<Arc<dyn MediaHandle>>;
}

pub struct MissingMediaBackend;

#[async_trait]
impl MediaBackend for MissingMediaBackend {
    async fn load(&self, source: &MediaSource) -> Result<Arc<dyn MediaHandle>> {
        Err(anyhow!("media backend is unavailable for {}", source.url))
    }
}

/// Notifications fanned out to every observer view (header mini-player,
/// inline players, picture-in-picture overlay).
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Activated { target: PlaybackTarget },
    Deactivated { target: PlaybackTarget },
    StateChanged {
        target: PlaybackTarget,
        state: PlaybackState,
    },
    PositionChanged {
        target: PlaybackTarget,
        position_secs: f64,
    },
    VolumeChanged { volume: f64 },
    RateChanged { rate: f64 },
    Failed {
        target: PlaybackTarget,
        reason: String,
    },
}

struct ActivePlayback {
    target: PlaybackTarget,
    state: PlaybackState,
    position_secs: f64,
    handle: Option<Arc<dyn MediaHandle>>,
    event_task: Option<JoinHandle<()>>,
}

struct Transport {
    volume: f64,
    rate: f64,
}

pub struct PlaybackCoordinator {
    backend: Arc<dyn MediaBackend>,
    active: Mutex<Option<ActivePlayback>>,
    queue: Mutex<VecDeque<(PlaybackTarget, MediaSource)>>,
    transport: Mutex<Transport>,
    events: broadcast::Sender<PlaybackEvent>,
    // Handle to self for spawned event forwarders; weak so they never keep
    // a dropped coordinator alive.
    weak_self: Weak<PlaybackCoordinator>,
}

impl PlaybackCoordinator {
    pub fn new(backend: Arc<dyn MediaBackend>, event_capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Arc::new_cyclic(|weak_self| Self {
            backend,
            active: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            transport: Mutex::new(Transport {
                volume: 1.0,
                rate: 1.0,
            }),
            events,
            weak_self: weak_self.clone(),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub async fn active_target(&self) -> Option<PlaybackTarget> {
        self.active.lock().await.as_ref().map(|active| active.target)
    }

    pub async fn state(&self) -> PlaybackState {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.state)
            .unwrap_or(PlaybackState::Inactive)
    }

    /// Makes `target` the single active playable item. Any previous session is
    /// deactivated under the same lock, so no observer can ever see two
    /// targets active at once.
    pub async fn activate(&self, target: PlaybackTarget, source: MediaSource) -> Result<()> {
        {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                self.teardown(previous);
            }
            *active = Some(ActivePlayback {
                target,
                state: PlaybackState::Loading,
                position_secs: 0.0,
                handle: None,
                event_task: None,
            });
            let _ = self.events.send(PlaybackEvent::Activated { target });
            let _ = self.events.send(PlaybackEvent::StateChanged {
                target,
                state: PlaybackState::Loading,
            });
        }

        match self.backend.load(&source).await {
            Ok(handle) => self.attach_handle(target, handle).await,
            Err(err) => {
                self.fail_active(target, err.to_string()).await;
                Ok(())
            }
        }
    }

    /// Queues a target for auto-advance once the current item ends.
    pub async fn enqueue(&self, target: PlaybackTarget, source: MediaSource) {
        self.queue.lock().await.push_back((target, source));
    }

    pub async fn toggle(&self) -> Result<()> {
        let (handle, target, next_state) = {
            let mut active = self.active.lock().await;
            let Some(active) = active.as_mut() else {
                return Ok(());
            };
            let next_state = match active.state {
                PlaybackState::Playing => PlaybackState::Paused,
                PlaybackState::Paused => PlaybackState::Playing,
                _ => return Ok(()),
            };
            let Some(handle) = active.handle.clone() else {
                return Ok(());
            };
            active.state = next_state;
            (handle, active.target, next_state)
        };

        if next_state == PlaybackState::Paused {
            handle.pause().await?;
        } else {
            handle.play().await?;
        }
        let _ = self.events.send(PlaybackEvent::StateChanged {
            target,
            state: next_state,
        });
        Ok(())
    }

    /// Jumps to `position_secs` without changing the play/pause state.
    pub async fn seek(&self, position_secs: f64) -> Result<()> {
        let (handle, target) = {
            let mut active = self.active.lock().await;
            let Some(active) = active.as_mut() else {
                return Ok(());
            };
            if !matches!(active.state, PlaybackState::Playing | PlaybackState::Paused) {
                return Ok(());
            }
            let Some(handle) = active.handle.clone() else {
                return Ok(());
            };
            active.position_secs = position_secs;
            (handle, active.target)
        };

        handle.seek(position_secs).await?;
        let _ = self.events.send(PlaybackEvent::PositionChanged {
            target,
            position_secs,
        });
        Ok(())
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        let handle = {
            let mut transport = self.transport.lock().await;
            transport.volume = volume;
            self.active
                .lock()
                .await
                .as_ref()
                .and_then(|active| active.handle.clone())
        };
        if let Some(handle) = handle {
            handle.set_volume(volume).await?;
        }
        let _ = self.events.send(PlaybackEvent::VolumeChanged { volume });
        Ok(())
    }

    pub async fn set_rate(&self, rate: f64) -> Result<()> {
        let handle = {
            let mut transport = self.transport.lock().await;
            transport.rate = rate;
            self.active
                .lock()
                .await
                .as_ref()
                .and_then(|active| active.handle.clone())
        };
        if let Some(handle) = handle {
            handle.set_rate(rate).await?;
        }
        let _ = self.events.send(PlaybackEvent::RateChanged { rate });
        Ok(())
    }

    /// Explicit close; also drains the auto-advance queue.
    pub async fn close(&self) {
        self.queue.lock().await.clear();
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            self.teardown(previous);
        }
    }

    async fn attach_handle(
        &self,
        target: PlaybackTarget,
        handle: Arc<dyn MediaHandle>,
    ) -> Result<()> {
        let (volume, rate) = {
            let transport = self.transport.lock().await;
            (transport.volume, transport.rate)
        };
        handle.set_volume(volume).await?;
        handle.set_rate(rate).await?;
        handle.play().await?;

        let event_task = self.spawn_handle_events(target, handle.subscribe_events());

        let mut active = self.active.lock().await;
        match active.as_mut() {
            // Still the same target; promote to Playing.
            Some(current) if current.target == target => {
                current.handle = Some(handle);
                current.state = PlaybackState::Playing;
                current.event_task = Some(event_task);
                info!(playback_target = ?target, "playback session active");
                let _ = self.events.send(PlaybackEvent::StateChanged {
                    target,
                    state: PlaybackState::Playing,
                });
            }
            // Superseded while loading; the late handle is discarded.
            _ => {
                event_task.abort();
                warn!(playback_target = ?target, "discarding media handle for superseded target");
            }
        }
        Ok(())
    }

    fn spawn_handle_events(
        &self,
        target: PlaybackTarget,
        mut events: broadcast::Receiver<MediaHandleEvent>,
    ) -> JoinHandle<()> {
        let coordinator = self.weak_self.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let Some(coordinator) = coordinator.upgrade() else { break };
                match event {
                    MediaHandleEvent::PositionChanged { position_secs } => {
                        coordinator.record_position(target, position_secs).await;
                    }
                    MediaHandleEvent::Ended => {
                        coordinator.finish(target).await;
                        break;
                    }
                    MediaHandleEvent::Failed { reason } => {
                        coordinator.fail_active(target, reason).await;
                        break;
                    }
                }
            }
        })
    }

    async fn record_position(&self, target: PlaybackTarget, position_secs: f64) {
        {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(current) if current.target == target => {
                    current.position_secs = position_secs;
                }
                _ => return,
            }
        }
        let _ = self.events.send(PlaybackEvent::PositionChanged {
            target,
            position_secs,
        });
    }

    /// Natural completion; advances to the next queued item if one exists.
    async fn finish(&self, target: PlaybackTarget) {
        {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(current) if current.target == target => {
                    current.state = PlaybackState::Ended;
                }
                _ => return,
            }
        }
        let _ = self.events.send(PlaybackEvent::StateChanged {
            target,
            state: PlaybackState::Ended,
        });

        let next = self.queue.lock().await.pop_front();
        match next {
            Some((next_target, source)) => {
                let coordinator = self.weak_self.clone();
                // Activation re-enters the active lock; run it from a fresh task.
                tokio::spawn(async move {
                    let Some(coordinator) = coordinator.upgrade() else { return };
                    if let Err(err) = coordinator.activate(next_target, source).await {
                        warn!(playback_target = ?next_target, "auto-advance failed: {err}");
                    }
                });
            }
            None => {
                let previous = self.active.lock().await.take();
                if let Some(previous) = previous {
                    self.teardown(previous);
                }
            }
        }
    }

    /// Load or playback failure: report once, drop to Inactive, no retry.
    async fn fail_active(&self, target: PlaybackTarget, reason: String) {
        {
            let mut active = self.active.lock().await;
            match active.take() {
                Some(current) if current.target == target => {
                    if let Some(task) = current.event_task {
                        task.abort();
                    }
                }
                other => {
                    *active = other;
                    return;
                }
            }
        }
        warn!(playback_target = ?target, "media playback failed: {reason}");
        let _ = self.events.send(PlaybackEvent::Failed { target, reason });
        let _ = self.events.send(PlaybackEvent::Deactivated { target });
    }

    fn teardown(&self, previous: ActivePlayback) {
        if let Some(task) = previous.event_task {
            task.abort();
        }
        if let Some(handle) = previous.handle {
            // Stop the superseded element; best effort, it may already be gone.
            tokio::spawn(async move {
                let _ = handle.pause().await;
            });
        }
        let _ = self.events.send(PlaybackEvent::Deactivated {
            target: previous.target,
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
