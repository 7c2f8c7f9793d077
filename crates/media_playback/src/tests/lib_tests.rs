use super::*;

use tokio::time::{sleep, timeout, Duration, Instant};

struct FakeMediaHandle {
    events: broadcast::Sender<MediaHandleEvent>,
    calls: Mutex<Vec<String>>,
}

impl FakeMediaHandle {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            calls: Mutex::new(Vec::new()),
        })
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }

    fn emit(&self, event: MediaHandleEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MediaHandle for FakeMediaHandle {
    async fn play(&self) -> Result<()> {
        self.record("play").await;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.record("pause").await;
        Ok(())
    }

    async fn seek(&self, position_secs: f64) -> Result<()> {
        self.record(format!("seek:{position_secs}")).await;
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.record(format!("volume:{volume}")).await;
        Ok(())
    }

    async fn set_rate(&self, rate: f64) -> Result<()> {
        self.record(format!("rate:{rate}")).await;
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<MediaHandleEvent> {
        self.events.subscribe()
    }
}

struct FakeMediaBackend {
    handles: Mutex<Vec<Arc<FakeMediaHandle>>>,
}

impl FakeMediaBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(Vec::new()),
        })
    }

    async fn last_handle(&self) -> Arc<FakeMediaHandle> {
        self.handles
            .lock()
            .await
            .last()
            .cloned()
            .expect("a handle was loaded")
    }
}

#[async_trait]
impl MediaBackend for FakeMediaBackend {
    async fn load(&self, source: &MediaSource) -> Result<Arc<dyn MediaHandle>> {
        if source.url.starts_with("bad://") {
            return Err(anyhow!("resource unavailable: {}", source.url));
        }
        let handle = FakeMediaHandle::new();
        self.handles.lock().await.push(Arc::clone(&handle));
        Ok(handle)
    }
}

fn message_target(chat: i64, message: i64) -> PlaybackTarget {
    PlaybackTarget::Message {
        chat_id: ChatId(chat),
        message_id: MessageId(message),
    }
}

fn source(url: &str) -> MediaSource {
    MediaSource {
        url: url.to_string(),
    }
}

async fn recv(rx: &mut broadcast::Receiver<PlaybackEvent>) -> PlaybackEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within deadline")
        .expect("event channel open")
}

async fn recv_until(
    rx: &mut broadcast::Receiver<PlaybackEvent>,
    stop: impl Fn(&PlaybackEvent) -> bool,
) -> Vec<PlaybackEvent> {
    let mut seen = Vec::new();
    loop {
        let event = recv(rx).await;
        let done = stop(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn activating_b_deactivates_a_first() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);
    let mut events = coordinator.subscribe_events();

    let a = message_target(1, 10);
    let b = message_target(1, 11);
    coordinator.activate(a, source("file://a")).await.expect("activate a");
    recv_until(&mut events, |event| {
        matches!(
            event,
            PlaybackEvent::StateChanged {
                state: PlaybackState::Playing,
                ..
            }
        )
    })
    .await;

    coordinator.activate(b, source("file://b")).await.expect("activate b");
    let seen = recv_until(&mut events, |event| {
        matches!(
            event,
            PlaybackEvent::StateChanged {
                state: PlaybackState::Playing,
                ..
            }
        )
    })
    .await;

    let deactivated_a = seen
        .iter()
        .position(|event| *event == PlaybackEvent::Deactivated { target: a })
        .expect("a deactivated");
    let activated_b = seen
        .iter()
        .position(|event| *event == PlaybackEvent::Activated { target: b })
        .expect("b activated");
    assert!(deactivated_a < activated_b);
    assert_eq!(coordinator.active_target().await, Some(b));
}

#[tokio::test]
async fn superseded_handle_is_paused_not_just_forgotten() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);

    let a = message_target(8, 80);
    let b = message_target(8, 81);
    coordinator.activate(a, source("file://a")).await.expect("activate a");
    let a_handle = backend.last_handle().await;
    assert!(a_handle.calls.lock().await.contains(&"play".to_string()));

    coordinator.activate(b, source("file://b")).await.expect("activate b");

    // The pause is issued asynchronously during teardown of the old session.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if a_handle.calls.lock().await.contains(&"pause".to_string()) {
            break;
        }
        assert!(Instant::now() < deadline, "superseded handle was never paused");
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(coordinator.active_target().await, Some(b));
}

#[tokio::test]
async fn load_failure_reports_once_and_goes_inactive() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend, 64);
    let mut events = coordinator.subscribe_events();

    let target = message_target(2, 20);
    coordinator
        .activate(target, source("bad://missing"))
        .await
        .expect("activate");

    let seen = recv_until(&mut events, |event| {
        matches!(event, PlaybackEvent::Deactivated { .. })
    })
    .await;
    assert!(seen
        .iter()
        .any(|event| matches!(event, PlaybackEvent::Failed { .. })));
    assert_eq!(coordinator.state().await, PlaybackState::Inactive);
    assert_eq!(coordinator.active_target().await, None);
}

#[tokio::test]
async fn toggle_flips_between_playing_and_paused() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);
    let target = message_target(3, 30);
    coordinator.activate(target, source("file://song")).await.expect("activate");
    assert_eq!(coordinator.state().await, PlaybackState::Playing);

    coordinator.toggle().await.expect("pause");
    assert_eq!(coordinator.state().await, PlaybackState::Paused);
    coordinator.toggle().await.expect("resume");
    assert_eq!(coordinator.state().await, PlaybackState::Playing);

    let handle = backend.last_handle().await;
    let calls = handle.calls.lock().await;
    assert!(calls.contains(&"pause".to_string()));
    assert!(calls.iter().filter(|call| *call == "play").count() >= 2);
}

#[tokio::test]
async fn seek_preserves_play_state() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);
    let mut events = coordinator.subscribe_events();
    let target = message_target(4, 40);
    coordinator.activate(target, source("file://clip")).await.expect("activate");
    coordinator.toggle().await.expect("pause");

    coordinator.seek(12.5).await.expect("seek");

    assert_eq!(coordinator.state().await, PlaybackState::Paused);
    let seen = recv_until(&mut events, |event| {
        matches!(event, PlaybackEvent::PositionChanged { .. })
    })
    .await;
    assert!(seen.contains(&PlaybackEvent::PositionChanged {
        target,
        position_secs: 12.5,
    }));
    let handle = backend.last_handle().await;
    assert!(handle.calls.lock().await.contains(&"seek:12.5".to_string()));
}

#[tokio::test]
async fn natural_end_auto_advances_to_next_queued_item() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);
    let mut events = coordinator.subscribe_events();

    let a = message_target(5, 50);
    let b = message_target(5, 51);
    coordinator.activate(a, source("file://a")).await.expect("activate");
    coordinator.enqueue(b, source("file://b")).await;

    backend.last_handle().await.emit(MediaHandleEvent::Ended);

    let seen = recv_until(&mut events, |event| {
        *event
            == PlaybackEvent::StateChanged {
                target: b,
                state: PlaybackState::Playing,
            }
    })
    .await;
    assert!(seen.contains(&PlaybackEvent::StateChanged {
        target: a,
        state: PlaybackState::Ended,
    }));
    let deactivated_a = seen
        .iter()
        .position(|event| *event == PlaybackEvent::Deactivated { target: a })
        .expect("a deactivated");
    let activated_b = seen
        .iter()
        .position(|event| *event == PlaybackEvent::Activated { target: b })
        .expect("b activated");
    assert!(deactivated_a < activated_b);
    assert_eq!(coordinator.active_target().await, Some(b));
}

#[tokio::test]
async fn natural_end_with_empty_queue_goes_inactive() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);
    let mut events = coordinator.subscribe_events();

    let target = message_target(6, 60);
    coordinator.activate(target, source("file://a")).await.expect("activate");
    backend.last_handle().await.emit(MediaHandleEvent::Ended);

    recv_until(&mut events, |event| {
        *event == PlaybackEvent::Deactivated { target }
    })
    .await;
    assert_eq!(coordinator.state().await, PlaybackState::Inactive);
}

#[tokio::test]
async fn transport_settings_apply_to_new_sessions() {
    let backend = FakeMediaBackend::new();
    let coordinator = PlaybackCoordinator::new(backend.clone(), 64);
    coordinator.set_volume(0.5).await.expect("volume");
    coordinator.set_rate(1.5).await.expect("rate");

    let target = message_target(7, 70);
    coordinator.activate(target, source("file://a")).await.expect("activate");

    let handle = backend.last_handle().await;
    let calls = handle.calls.lock().await;
    assert!(calls.contains(&"volume:0.5".to_string()));
    assert!(calls.contains(&"rate:1.5".to_string()));
}
