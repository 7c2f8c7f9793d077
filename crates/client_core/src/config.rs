use std::fs;

use serde::Deserialize;
use tokio::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    /// Time-to-live for typing-class chat actions, in seconds.
    pub typing_ttl_seconds: u64,
    /// Extra rows rendered beyond each visible edge of a windowed list.
    pub viewport_overscan_rows: i64,
    /// Capacity of the broadcast channels carrying client and store events.
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            typing_ttl_seconds: 6,
            viewport_overscan_rows: 5,
            event_capacity: 1024,
        }
    }
}

impl Settings {
    pub fn typing_ttl(&self) -> Duration {
        Duration::from_secs(self.typing_ttl_seconds)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    typing_ttl_seconds: Option<u64>,
    viewport_overscan_rows: Option<i64>,
    event_capacity: Option<usize>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("client.toml") {
        apply_file(&mut settings, &raw);
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());

    settings
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__TYPING_TTL_SECONDS").and_then(|v| v.parse().ok()) {
        settings.typing_ttl_seconds = v;
    }
    if let Some(v) = var("APP__VIEWPORT_OVERSCAN_ROWS").and_then(|v| v.parse().ok()) {
        settings.viewport_overscan_rows = v;
    }
    if let Some(v) = var("APP__EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.event_capacity = v;
    }
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<FileSettings>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.typing_ttl_seconds {
        settings.typing_ttl_seconds = v;
    }
    if let Some(v) = file_cfg.viewport_overscan_rows {
        settings.viewport_overscan_rows = v;
    }
    if let Some(v) = file_cfg.event_capacity {
        settings.event_capacity = v;
    }
}
