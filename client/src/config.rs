//! Client configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Client configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Connection and reconnection settings
    pub connection: ConnectionConfig,
    /// Chat history settings
    pub chat: ChatConfig,
    /// Image upload settings
    pub image: ImageConfig,
    /// Voice recording settings
    pub voice: VoiceConfig,
    /// UI settings shared by the adapters
    pub ui: UiConfig,
    /// Where the session file lives (None = platform default)
    pub data_dir: Option<PathBuf>,
}

/// Outbound envelope shape expected by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageEnvelope {
    /// `{action: "message", content, user_id, session_id}` and the per-kind
    /// actions (`voice_message`, `image_message`, ...)
    Flat,
    /// `{action: "sendMessage", data: {message, type, user_id, session_id}}`
    #[default]
    Wrapped,
}

impl FromStr for MessageEnvelope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(MessageEnvelope::Flat),
            "wrapped" => Ok(MessageEnvelope::Wrapped),
            other => Err(format!("unknown message envelope: {}", other)),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint
    pub endpoint_url: String,
    /// Automatic reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Backoff table; attempt N waits `reconnect_delays[N-1]`
    pub reconnect_delays: Vec<Duration>,
    /// Outbound queue capacity while disconnected
    pub queue_capacity: usize,
    /// Raw stream idle-finalization window
    pub stream_idle_timeout: Duration,
    /// Outbound envelope shape
    pub envelope: MessageEnvelope,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://127.0.0.1:8080/ws".to_string(),
            max_reconnect_attempts: 5,
            reconnect_delays: [1000, 2000, 4000, 8000, 16000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            queue_capacity: 10,
            stream_idle_timeout: Duration::from_millis(500),
            envelope: MessageEnvelope::default(),
        }
    }
}

/// Chat configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Sliding window size of the message history
    pub max_history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { max_history: 50 }
    }
}

/// Image upload configuration
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Largest accepted file, in bytes
    pub max_size_bytes: usize,
    /// Maximum width after downscaling
    pub max_width: u32,
    /// Maximum height after downscaling
    pub max_height: u32,
    /// JPEG quality in 0.0..=1.0
    pub compression_quality: f32,
    /// Accepted MIME types
    pub allowed_types: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 5 * 1024 * 1024,
            max_width: 1920,
            max_height: 1080,
            compression_quality: 0.8,
            allowed_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        }
    }
}

/// Voice recording configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Recording auto-stops after this long
    pub max_recording_duration: Duration,
    /// Container format reported to the backend
    pub audio_format: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            max_recording_duration: Duration::from_secs(30),
            audio_format: "webm".to_string(),
        }
    }
}

/// UI configuration
#[derive(Debug, Clone)]
pub struct UiConfig {
    /// How long a toast stays visible
    pub toast_duration: Duration,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_duration: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            connection: ConnectionConfig {
                endpoint_url: env::var("CENTLI_WS_URL")
                    .unwrap_or(defaults.connection.endpoint_url),
                max_reconnect_attempts: parse_var(
                    "CENTLI_RECONNECT_MAX_ATTEMPTS",
                    defaults.connection.max_reconnect_attempts,
                ),
                reconnect_delays: env::var("CENTLI_RECONNECT_DELAYS_MS")
                    .ok()
                    .and_then(|raw| parse_delays(&raw))
                    .unwrap_or(defaults.connection.reconnect_delays),
                queue_capacity: parse_var(
                    "CENTLI_QUEUE_CAPACITY",
                    defaults.connection.queue_capacity,
                ),
                stream_idle_timeout: Duration::from_millis(parse_var(
                    "CENTLI_STREAM_IDLE_MS",
                    defaults.connection.stream_idle_timeout.as_millis() as u64,
                )),
                envelope: parse_var("CENTLI_MESSAGE_ENVELOPE", defaults.connection.envelope),
            },
            chat: ChatConfig {
                max_history: parse_var("CENTLI_MAX_MESSAGE_HISTORY", defaults.chat.max_history),
            },
            image: ImageConfig {
                max_size_bytes: parse_var("CENTLI_MAX_IMAGE_BYTES", defaults.image.max_size_bytes),
                max_width: parse_var("CENTLI_IMAGE_MAX_WIDTH", defaults.image.max_width),
                max_height: parse_var("CENTLI_IMAGE_MAX_HEIGHT", defaults.image.max_height),
                compression_quality: parse_var(
                    "CENTLI_IMAGE_QUALITY",
                    defaults.image.compression_quality,
                )
                .clamp(0.0, 1.0),
                allowed_types: env::var("CENTLI_ALLOWED_IMAGE_TYPES")
                    .ok()
                    .map(|raw| {
                        raw.split(',')
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .collect::<Vec<_>>()
                    })
                    .filter(|types| !types.is_empty())
                    .unwrap_or(defaults.image.allowed_types),
            },
            voice: VoiceConfig {
                max_recording_duration: Duration::from_millis(parse_var(
                    "CENTLI_MAX_RECORDING_MS",
                    defaults.voice.max_recording_duration.as_millis() as u64,
                )),
                audio_format: env::var("CENTLI_AUDIO_FORMAT")
                    .unwrap_or(defaults.voice.audio_format),
            },
            ui: UiConfig {
                toast_duration: Duration::from_millis(parse_var(
                    "CENTLI_TOAST_DURATION_MS",
                    defaults.ui.toast_duration.as_millis() as u64,
                )),
            },
            data_dir: env::var_os("CENTLI_DATA_DIR").map(PathBuf::from),
        }
    }

    /// Path of the persisted session file
    pub fn session_file_path(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.join("session.json"),
            None => crate::state::persistence::SessionFile::default_path(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = key, value = %raw, "Ignoring unparsable configuration value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated list of millisecond delays
fn parse_delays(raw: &str) -> Option<Vec<Duration>> {
    let delays: Result<Vec<u64>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect();
    match delays {
        Ok(delays) if !delays.is_empty() => {
            Some(delays.into_iter().map(Duration::from_millis).collect())
        }
        _ => {
            warn!(value = %raw, "Ignoring invalid reconnect delay table");
            None
        }
    }
}
