//! Voice notes
//!
//! Recording and playback go through an [`AudioDevice`] so the manager works
//! the same on machines with and without audio hardware.

use super::FeatureContext;
use crate::config::MessageEnvelope;
use crate::error::ClientError;
use crate::events::Toast;
use crate::protocol::{ClientMessage, PayloadType};
use crate::state::{ChatMessage, MessageKind, Sender};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Captured audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    /// Encoded audio in the configured container format
    pub bytes: Vec<u8>,
    /// Recording length
    pub duration: Duration,
}

/// Where a reply's audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Remote file
    Url(String),
    /// Inline audio decoded from base64
    Data(Vec<u8>),
}

impl AudioSource {
    /// Interpret a backend audio field: URLs start with `http`, anything
    /// else is base64
    pub fn parse(audio: &str) -> Result<Self, ClientError> {
        if audio.starts_with("http://") || audio.starts_with("https://") {
            return Ok(AudioSource::Url(audio.to_string()));
        }
        STANDARD
            .decode(audio.trim())
            .map(AudioSource::Data)
            .map_err(|e| ClientError::Validation(format!("Invalid audio data: {}", e)))
    }
}

/// Microphone and speaker capability
#[async_trait]
pub trait AudioDevice: Send + Sync {
    /// Capture and playback are possible on this machine
    async fn is_available(&self) -> bool;

    /// Begin capturing; fails when the device is missing or access is denied
    async fn start_capture(&self) -> Result<(), ClientError>;

    /// Stop capturing and return what was recorded
    async fn stop_capture(&self) -> Result<RecordedAudio, ClientError>;

    /// Play a reply until it ends
    async fn play(&self, source: AudioSource) -> Result<(), ClientError>;
}

/// Device for machines without audio support
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableAudio;

#[async_trait]
impl AudioDevice for UnavailableAudio {
    async fn is_available(&self) -> bool {
        false
    }

    async fn start_capture(&self) -> Result<(), ClientError> {
        Err(ClientError::Capability(
            "Voice input is not available on this device".to_string(),
        ))
    }

    async fn stop_capture(&self) -> Result<RecordedAudio, ClientError> {
        Err(ClientError::Capability("No recording in progress".to_string()))
    }

    async fn play(&self, _source: AudioSource) -> Result<(), ClientError> {
        Err(ClientError::Capability(
            "Audio playback is not available on this device".to_string(),
        ))
    }
}

/// Records voice notes and plays audio replies
pub struct VoiceManager {
    ctx: FeatureContext,
    device: Arc<dyn AudioDevice>,
    auto_stop: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager").finish_non_exhaustive()
    }
}

impl VoiceManager {
    /// Create the manager
    pub fn new(ctx: FeatureContext, device: Arc<dyn AudioDevice>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            device,
            auto_stop: Mutex::new(None),
        })
    }

    /// Probe the device and record the result in the store
    pub async fn check_availability(&self) -> bool {
        let available = self.device.is_available().await;
        if !available {
            warn!("Audio capture not available");
        }
        self.ctx
            .store
            .update(|state| state.voice_available = available);
        available
    }

    /// Start capturing; auto-stops after the configured maximum
    pub async fn start_recording(self: &Arc<Self>) -> Result<(), ClientError> {
        let state = self.ctx.store.get();
        if state.is_recording {
            debug!("Already recording");
            return Ok(());
        }
        if !state.voice_available {
            return Err(self.fail(ClientError::Capability(
                "Voice input is not available on this device".to_string(),
            )));
        }

        if let Err(e) = self.device.start_capture().await {
            warn!(error = %e, "Could not start audio capture");
            self.ctx.store.update(|state| state.is_recording = false);
            return Err(self.fail(ClientError::Capability(
                "Could not access the microphone".to_string(),
            )));
        }
        self.ctx.store.update(|state| state.is_recording = true);
        info!("Recording started");

        let limit = self.ctx.config.voice.max_recording_duration;
        let this: Weak<Self> = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let Some(this) = this.upgrade() else { return };
            // Detach first so stop_recording does not abort this task
            this.auto_stop
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if this.ctx.store.get().is_recording {
                info!(limit_ms = limit.as_millis() as u64, "Recording limit reached");
                this.ctx.events.toast(Toast::info(format!(
                    "Recording stopped (maximum {} seconds)",
                    limit.as_secs()
                )));
                if let Err(e) = this.stop_recording().await {
                    warn!(error = %e, "Auto-stop failed");
                }
            }
        });
        if let Some(previous) = self.set_timer(Some(timer)) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop capturing and send the recording
    pub async fn stop_recording(&self) -> Result<(), ClientError> {
        let mut claimed = false;
        self.ctx.store.update(|state| {
            claimed = std::mem::take(&mut state.is_recording);
        });
        if !claimed {
            return Ok(());
        }
        if let Some(timer) = self.set_timer(None) {
            timer.abort();
        }

        let recording = match self.device.stop_capture().await {
            Ok(recording) => recording,
            Err(e) => return Err(self.fail(e)),
        };
        if recording.bytes.is_empty() {
            self.ctx.events.toast(Toast::warning("No audio was recorded"));
            return Ok(());
        }
        info!(
            duration_ms = recording.duration.as_millis() as u64,
            bytes = recording.bytes.len(),
            "Recording complete"
        );

        let audio = STANDARD.encode(&recording.bytes);
        let id = self.ctx.store.next_message_id();
        self.ctx.store.add_message(ChatMessage::new(
            id,
            Sender::User,
            MessageKind::Voice,
            format!("Voice message ({:.1}s)", recording.duration.as_secs_f64()),
        ));

        let message = match self.ctx.envelope() {
            MessageEnvelope::Wrapped => self.ctx.wrapped(PayloadType::Voice, audio),
            MessageEnvelope::Flat => {
                let (user_id, session_id) = self.ctx.identity();
                ClientMessage::VoiceMessage {
                    audio,
                    format: self.ctx.config.voice.audio_format.clone(),
                    duration: recording.duration.as_millis() as u64,
                    user_id,
                    session_id,
                }
            }
        };
        self.ctx.connection.send(message);
        self.ctx.store.update(|state| state.is_typing = true);
        Ok(())
    }

    /// Play an audio reply (URL or base64)
    pub async fn play_reply(&self, audio: &str) -> Result<(), ClientError> {
        let source = AudioSource::parse(audio).map_err(|e| self.fail(e))?;
        self.ctx.store.update(|state| state.is_playing = true);
        let result = self.device.play(source).await;
        self.ctx.store.update(|state| state.is_playing = false);
        result.map_err(|e| {
            warn!(error = %e, "Audio playback failed");
            self.fail(ClientError::Capability("Could not play the audio reply".to_string()))
        })
    }

    fn set_timer(&self, timer: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut slot = self.auto_stop.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, timer)
    }

    fn fail(&self, error: ClientError) -> ClientError {
        self.ctx.events.toast(error.to_toast());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::{ClientEvent, ToastLevel};
    use crate::features::test_support;

    struct FakeMic {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl AudioDevice for FakeMic {
        async fn is_available(&self) -> bool {
            true
        }

        async fn start_capture(&self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn stop_capture(&self) -> Result<RecordedAudio, ClientError> {
            Ok(RecordedAudio {
                bytes: self.bytes.clone(),
                duration: Duration::from_millis(2500),
            })
        }

        async fn play(&self, _source: AudioSource) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[test]
    fn test_audio_source_parse() {
        assert_eq!(
            AudioSource::parse("https://cdn.test/reply.mp3").unwrap(),
            AudioSource::Url("https://cdn.test/reply.mp3".to_string())
        );
        assert_eq!(
            AudioSource::parse("aGVsbG8=").unwrap(),
            AudioSource::Data(b"hello".to_vec())
        );
        assert!(AudioSource::parse("%%%").is_err());
    }

    #[tokio::test]
    async fn test_unavailable_device_rejects_recording() {
        let ctx = test_support::context(Config::default());
        let mut events = ctx.events.subscribe();
        let voice = VoiceManager::new(ctx.clone(), Arc::new(UnavailableAudio));

        assert!(!voice.check_availability().await);
        let err = voice.start_recording().await.unwrap_err();
        assert!(matches!(err, ClientError::Capability(_)));
        assert!(!ctx.store.get().is_recording);
        assert!(matches!(
            events.try_recv(),
            Ok(ClientEvent::Toast(toast)) if toast.level == ToastLevel::Error
        ));
    }

    #[tokio::test]
    async fn test_record_and_send() {
        let ctx = test_support::context(Config::default());
        let voice = VoiceManager::new(ctx.clone(), Arc::new(FakeMic { bytes: vec![1, 2, 3] }));
        voice.check_availability().await;

        voice.start_recording().await.unwrap();
        assert!(ctx.store.get().is_recording);
        voice.stop_recording().await.unwrap();

        let state = ctx.store.get();
        assert!(!state.is_recording);
        assert!(state.is_typing);
        assert_eq!(state.messages[0].kind, MessageKind::Voice);
        assert_eq!(ctx.connection.queued().await, 1);
    }

    struct CountingMic {
        stops: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl AudioDevice for CountingMic {
        async fn is_available(&self) -> bool {
            true
        }

        async fn start_capture(&self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn stop_capture(&self) -> Result<RecordedAudio, ClientError> {
            self.stops.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(RecordedAudio {
                bytes: vec![4, 2],
                duration: Duration::from_millis(800),
            })
        }

        async fn play(&self, _source: AudioSource) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_stops_send_one_recording() {
        let ctx = test_support::context(Config::default());
        let mic = Arc::new(CountingMic {
            stops: std::sync::atomic::AtomicUsize::new(0),
        });
        let voice = VoiceManager::new(ctx.clone(), mic.clone());
        voice.check_availability().await;
        voice.start_recording().await.unwrap();

        let (first, second) = tokio::join!(
            tokio::spawn({
                let voice = Arc::clone(&voice);
                async move { voice.stop_recording().await }
            }),
            tokio::spawn({
                let voice = Arc::clone(&voice);
                async move { voice.stop_recording().await }
            }),
        );
        first.unwrap().unwrap();
        second.unwrap().unwrap();

        assert_eq!(mic.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(ctx.store.get().messages.len(), 1);
        assert_eq!(ctx.connection.queued().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stop_after_limit() {
        let mut config = Config::default();
        config.voice.max_recording_duration = Duration::from_secs(30);
        let ctx = test_support::context(config);
        let voice = VoiceManager::new(ctx.clone(), Arc::new(FakeMic { bytes: vec![9] }));
        voice.check_availability().await;

        voice.start_recording().await.unwrap();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(ctx.store.get().is_recording);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!ctx.store.get().is_recording);
        assert_eq!(ctx.store.get().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_play_reply_toggles_flag() {
        let ctx = test_support::context(Config::default());
        let voice = VoiceManager::new(ctx.clone(), Arc::new(FakeMic { bytes: vec![] }));
        voice.play_reply("https://cdn.test/a.mp3").await.unwrap();
        assert!(!ctx.store.get().is_playing);
    }
}
