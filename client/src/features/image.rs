//! Image upload
//!
//! Images are validated before anything leaves the machine, downscaled to
//! the configured bounds and re-encoded as JPEG. With the flat envelope the
//! bytes go to a presigned URL obtained over the socket; with the wrapped
//! envelope they travel inline as base64.

use super::FeatureContext;
use crate::config::{ImageConfig, MessageEnvelope};
use crate::error::ClientError;
use crate::events::Toast;
use crate::protocol::{ClientMessage, PayloadType};
use crate::state::{ChatMessage, MessageKind, Sender};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const UPLOAD_CONTENT_TYPE: &str = "image/jpeg";

/// An image picked by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Original file name
    pub filename: String,
    /// Declared MIME type
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Read an image from disk, guessing its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClientError::Validation(format!("Could not read {}: {}", path.display(), e))
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let content_type = match extension.as_deref() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        };
        Ok(Self {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string()),
            content_type: content_type.to_string(),
            bytes,
        })
    }
}

#[derive(Debug)]
struct PendingUpload {
    filename: String,
    bytes: Vec<u8>,
}

/// Validates, compresses and uploads images
#[derive(Debug)]
pub struct ImageManager {
    ctx: FeatureContext,
    http: reqwest::Client,
    pending: Mutex<Option<PendingUpload>>,
}

impl ImageManager {
    /// Create the manager
    pub fn new(ctx: FeatureContext) -> Self {
        Self {
            ctx,
            http: reqwest::Client::new(),
            pending: Mutex::new(None),
        }
    }

    /// Check MIME type and size against the configuration
    pub fn validate(&self, upload: &ImageUpload) -> Result<(), ClientError> {
        let config = &self.ctx.config.image;
        let allowed = config
            .allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&upload.content_type));
        if !allowed {
            return Err(ClientError::Validation(
                "Unsupported image format. Use JPEG or PNG".to_string(),
            ));
        }
        if upload.bytes.len() > config.max_size_bytes {
            return Err(ClientError::Validation(format!(
                "Image is too large. Maximum {} MB",
                config.max_size_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// Validate, compress and send an image
    pub async fn upload(&self, upload: ImageUpload) -> Result<(), ClientError> {
        self.validate(&upload).map_err(|e| self.fail(e))?;

        let config = self.ctx.config.image.clone();
        let original_size = upload.bytes.len();
        let source = upload.bytes;
        let compressed = tokio::task::spawn_blocking(move || compress(&source, &config))
            .await
            .map_err(|e| ClientError::Internal(e.into()))
            .and_then(|result| result)
            .map_err(|e| self.fail(e))?;
        info!(
            filename = %upload.filename,
            original_bytes = original_size,
            compressed_bytes = compressed.len(),
            "Image compressed"
        );

        match self.ctx.envelope() {
            MessageEnvelope::Wrapped => {
                let id = self.ctx.store.next_message_id();
                self.ctx.store.add_message(ChatMessage::new(
                    id,
                    Sender::User,
                    MessageKind::Image,
                    format!("Image: {}", upload.filename),
                ));
                let message = self.ctx.wrapped(PayloadType::Image, STANDARD.encode(&compressed));
                self.ctx.connection.send(message);
                self.ctx.store.update(|state| state.is_typing = true);
            }
            MessageEnvelope::Flat => {
                *self.pending_slot() = Some(PendingUpload {
                    filename: upload.filename.clone(),
                    bytes: compressed,
                });
                let (_, session_id) = self.ctx.identity();
                self.ctx.connection.send(ClientMessage::RequestPresignedUrl {
                    filename: upload.filename,
                    content_type: UPLOAD_CONTENT_TYPE.to_string(),
                    session_id,
                });
                self.ctx.store.update(|state| {
                    state.is_uploading = true;
                    state.upload_progress = 0;
                });
            }
        }
        Ok(())
    }

    /// PUT the pending image to a presigned URL, then announce it
    pub async fn complete_upload(&self, upload_url: &str, image_url: &str) -> Result<(), ClientError> {
        let pending = self.pending_slot().take();
        let Some(pending) = pending else {
            warn!("Presigned URL received without a pending upload");
            return Ok(());
        };
        debug!(filename = %pending.filename, bytes = pending.bytes.len(), "Uploading image");
        self.ctx.store.update(|state| state.upload_progress = 10);

        let result = self
            .http
            .put(upload_url)
            .header(CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
            .body(pending.bytes)
            .send()
            .await
            .map_err(|e| ClientError::Upload(e.to_string()))
            .and_then(|response| {
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(ClientError::Upload(format!("status {}", response.status())))
                }
            });

        self.ctx.store.update(|state| {
            state.is_uploading = false;
            state.upload_progress = if result.is_ok() { 100 } else { 0 };
        });
        if let Err(e) = result {
            warn!(error = %e, "Image upload failed");
            return Err(self.fail(e));
        }

        self.ctx.events.toast(Toast::success("Image uploaded"));
        let id = self.ctx.store.next_message_id();
        self.ctx.store.add_message(ChatMessage::new(
            id,
            Sender::User,
            MessageKind::Image,
            image_url,
        ));
        let (user_id, session_id) = self.ctx.identity();
        self.ctx.connection.send(ClientMessage::ImageMessage {
            image_url: image_url.to_string(),
            user_id,
            session_id,
        });
        self.ctx.store.update(|state| state.is_typing = true);
        Ok(())
    }

    /// An upload is waiting for its presigned URL
    pub fn has_pending(&self) -> bool {
        self.pending_slot().is_some()
    }

    fn pending_slot(&self) -> MutexGuard<'_, Option<PendingUpload>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, error: ClientError) -> ClientError {
        self.ctx.events.toast(error.to_toast());
        error
    }
}

fn compress(bytes: &[u8], config: &ImageConfig) -> Result<Vec<u8>, ClientError> {
    compress_image(
        bytes,
        config.max_width,
        config.max_height,
        config.compression_quality,
    )
}

/// Downscale to fit `max_width`×`max_height` (aspect ratio kept, never
/// upscaled) and re-encode as JPEG at `quality` (0.0..=1.0)
pub fn compress_image(
    bytes: &[u8],
    max_width: u32,
    max_height: u32,
    quality: f32,
) -> Result<Vec<u8>, ClientError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ClientError::Validation(format!("Could not decode image: {}", e)))?;

    let resized = if decoded.width() > max_width || decoded.height() > max_height {
        decoded.resize(max_width, max_height, FilterType::Triangle)
    } else {
        decoded
    };
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(|e| ClientError::Internal(e.into()))?;
    Ok(out)
}
