//! Avatar and logo uploads with an optimistic local preview.

use std::{fmt, io::Cursor, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use shared::domain::{EnvironmentId, UserId};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result, ValidationError},
    events::{EventHub, NoticeLevel},
    gateway::BackendGateway,
    lifetime::Lifetime,
};

pub const MAX_LOGO_BYTES: usize = 5 * 1024 * 1024;
const AVATAR_FILE_NAME: &str = "avatar.png";
const PNG: &str = "image/png";

#[derive(Clone, PartialEq, Eq)]
pub struct ImageResource {
    content_type: String,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageResource {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Inline reference usable as an `<img src>` in webview front-ends.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub field: &'static str,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedTypes {
    Only(&'static [&'static str]),
    AnyImage,
}

impl AcceptedTypes {
    fn accepts(self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        match self {
            Self::Only(allowed) => allowed.contains(&content_type.as_str()),
            Self::AnyImage => content_type.starts_with("image/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub subject: &'static str,
    pub field: &'static str,
    pub accepted: AcceptedTypes,
    pub type_message: &'static str,
    pub max_bytes: Option<usize>,
    /// Decode and re-encode as `avatar.png` before sending.
    pub reencode_png: bool,
    pub progress_message: Option<&'static str>,
    pub success_message: &'static str,
    pub failure_message: &'static str,
}

impl UploadPolicy {
    pub fn avatar() -> Self {
        Self {
            subject: "Avatar",
            field: "avatar",
            accepted: AcceptedTypes::Only(&[PNG, "image/jpeg"]),
            type_message: "Only .png and .jpeg files are allowed!",
            max_bytes: None,
            reencode_png: true,
            progress_message: Some("Updating avatar..."),
            success_message: "Avatar updated successfully",
            failure_message: "Failed to save avatar",
        }
    }

    pub fn logo() -> Self {
        Self {
            subject: "Logo",
            field: "logo",
            accepted: AcceptedTypes::AnyImage,
            type_message: "Logo must be an image",
            max_bytes: Some(MAX_LOGO_BYTES),
            reencode_png: false,
            progress_message: None,
            success_message: "Logo updated",
            failure_message: "Something went wrong",
        }
    }

    pub fn validate(&self, file: &ImageFile) -> Result<(), ValidationError> {
        if !self.accepted.accepts(&file.content_type) {
            return Err(ValidationError::UnsupportedType {
                content_type: file.content_type.clone(),
                message: self.type_message,
            });
        }
        if let Some(limit) = self.max_bytes {
            if file.bytes.len() > limit {
                return Err(ValidationError::TooLarge {
                    subject: self.subject,
                    size: file.bytes.len(),
                    limit,
                });
            }
        }
        Ok(())
    }

    pub fn prepare(&self, file: ImageFile) -> Result<ImageUpload, ValidationError> {
        self.validate(&file)?;
        if self.reencode_png {
            return Ok(ImageUpload {
                field: self.field,
                file_name: AVATAR_FILE_NAME.to_string(),
                content_type: PNG.to_string(),
                bytes: reencode_png(&file.bytes, self.subject)?,
            });
        }
        Ok(ImageUpload {
            field: self.field,
            file_name: file.file_name,
            content_type: file.content_type,
            bytes: file.bytes,
        })
    }
}

fn reencode_png(bytes: &[u8], subject: &'static str) -> Result<Vec<u8>, ValidationError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|_| ValidationError::UndecodableImage { subject })?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|_| ValidationError::UndecodableImage { subject })?;
    Ok(out.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Avatar(UserId),
    Logo(EnvironmentId),
}

/// What an image slot currently shows. `preview` wins over `canonical`;
/// when both are empty the default representation is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSlot {
    pub canonical: Option<ImageResource>,
    pub preview: Option<ImageResource>,
    pub uploading: bool,
}

impl ImageSlot {
    pub fn displayed(&self) -> Option<&ImageResource> {
        self.preview.as_ref().or(self.canonical.as_ref())
    }
}

pub struct ImageUploadController {
    target: ImageTarget,
    policy: UploadPolicy,
    gateway: Arc<dyn BackendGateway>,
    events: EventHub,
    lifetime: Lifetime,
    slot: watch::Sender<ImageSlot>,
    uploads: Mutex<()>,
}

impl ImageUploadController {
    pub fn new(
        target: ImageTarget,
        policy: UploadPolicy,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Self {
        let (slot, _) = watch::channel(ImageSlot::default());
        Self {
            target,
            policy,
            gateway,
            events,
            lifetime,
            slot,
            uploads: Mutex::new(()),
        }
    }

    pub fn avatar(
        user_id: UserId,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Self {
        Self::new(
            ImageTarget::Avatar(user_id),
            UploadPolicy::avatar(),
            gateway,
            events,
            lifetime,
        )
    }

    pub fn logo(
        environment_id: EnvironmentId,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Self {
        Self::new(
            ImageTarget::Logo(environment_id),
            UploadPolicy::logo(),
            gateway,
            events,
            lifetime,
        )
    }

    pub fn target(&self) -> ImageTarget {
        self.target
    }

    pub fn slot(&self) -> ImageSlot {
        self.slot.borrow().clone()
    }

    pub fn displayed(&self) -> Option<ImageResource> {
        self.slot.borrow().displayed().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<ImageSlot> {
        self.slot.subscribe()
    }

    pub async fn load(&self) -> Result<Option<ImageResource>> {
        let fetched = match self.target {
            ImageTarget::Avatar(user_id) => self.lifetime.run(self.gateway.fetch_avatar(user_id)).await,
            ImageTarget::Logo(environment_id) => {
                self.lifetime
                    .run(self.gateway.fetch_logo(environment_id))
                    .await
            }
        };
        let image = fetched.ok_or(ClientError::Cancelled)??;
        debug!(target = ?self.target, present = image.is_some(), "upload: loaded image");
        self.slot.send_modify(|slot| slot.canonical = image.clone());
        Ok(image)
    }

    /// Validates `file`, shows it immediately, then uploads it. The preview
    /// becomes canonical on success and is discarded on failure.
    pub async fn upload(&self, file: ImageFile) -> Result<ImageResource> {
        let upload = match self.policy.prepare(file) {
            Ok(upload) => upload,
            Err(err) => {
                debug!(target = ?self.target, %err, "upload: rejected locally");
                self.events.error(err.to_string());
                return Err(err.into());
            }
        };

        let _serialized = self.uploads.lock().await;
        if self.lifetime.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let preview = ImageResource::new(upload.content_type.clone(), upload.bytes.clone());
        self.slot.send_modify(|slot| {
            slot.preview = Some(preview.clone());
            slot.uploading = true;
        });
        let notice = self.policy.progress_message.map(|m| self.events.loading(m));

        let sent = match self.target {
            ImageTarget::Avatar(_) => self.lifetime.run(self.gateway.upload_avatar(upload)).await,
            ImageTarget::Logo(environment_id) => {
                self.lifetime
                    .run(self.gateway.upload_logo(environment_id, upload))
                    .await
            }
        };

        match sent {
            Some(Ok(())) => {
                self.slot.send_modify(|slot| {
                    slot.canonical = slot.preview.take();
                    slot.uploading = false;
                });
                info!(target = ?self.target, bytes = preview.len(), "upload: committed");
                self.events
                    .resolve(notice, NoticeLevel::Success, self.policy.success_message);
                Ok(preview)
            }
            Some(Err(err)) => {
                self.discard_preview();
                warn!(target = ?self.target, %err, "upload: rolled back preview");
                self.events
                    .surface(notice, &err, self.policy.failure_message);
                Err(err)
            }
            None => {
                self.discard_preview();
                if let Some(id) = notice {
                    self.events.dismiss(id);
                }
                Err(ClientError::Cancelled)
            }
        }
    }

    fn discard_preview(&self) {
        self.slot.send_modify(|slot| {
            slot.preview = None;
            slot.uploading = false;
        });
    }

    pub fn dispose(&self) {
        self.lifetime.cancel();
        self.discard_preview();
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
