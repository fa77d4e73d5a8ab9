//! Client side of the meme generator: the upload form state and the HTTP calls it makes.
//!
//! [`MemeForm`] is a plain struct driven through setters. Every field update clears the
//! current error, picking a new image also drops the previous result, and the view
//! switches from the local preview to the generated meme once the server answers.

pub mod api;
pub mod probe;

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use time::OffsetDateTime;
use tracing::{debug, error, info};

pub use api::{ApiClient, DEFAULT_API_URL};

/// Matches the `maxLength` of the caption inputs.
pub const MAX_CAPTION_CHARS: usize = 100;

pub const MISSING_IMAGE_MESSAGE: &str = "Please select an image";
pub const MISSING_TEXT_MESSAGE: &str = "Please enter at least one text field";
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate meme. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("a generation request is already in flight")]
    Busy,

    #[error("server answered {status}: {detail}")]
    Generation { status: StatusCode, detail: String },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Text shown to the user; transport and server detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(msg) => msg.to_string(),
            ClientError::Busy => "Please wait for the current meme to finish".to_string(),
            ClientError::Generation { .. } | ClientError::Network(_) => {
                GENERATION_FAILED_MESSAGE.to_string()
            }
            ClientError::Io(e) => format!("Could not read or write the file: {}", e),
        }
    }
}

/// An image picked by the user, held fully in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub path: PathBuf,
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            path,
            name,
            mime_type,
            bytes,
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(path, bytes))
    }
}

/// What the page would show for the current state.
#[derive(Debug, PartialEq, Eq)]
pub enum View<'a> {
    Empty,
    Preview {
        source: &'a Path,
        top_text: &'a str,
        bottom_text: &'a str,
    },
    Generated(&'a [u8]),
}

#[derive(Debug, Default)]
pub struct MemeForm {
    image: Option<SelectedImage>,
    top_text: String,
    bottom_text: String,
    preview: Option<PathBuf>,
    generated: Option<Vec<u8>>,
    loading: bool,
    error: Option<String>,
}

/// Clears the loading flag however the request ends, including cancellation.
struct LoadingGuard<'a>(&'a mut bool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

impl MemeForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_image(&mut self, image: SelectedImage) {
        debug!(name = %image.name, mime_type = %image.mime_type, "image selected");
        self.preview = Some(image.path.clone());
        self.image = Some(image);
        self.generated = None;
        self.error = None;
    }

    pub fn set_top_text(&mut self, text: &str) {
        self.top_text = truncate_caption(text);
        self.error = None;
    }

    pub fn set_bottom_text(&mut self, text: &str) {
        self.bottom_text = truncate_caption(text);
        self.error = None;
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_ref()
    }

    pub fn top_text(&self) -> &str {
        &self.top_text
    }

    pub fn bottom_text(&self) -> &str {
        &self.bottom_text
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn generated(&self) -> Option<&[u8]> {
        self.generated.as_deref()
    }

    /// The submit control is only offered with an image, before a result, and while idle.
    pub fn can_submit(&self) -> bool {
        self.image.is_some() && self.generated.is_none() && !self.loading
    }

    pub fn view(&self) -> View<'_> {
        if let Some(jpeg) = &self.generated {
            View::Generated(jpeg)
        } else if let Some(source) = &self.preview {
            View::Preview {
                source,
                top_text: &self.top_text,
                bottom_text: &self.bottom_text,
            }
        } else {
            View::Empty
        }
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.image.is_none() {
            return Err(ClientError::Validation(MISSING_IMAGE_MESSAGE));
        }

        if self.top_text.is_empty() && self.bottom_text.is_empty() {
            return Err(ClientError::Validation(MISSING_TEXT_MESSAGE));
        }

        Ok(())
    }

    /// Send the form to the server and keep the returned JPEG.
    pub async fn submit(&mut self, api: &ApiClient) -> Result<(), ClientError> {
        if self.loading {
            return Err(ClientError::Busy);
        }

        if let Err(e) = self.validate() {
            self.error = Some(e.user_message());
            return Err(e);
        }

        self.error = None;
        self.loading = true;

        let result = {
            let _loading = LoadingGuard(&mut self.loading);
            match self.image.as_ref() {
                Some(image) => api.generate(image, &self.top_text, &self.bottom_text).await,
                None => Err(ClientError::Validation(MISSING_IMAGE_MESSAGE)),
            }
        };

        match result {
            Ok(jpeg) => {
                info!(bytes = jpeg.len(), "meme received");
                self.generated = Some(jpeg);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "meme generation failed");
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Drop everything, including the preview and the generated image.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Save the generated meme into `dir`. Returns `None` when there is nothing to save.
    pub async fn download(&self, dir: impl AsRef<Path>) -> Result<Option<PathBuf>, ClientError> {
        let Some(jpeg) = &self.generated else {
            return Ok(None);
        };

        let path = dir
            .as_ref()
            .join(download_file_name(OffsetDateTime::now_utc()));
        tokio::fs::write(&path, jpeg).await?;
        info!(path = %path.display(), "meme saved");
        Ok(Some(path))
    }
}

/// `meme-<unix millis>.jpg`
pub fn download_file_name(now: OffsetDateTime) -> String {
    format!("meme-{}.jpg", now.unix_timestamp_nanos() / 1_000_000)
}

fn truncate_caption(text: &str) -> String {
    text.chars().take(MAX_CAPTION_CHARS).collect()
}
