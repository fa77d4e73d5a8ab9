use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::metrics::{FAILURE_COUNTER, IMAGE_PROCESSING_TIME};
use crate::models::meme::MemeRequest;
use crate::services::compositor::{self, Compositor};
use crate::time_operation;
use crate::utils::error::{AppError, Result};

/// Upload policy plus the compositor. Holds no per-request state.
#[derive(Debug)]
pub struct MemeService {
    compositor: Compositor,
    allowed_types: Vec<String>,
    max_upload_bytes: usize,
    max_caption_chars: usize,
    generated_count: AtomicU64,
    /// Bounds compositions in flight, including ones whose request already timed out.
    render_slots: Arc<Semaphore>,
}

impl MemeService {
    pub fn new(config: &Config) -> Self {
        let fonts = compositor::load_fonts(config.render.fonts_dir.as_deref().map(Path::new));
        let compositor = Compositor::new(fonts, config.render.jpeg_quality)
            .with_max_pixels(config.render.max_pixels);
        Self::with_compositor(config, compositor)
    }

    pub fn with_compositor(config: &Config, compositor: Compositor) -> Self {
        Self {
            compositor,
            allowed_types: config
                .upload
                .allowed_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            max_upload_bytes: config.upload.max_bytes,
            max_caption_chars: config.upload.max_caption_chars,
            generated_count: AtomicU64::new(0),
            render_slots: Arc::new(Semaphore::new(config.render.max_concurrent)),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Reject an upload by declared type before reading its body.
    pub fn check_mime_type(&self, mime_type: &str) -> Result<()> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if self.allowed_types.iter().any(|t| *t == essence) {
            Ok(())
        } else {
            FAILURE_COUNTER.with_label_values(&["unsupported_type"]).inc();
            Err(AppError::UnsupportedMediaType(mime_type.to_string()))
        }
    }

    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_upload_bytes {
            FAILURE_COUNTER.with_label_values(&["too_large"]).inc();
            return Err(AppError::PayloadTooLarge {
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    pub fn check_captions(&self, top_text: &str, bottom_text: &str) -> Result<()> {
        if top_text.is_empty() && bottom_text.is_empty() {
            FAILURE_COUNTER.with_label_values(&["missing_caption"]).inc();
            return Err(AppError::MissingCaption);
        }

        let longest = top_text.chars().count().max(bottom_text.chars().count());
        if longest > self.max_caption_chars {
            FAILURE_COUNTER.with_label_values(&["caption_too_long"]).inc();
            return Err(AppError::CaptionTooLong {
                max: self.max_caption_chars,
            });
        }

        Ok(())
    }

    /// Validate the request and composite it on the blocking pool.
    pub async fn generate(&self, request: MemeRequest) -> Result<Vec<u8>> {
        self.check_mime_type(&request.image.mime_type)?;
        self.check_size(request.image.bytes.len())?;
        self.check_captions(&request.top_text, &request.bottom_text)?;

        let compositor = self.compositor.clone();
        let MemeRequest {
            image,
            top_text,
            bottom_text,
        } = request;
        let source_bytes = image.bytes.len();

        debug!(
            free_slots = self.render_slots.available_permits(),
            "waiting for a render slot"
        );
        let slot = Arc::clone(&self.render_slots)
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("render slots closed: {}", e)))?;

        // The slot moves into the blocking task so it is held until compositing ends.
        let result = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            time_operation!(
                &IMAGE_PROCESSING_TIME,
                compositor.compose(&image.bytes, &top_text, &bottom_text)
            )
        })
        .await
        .map_err(|e| AppError::Internal(format!("compositor task failed: {}", e)))?;

        match result {
            Ok(jpeg) => {
                let total = self.generated_count.fetch_add(1, Ordering::Relaxed) + 1;
                info!(
                    source_bytes,
                    output_bytes = jpeg.len(),
                    total_generated = total,
                    "meme generated"
                );
                Ok(jpeg)
            }
            Err(e) => {
                FAILURE_COUNTER.with_label_values(&["composition"]).inc();
                error!(error = %e, source_bytes, "error generating meme");
                Err(e.into())
            }
        }
    }

    pub fn get_generated_count(&self) -> u64 {
        self.generated_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::meme::Upload;
    use axum::body::Bytes;
    use std::io::Cursor;

    fn service() -> MemeService {
        let config = Config::default();
        let compositor = Compositor::new(compositor::load_fonts(None), 90);
        MemeService::with_compositor(&config, compositor)
    }

    fn request(bytes: Vec<u8>, mime_type: &str, top: &str, bottom: &str) -> MemeRequest {
        MemeRequest {
            image: Upload {
                bytes: Bytes::from(bytes),
                mime_type: mime_type.to_string(),
                filename: Some("cat.png".to_string()),
            },
            top_text: top.to_string(),
            bottom_text: bottom.to_string(),
        }
    }

    fn png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(120, 80, image::Rgb([200, 10, 10]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn mime_types_follow_allow_list() {
        let service = service();
        for ok in ["image/jpeg", "image/png", "image/jpg", "image/webp", "IMAGE/PNG"] {
            service.check_mime_type(ok).unwrap();
        }
        service.check_mime_type("image/png; charset=binary").unwrap();

        for bad in ["image/gif", "text/plain", "application/octet-stream", ""] {
            assert!(matches!(
                service.check_mime_type(bad),
                Err(AppError::UnsupportedMediaType(_))
            ));
        }
    }

    #[test]
    fn size_limit_is_inclusive() {
        let service = service();
        service.check_size(10 * 1024 * 1024).unwrap();
        assert!(matches!(
            service.check_size(10 * 1024 * 1024 + 1),
            Err(AppError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn captions_need_one_non_empty() {
        let service = service();
        assert!(matches!(
            service.check_captions("", ""),
            Err(AppError::MissingCaption)
        ));
        service.check_captions("top", "").unwrap();
        service.check_captions("", "bottom").unwrap();
        service.check_captions(" ", "").unwrap();

        let long = "é".repeat(100);
        service.check_captions(&long, "").unwrap();
        let too_long = "é".repeat(101);
        assert!(matches!(
            service.check_captions("", &too_long),
            Err(AppError::CaptionTooLong { max: 100 })
        ));
    }

    #[tokio::test]
    async fn generate_returns_jpeg_and_counts() {
        let service = service();
        let jpeg = service
            .generate(request(png(), "image/png", "top", "bottom"))
            .await
            .unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(service.get_generated_count(), 1);
    }

    #[tokio::test]
    async fn generate_reports_composition_failure() {
        let service = service();
        let err = service
            .generate(request(b"definitely not pixels".to_vec(), "image/jpeg", "a", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Composition(_)));
        assert_eq!(service.get_generated_count(), 0);
    }

    #[tokio::test]
    async fn oversized_header_fails_the_request_only() {
        let config = Config::default();
        let compositor = Compositor::new(compositor::load_fonts(None), 90).with_max_pixels(50 * 50);
        let service = MemeService::with_compositor(&config, compositor);

        let big = image::RgbImage::from_pixel(60, 60, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(big)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let err = service
            .generate(request(bytes, "image/png", "big", ""))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Composition(compositor::CompositionError::TooLarge { .. })
        ));

        // The slot was released and the service keeps working.
        service
            .generate(request(png(), "image/png", "next", ""))
            .await
            .unwrap();
        assert_eq!(service.get_generated_count(), 1);
    }

    #[tokio::test]
    async fn single_render_slot_queues_instead_of_failing() {
        let mut config = Config::default();
        config.render.max_concurrent = 1;
        let compositor = Compositor::new(compositor::load_fonts(None), 90);
        let service = MemeService::with_compositor(&config, compositor);

        let (a, b, c) = tokio::join!(
            service.generate(request(png(), "image/png", "one", "")),
            service.generate(request(png(), "image/png", "two", "")),
            service.generate(request(png(), "image/png", "", "three")),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        assert_eq!(service.get_generated_count(), 3);
    }
}
