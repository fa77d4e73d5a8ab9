//! Caption compositing: renders the top/bottom caption layer as SVG and burns it into the
//! uploaded image.

use std::{io::Cursor, path::Path, sync::Arc};

use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageError, ImageReader, Limits, RgbaImage};
use resvg::tiny_skia;
use tracing::{debug, warn};
use usvg::fontdb;

/// Layout size used when the source header cannot be read.
pub const FALLBACK_WIDTH: u32 = 800;
pub const FALLBACK_HEIGHT: u32 = 600;

/// Distance in pixels between a caption baseline and the nearest image edge.
const EDGE_MARGIN: i64 = 20;

const CAPTION_FONT_FAMILIES: &str = "Impact, 'Arial Black', sans-serif";

/// Largest source accepted by default, in pixels (roughly 8K by 5K).
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Decoders may hold a 16-bit RGBA frame before conversion.
const DECODE_BYTES_PER_PIXEL: u64 = 8;

#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to parse caption layer: {0}")]
    Markup(#[from] usvg::Error),

    #[error("source image is {width}x{height}, above the {max_pixels} pixel limit")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("cannot allocate a {width}x{height} caption canvas")]
    Canvas { width: u32, height: u32 },

    #[error("failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

/// Caption geometry derived from the source dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionLayout {
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
    pub stroke_width: u32,
    pub top_baseline: i64,
    pub bottom_baseline: i64,
}

impl CaptionLayout {
    pub fn for_size(width: u32, height: u32) -> Self {
        let font_size = width / 12;
        let stroke_width = font_size / 10;

        Self {
            width,
            height,
            font_size,
            stroke_width,
            top_baseline: i64::from(font_size) + EDGE_MARGIN,
            bottom_baseline: i64::from(height) - EDGE_MARGIN,
        }
    }

    pub fn center_x(&self) -> f64 {
        f64::from(self.width) / 2.0
    }
}

/// Escape the characters that are significant in XML markup.
pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Build the SVG caption layer. Captions are uppercased here since usvg ignores
/// `text-transform`.
pub fn caption_svg(layout: &CaptionLayout, top_text: &str, bottom_text: &str) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = layout.width,
        h = layout.height,
    );

    for (text, baseline) in [
        (top_text, layout.top_baseline),
        (bottom_text, layout.bottom_baseline),
    ] {
        if text.is_empty() {
            continue;
        }
        svg.push_str(&format!(
            concat!(
                r#"<text x="{x}" y="{y}" fill="white" stroke="black" stroke-width="{stroke}" "#,
                r#"stroke-linejoin="round" paint-order="stroke" font-size="{size}" "#,
                r#"font-weight="900" font-family="{family}" text-anchor="middle">{text}</text>"#,
            ),
            x = layout.center_x(),
            y = baseline,
            stroke = layout.stroke_width,
            size = layout.font_size,
            family = CAPTION_FONT_FAMILIES,
            text = escape_markup(&text.to_uppercase()),
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Read width and height from the encoded header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Fonts available to the caption layer.
pub fn load_fonts(extra_dir: Option<&Path>) -> Arc<fontdb::Database> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(dir) = extra_dir {
        db.load_fonts_dir(dir);
    }

    if db.is_empty() {
        warn!("no fonts found, captions will not be rendered");
    } else {
        debug!(faces = db.len(), "caption fonts loaded");
    }

    Arc::new(db)
}

/// Falls back to any installed face when none of the caption families exist.
fn caption_font_resolver() -> usvg::FontResolver<'static> {
    let preferred = usvg::FontResolver::default_font_selector();

    usvg::FontResolver {
        select_font: Box::new(move |font, fontdb| {
            if let Some(id) = preferred(font, fontdb) {
                return Some(id);
            }
            fontdb.faces().next().map(|face| face.id)
        }),
        select_fallback: usvg::FontResolver::default_fallback_selector(),
    }
}

#[derive(Clone)]
pub struct Compositor {
    fonts: Arc<fontdb::Database>,
    jpeg_quality: u8,
    max_pixels: u64,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("font_faces", &self.fonts.len())
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_pixels", &self.max_pixels)
            .finish()
    }
}

impl Compositor {
    pub fn new(fonts: Arc<fontdb::Database>, jpeg_quality: u8) -> Self {
        Self {
            fonts,
            jpeg_quality,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// Runs on the header dimensions, before any buffer of that size exists.
    fn check_pixels(&self, width: u32, height: u32) -> Result<(), CompositionError> {
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(CompositionError::TooLarge {
                width,
                height,
                max_pixels: self.max_pixels,
            });
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CompositionError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CompositionError::Decode(ImageError::IoError(e)))?;

        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_pixels.saturating_mul(DECODE_BYTES_PER_PIXEL));
        reader.limits(limits);

        reader.decode().map_err(CompositionError::Decode)
    }

    /// Burn the captions into `image` and return the result as JPEG.
    pub fn compose(
        &self,
        image: &[u8],
        top_text: &str,
        bottom_text: &str,
    ) -> Result<Vec<u8>, CompositionError> {
        let (width, height) = probe_dimensions(image).unwrap_or_else(|| {
            warn!("unreadable image header, using fallback layout size");
            (FALLBACK_WIDTH, FALLBACK_HEIGHT)
        });
        self.check_pixels(width, height)?;

        let mut base = self.decode(image)?.to_rgba8();
        let layout = CaptionLayout::for_size(width, height);
        debug!(
            width,
            height,
            font_size = layout.font_size,
            stroke_width = layout.stroke_width,
            "caption layout"
        );

        let overlay = self.render_captions(&layout, top_text, bottom_text)?;
        image::imageops::overlay(&mut base, &overlay, 0, 0);

        let flattened = DynamicImage::ImageRgba8(base).to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
            .encode_image(&flattened)
            .map_err(CompositionError::Encode)?;

        Ok(out)
    }

    fn render_captions(
        &self,
        layout: &CaptionLayout,
        top_text: &str,
        bottom_text: &str,
    ) -> Result<RgbaImage, CompositionError> {
        let canvas_err = || CompositionError::Canvas {
            width: layout.width,
            height: layout.height,
        };

        let svg = caption_svg(layout, top_text, bottom_text);
        let opts = usvg::Options {
            fontdb: Arc::clone(&self.fonts),
            font_resolver: caption_font_resolver(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&svg, &opts)?;

        let mut pixmap =
            tiny_skia::Pixmap::new(layout.width, layout.height).ok_or_else(canvas_err)?;
        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        // tiny-skia stores premultiplied alpha, image blends straight alpha.
        let mut rgba = Vec::with_capacity(pixmap.data().len());
        for px in pixmap.pixels() {
            let c = px.demultiply();
            rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }

        RgbaImage::from_raw(layout.width, layout.height, rgba).ok_or_else(canvas_err)
    }
}
