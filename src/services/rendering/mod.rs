use cosmic_text::{
    fontdb, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::RenderingConfig;
use crate::core::errors::{RenderError, RenderResult};
use crate::core::types::{BoundingBox, TranslatedRegion};
use crate::utils::image_ops::{decode_image, encode_jpeg, fill_rect, PixelRect};

const BOX_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MIN_FONT_SIZE: f32 = 8.0;
const MIN_DERIVED_FONT_SIZE: f32 = 10.0;
const MAX_DERIVED_FONT_SIZE: f32 = 64.0;
const LINE_HEIGHT_RATIO: f32 = 1.2;

/// Font used for translated text
#[derive(Debug, Clone, PartialEq, Eq)]
enum FontChoice {
    /// Family loaded from the preferred font file
    Named(String),
    /// Host monospace / default font
    Monospace,
    /// No font available at all: boxes are painted, text is not
    Unavailable,
}

/// Paints translated text over detected regions
///
/// Cheap to clone; the font system is shared behind a lock.
#[derive(Clone)]
pub struct OverlayRenderer {
    font_system: Arc<Mutex<FontSystem>>,
    swash_cache: Arc<Mutex<SwashCache>>,
    font: FontChoice,
    config: RenderingConfig,
}

impl OverlayRenderer {
    pub fn new(config: &RenderingConfig) -> Self {
        let mut db = fontdb::Database::new();
        let mut font = FontChoice::Unavailable;

        if let Some(path) = config.font_path.as_deref() {
            if let Some(family) = load_font_file(&mut db, path) {
                info!("✓ Font: {} from {}", family, path.display());
                font = FontChoice::Named(family);
            } else {
                info!("⚠ Font not found: {}, falling back to monospace", path.display());
            }
        }

        if font == FontChoice::Unavailable && config.system_fonts {
            db.load_system_fonts();
            if db.is_empty() {
                warn!("No system fonts found; translated text will not be drawn");
            } else {
                debug!("Loaded {} system font faces", db.len());
                font = FontChoice::Monospace;
            }
        }

        if font == FontChoice::Unavailable {
            warn!("Overlay renderer has no font: only boxes will be painted");
        }

        let font_system = FontSystem::new_with_locale_and_db("en-US".to_string(), db);

        Self {
            font_system: Arc::new(Mutex::new(font_system)),
            swash_cache: Arc::new(Mutex::new(SwashCache::new())),
            font,
            config: config.clone(),
        }
    }

    /// Whether translated text can be drawn (otherwise only boxes are painted)
    pub fn has_font(&self) -> bool {
        self.font != FontChoice::Unavailable
    }

    /// Render on the blocking pool
    pub async fn render(
        &self,
        image_bytes: Arc<Vec<u8>>,
        regions: Vec<TranslatedRegion>,
    ) -> RenderResult<Vec<u8>> {
        let renderer = self.clone();
        tokio::task::spawn_blocking(move || renderer.render_sync(&image_bytes, &regions))
            .await
            .map_err(|e| RenderError::TaskJoin(e.to_string()))?
    }

    /// Decode, paint every region in order on one surface, encode once as JPEG
    pub fn render_sync(&self, image_bytes: &[u8], regions: &[TranslatedRegion]) -> RenderResult<Vec<u8>> {
        let mut canvas = decode_image(image_bytes)?.to_rgba8();
        let (width, height) = canvas.dimensions();

        for translated in regions {
            let Some(rect) = self.overlay_rect(&translated.region.bounding_box, width, height) else {
                debug!("Region '{}' lies outside the image, skipped", translated.region.text);
                continue;
            };

            fill_rect(&mut canvas, rect, BOX_FILL);
            let origin = text_origin(&translated.region.bounding_box, rect);
            self.draw_text(&mut canvas, &translated.translated_text, rect, origin);
        }

        encode_jpeg(&canvas, self.config.jpeg_quality)
    }

    /// Rectangle painted over a region: the box enclosing all vertices, or a
    /// fixed-size box from the top-left when no bottom-right vertex exists,
    /// expanded by the margin and clamped to the canvas. A region without
    /// vertices has no location and gets no rectangle.
    pub fn overlay_rect(&self, bbox: &BoundingBox, width: u32, height: u32) -> Option<PixelRect> {
        if bbox.vertices.is_empty() {
            return None;
        }

        let (x0, y0, x1, y1) = match bbox.extent() {
            Some((min, max)) => (min.x as i64, min.y as i64, max.x as i64, max.y as i64),
            None => {
                let tl = bbox.top_left();
                (
                    tl.x as i64,
                    tl.y as i64,
                    tl.x as i64 + self.config.fallback_box_width as i64,
                    tl.y as i64 + self.config.fallback_box_height as i64,
                )
            }
        };

        let margin = self.config.box_margin as i64;
        PixelRect::clamped(x0 - margin, y0 - margin, x1 + margin, y1 + margin, width, height)
    }

    fn family(&self) -> Family<'_> {
        match &self.font {
            FontChoice::Named(name) => Family::Name(name.as_str()),
            _ => Family::Monospace,
        }
    }

    /// Shape `text` on a single line at `font_size`, returning the buffer and its width
    fn shape(&self, font_system: &mut FontSystem, text: &str, font_size: f32) -> (Buffer, f32) {
        let metrics = Metrics::new(font_size, font_size * LINE_HEIGHT_RATIO);
        let mut buffer = Buffer::new(font_system, metrics);
        buffer.set_size(font_system, None, None);

        let attrs = Attrs::new().family(self.family());
        buffer.set_text(font_system, text, &attrs, Shaping::Advanced);
        buffer.shape_until_scroll(font_system, false);

        let line_width = buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0f32, f32::max);
        (buffer, line_width)
    }

    /// Font size from the config, or from the box height, shrunk to fit the
    /// width left between `origin_x` and the right edge of the box
    fn fit_font_size(
        &self,
        font_system: &mut FontSystem,
        text: &str,
        rect: PixelRect,
        origin_x: i32,
    ) -> (Buffer, f32) {
        let base = self.config.font_size.unwrap_or_else(|| {
            (rect.height() as f32 * 0.75).clamp(MIN_DERIVED_FONT_SIZE, MAX_DERIVED_FONT_SIZE)
        });

        let (buffer, line_width) = self.shape(font_system, text, base);
        let available = (rect.x1 as i32 - origin_x).max(1) as f32;
        if line_width <= available || line_width <= 0.0 {
            return (buffer, base);
        }

        let shrunk = (base * available / line_width).max(MIN_FONT_SIZE);
        debug!("Shrinking '{}' from {:.1}px to {:.1}px to fit {}px", text, base, shrunk, available);
        let (buffer, _) = self.shape(font_system, text, shrunk);
        (buffer, shrunk)
    }

    /// Draw text starting at `origin`, clipped to the rectangle
    fn draw_text(&self, img: &mut RgbaImage, text: &str, rect: PixelRect, origin: (i32, i32)) {
        if !self.has_font() || text.trim().is_empty() {
            return;
        }

        let mut font_system = self.font_system.lock();
        let mut swash_cache = self.swash_cache.lock();

        let (origin_x, origin_y) = origin;
        let (buffer, _font_size) = self.fit_font_size(&mut font_system, text, rect, origin_x);
        let color = CosmicColor::rgba(TEXT_COLOR[0], TEXT_COLOR[1], TEXT_COLOR[2], TEXT_COLOR[3]);

        buffer.draw(&mut font_system, &mut swash_cache, color, |px_x, px_y, w, h, pixel_color| {
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let img_x = origin_x + px_x + dx;
                    let img_y = origin_y + px_y + dy;
                    if !rect.contains(img_x, img_y) {
                        continue;
                    }

                    let existing = img.get_pixel(img_x as u32, img_y as u32);

                    // Alpha blend
                    let alpha = pixel_color.a() as f32 / 255.0;
                    let inv_alpha = 1.0 - alpha;

                    let blended = Rgba([
                        ((pixel_color.r() as f32 * alpha) + (existing[0] as f32 * inv_alpha)) as u8,
                        ((pixel_color.g() as f32 * alpha) + (existing[1] as f32 * inv_alpha)) as u8,
                        ((pixel_color.b() as f32 * alpha) + (existing[2] as f32 * inv_alpha)) as u8,
                        existing[3].max(pixel_color.a()),
                    ]);

                    img.put_pixel(img_x as u32, img_y as u32, blended);
                }
            }
        });
    }
}

/// Top-left corner of the detected box, kept inside the painted rectangle
fn text_origin(bbox: &BoundingBox, rect: PixelRect) -> (i32, i32) {
    let corner = bbox.extent().map(|(min, _)| min).unwrap_or_else(|| bbox.top_left());
    (
        corner.x.clamp(rect.x0 as i32, rect.x1 as i32 - 1),
        corner.y.clamp(rect.y0 as i32, rect.y1 as i32 - 1),
    )
}

/// Load a font file into the database, returning its family name
fn load_font_file(db: &mut fontdb::Database, path: &Path) -> Option<String> {
    let data = std::fs::read(path).ok()?;
    let before = db.len();
    db.load_font_data(data);
    if db.len() == before {
        return None;
    }
    db.faces()
        .last()
        .and_then(|face| face.families.first())
        .map(|(name, _)| name.clone())
}
