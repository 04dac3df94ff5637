use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::core::errors::{RenderError, RenderResult};

/// Pixel rectangle, `x1`/`y1` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    /// Clamp a signed rectangle to a `width`x`height` canvas; `None` when nothing is left
    pub fn clamped(x0: i64, y0: i64, x1: i64, y1: i64, width: u32, height: u32) -> Option<Self> {
        let x0 = x0.clamp(0, width as i64) as u32;
        let y0 = y0.clamp(0, height as i64) as u32;
        let x1 = x1.clamp(0, width as i64) as u32;
        let y1 = y1.clamp(0, height as i64) as u32;
        (x1 > x0 && y1 > y0).then_some(Self { x0, y0, x1, y1 })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 as i32 && x < self.x1 as i32 && y >= self.y0 as i32 && y < self.y1 as i32
    }
}

/// Decode any supported container into a pixel surface
pub fn decode_image(bytes: &[u8]) -> RenderResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(RenderError::Decode)
}

/// Paint an opaque rectangle
pub fn fill_rect(img: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            img.put_pixel(x, y, color);
        }
    }
}

/// Encode as JPEG (alpha dropped), returning the full buffer from offset 0
pub fn encode_jpeg(img: &RgbaImage, quality: u8) -> RenderResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
    let mut jpeg_bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, quality);
    rgb.write_with_encoder(encoder)
        .map_err(RenderError::Encode)?;
    Ok(jpeg_bytes)
}

/// Decode a source image on the blocking pool, reporting its dimensions
pub async fn image_dimensions_async(bytes: Vec<u8>) -> RenderResult<(u32, u32)> {
    tokio::task::spawn_blocking(move || {
        let img = decode_image(&bytes)?;
        Ok((img.width(), img.height()))
    })
    .await
    .map_err(|e| RenderError::TaskJoin(e.to_string()))?
}
