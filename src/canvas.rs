use std::ops::Range;

use base64::Engine;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rusttype::{point, Scale};
use thiserror::Error;

use crate::fonts::SharedFont;
use crate::loader::LoadedImage;
use crate::surface::{Rect, Surface, TextAlign};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    /// The canvas holds pixels from an image without a cross-origin grant.
    #[error("canvas is tainted by a cross-origin image")]
    Tainted,
    #[error("nothing to draw from an empty source rectangle")]
    EmptySource,
    #[error("draw failed: {0}")]
    Draw(String),
    #[error("failed to encode PNG: {0}")]
    Encode(String),
}

/// A pixel canvas implementing [`Surface`].
pub struct RasterCanvas {
    pixels: RgbaImage,
    font: Option<SharedFont>,
    filter: FilterType,
    tainted: bool,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            font: None,
            filter: FilterType::Triangle,
            tainted: false,
        }
    }

    pub fn with_font(mut self, font: Option<SharedFont>) -> Self {
        self.font = font;
        self
    }

    /// Resampling filter for image draws.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn to_png(&self) -> Result<Vec<u8>, CanvasError> {
        if self.tainted {
            return Err(CanvasError::Tainted);
        }

        let encode_error = |err: png::EncodingError| CanvasError::Encode(err.to_string());
        let mut out = Vec::new();

        let mut encoder = png::Encoder::new(&mut out, self.pixels.width(), self.pixels.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header().map_err(encode_error)?;
        writer
            .write_image_data(self.pixels.as_raw())
            .map_err(encode_error)?;
        writer.finish().map_err(encode_error)?;

        Ok(out)
    }

    pub fn to_data_url(&self) -> Result<String, CanvasError> {
        let png = self.to_png()?;

        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }

    fn span(&self, rect: Rect, pad: f32) -> (Range<u32>, Range<u32>) {
        let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
        let (w, h) = self.pixels.dimensions();

        (
            clamp((rect.x - pad).floor(), w)..clamp((rect.right() + pad).ceil(), w),
            clamp((rect.y - pad).floor(), h)..clamp((rect.bottom() + pad).ceil(), h),
        )
    }
}

/// Signed distance from a point to a rounded rectangle; negative inside.
fn rounded_rect_distance(x: f32, y: f32, rect: Rect, radius: f32) -> f32 {
    let radius = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    let (cx, cy) = rect.center();

    let qx = (x - cx).abs() - (rect.width / 2.0 - radius);
    let qy = (y - cy).abs() - (rect.height / 2.0 - radius);

    qx.max(0.0).hypot(qy.max(0.0)) + qx.max(qy).min(0.0) - radius
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f32) {
    let alpha = src[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);

    if alpha <= 0.0 {
        return;
    }

    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);

    for idx in 0..3 {
        let value = (src[idx] as f32 * alpha + dst[idx] as f32 * dst_alpha * (1.0 - alpha)) / out_alpha;
        dst[idx] = value.round().clamp(0.0, 255.0) as u8;
    }

    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

impl Surface for RasterCanvas {
    fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color;
        }
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radius: f32, color: Rgba<u8>) {
        let (xs, ys) = self.span(rect, 1.0);

        for y in ys {
            for x in xs.clone() {
                let d = rounded_rect_distance(x as f32 + 0.5, y as f32 + 0.5, rect, radius);
                blend(self.pixels.get_pixel_mut(x, y), color, 0.5 - d);
            }
        }
    }

    fn stroke_dashed_rounded_rect(
        &mut self,
        rect: Rect,
        radius: f32,
        line_width: f32,
        dash: f32,
        color: Rgba<u8>,
    ) {
        let (xs, ys) = self.span(rect, 1.0);
        let (cx, cy) = rect.center();

        for y in ys {
            for x in xs.clone() {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let d = rounded_rect_distance(px, py, rect, radius);

                // Stroke sits just inside the edge.
                let coverage = (0.5 - d).min(d + line_width + 0.5);
                if coverage <= 0.0 {
                    continue;
                }

                if dash > 0.0 {
                    let on_horizontal_edge =
                        (py - cy).abs() - rect.height / 2.0 > (px - cx).abs() - rect.width / 2.0;
                    let along = if on_horizontal_edge { px - rect.x } else { py - rect.y };

                    if ((along / dash).floor() as i64).rem_euclid(2) == 1 {
                        continue;
                    }
                }

                blend(self.pixels.get_pixel_mut(x, y), color, coverage);
            }
        }
    }

    fn draw_image_clipped(
        &mut self,
        image: &LoadedImage,
        src: Rect,
        dst: Rect,
        radius: f32,
    ) -> Result<(), CanvasError> {
        let (iw, ih) = image.dimensions();

        if src.is_empty() || dst.is_empty() {
            return Err(CanvasError::EmptySource);
        }

        let sx = src.x.max(0.0).floor() as u32;
        let sy = src.y.max(0.0).floor() as u32;

        if sx >= iw || sy >= ih {
            return Err(CanvasError::EmptySource);
        }

        let sw = (src.width.round() as u32).clamp(1, iw - sx);
        let sh = (src.height.round() as u32).clamp(1, ih - sy);
        let dw = dst.width.round().max(1.0) as u32;
        let dh = dst.height.round().max(1.0) as u32;

        let cropped = imageops::crop_imm(&*image.image, sx, sy, sw, sh).to_image();
        let scaled = imageops::resize(&cropped, dw, dh, self.filter);

        let (ox, oy) = (dst.x.round() as i64, dst.y.round() as i64);
        let clip = Rect::new(ox as f32, oy as f32, dw as f32, dh as f32);
        let (width, height) = (self.pixels.width() as i64, self.pixels.height() as i64);

        for (x, y, pixel) in scaled.enumerate_pixels() {
            let (px, py) = (ox + x as i64, oy + y as i64);

            if px < 0 || py < 0 || px >= width || py >= height {
                continue;
            }

            let d = rounded_rect_distance(px as f32 + 0.5, py as f32 + 0.5, clip, radius);
            blend(self.pixels.get_pixel_mut(px as u32, py as u32), *pixel, 0.5 - d);
        }

        if image.tainted {
            self.tainted = true;
        }

        Ok(())
    }

    fn draw_text(
        &mut self,
        text: &str,
        x: f32,
        y: f32,
        size: f32,
        align: TextAlign,
        color: Rgba<u8>,
    ) {
        let Some(font) = self.font.clone() else {
            log::trace!("No font loaded; skipping text {text:?}");
            return;
        };

        let scale = Scale::uniform(size);

        let width = font
            .layout(text, scale, point(0.0, 0.0))
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .fold(0.0_f32, f32::max);

        let start = match align {
            TextAlign::Left => x,
            TextAlign::Center => x - width / 2.0,
            TextAlign::Right => x - width,
        };

        let (w, h) = (self.pixels.width() as i32, self.pixels.height() as i32);

        for glyph in font.layout(text, scale, point(start, y)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };

            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;

                if px < 0 || py < 0 || px >= w || py >= h {
                    return;
                }

                blend(self.pixels.get_pixel_mut(px as u32, py as u32), color, coverage);
            });
        }
    }
}
