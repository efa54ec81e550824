use image::Rgba;

use crate::canvas::CanvasError;
use crate::loader::LoadedImage;

/// Axis-aligned rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// The drawing primitives the template renderer needs.
///
/// [`crate::canvas::RasterCanvas`] turns these into pixels; [`RecordingSurface`]
/// keeps them as a log so tests can assert on what was drawn.
pub trait Surface {
    fn size(&self) -> (u32, u32);

    fn clear(&mut self, color: Rgba<u8>);

    fn fill_rounded_rect(&mut self, rect: Rect, radius: f32, color: Rgba<u8>);

    fn stroke_dashed_rounded_rect(
        &mut self,
        rect: Rect,
        radius: f32,
        line_width: f32,
        dash: f32,
        color: Rgba<u8>,
    );

    /// Draws `src` (source pixels) of `image` scaled into `dst`, clipped to a
    /// rounded rectangle with the given corner radius.
    fn draw_image_clipped(
        &mut self,
        image: &LoadedImage,
        src: Rect,
        dst: Rect,
        radius: f32,
    ) -> Result<(), CanvasError>;

    /// `y` is the text baseline.
    fn draw_text(
        &mut self,
        text: &str,
        x: f32,
        y: f32,
        size: f32,
        align: TextAlign,
        color: Rgba<u8>,
    );
}

/// One primitive as seen by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rgba<u8>),
    FillRoundedRect {
        rect: Rect,
        radius: f32,
        color: Rgba<u8>,
    },
    StrokeDashed {
        rect: Rect,
        radius: f32,
        line_width: f32,
        dash: f32,
        color: Rgba<u8>,
    },
    Image {
        source: String,
        src: Rect,
        dst: Rect,
        radius: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
        align: TextAlign,
        color: Rgba<u8>,
    },
}

/// Surface that records primitives instead of rasterizing them.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
    /// Image sources whose draws should fail, for exercising degrade paths.
    failing_sources: Vec<String>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
            failing_sources: Vec::new(),
        }
    }

    pub fn fail_draws_from(mut self, source: impl Into<String>) -> Self {
        self.failing_sources.push(source.into());
        self
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn images(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Image { .. }))
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba<u8>) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear(color));
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radius: f32, color: Rgba<u8>) {
        self.ops.push(DrawOp::FillRoundedRect { rect, radius, color });
    }

    fn stroke_dashed_rounded_rect(
        &mut self,
        rect: Rect,
        radius: f32,
        line_width: f32,
        dash: f32,
        color: Rgba<u8>,
    ) {
        self.ops.push(DrawOp::StrokeDashed {
            rect,
            radius,
            line_width,
            dash,
            color,
        });
    }

    fn draw_image_clipped(
        &mut self,
        image: &LoadedImage,
        src: Rect,
        dst: Rect,
        radius: f32,
    ) -> Result<(), CanvasError> {
        if self.failing_sources.iter().any(|s| *s == image.url) {
            return Err(CanvasError::Draw(format!("refused to draw {}", image.url)));
        }

        if src.is_empty() || dst.is_empty() {
            return Err(CanvasError::EmptySource);
        }

        self.ops.push(DrawOp::Image {
            source: image.url.clone(),
            src,
            dst,
            radius,
        });

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
        self.ops.push(DrawOp::Text {
            text: text.to_owned(),
            x,
            y,
            size,
            align,
            color,
        });
    }
}
