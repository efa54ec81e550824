//! Normalized crop rectangles.
//!
//! A [`CropRect`] lives in `0..=1` space relative to the source image's natural
//! size. Aspect ratios passed in here are expressed in that same space; use
//! [`crop_aspect`] to turn a destination cell's pixel aspect into one.

use crate::surface::Rect;

/// Smallest allowed crop extent on either axis.
pub const MIN_CROP: f64 = 0.05;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropRect {
    fn default() -> Self {
        Self::full()
    }
}

/// Normalized aspect ratio a crop needs so that, once mapped onto a source
/// of `src_w × src_h` pixels, it has the same shape as the destination.
pub fn crop_aspect(dst_w: f64, dst_h: f64, src_w: f64, src_h: f64) -> f64 {
    if dst_h <= 0.0 || src_w <= 0.0 {
        return 1.0;
    }

    (dst_w / dst_h) * (src_h / src_w)
}

fn clamp_aspect(aspect: f64) -> f64 {
    if !aspect.is_finite() || aspect <= 0.0 {
        return 1.0;
    }

    aspect.clamp(MIN_CROP, 1.0 / MIN_CROP)
}

impl CropRect {
    pub const fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Largest centered rectangle with the given (normalized) aspect ratio.
    pub fn centered(aspect: f64) -> Self {
        let aspect = clamp_aspect(aspect);

        let (width, height) = if aspect >= 1.0 {
            (1.0, 1.0 / aspect)
        } else {
            (aspect, 1.0)
        };

        Self {
            x: (1.0 - width) / 2.0,
            y: (1.0 - height) / 2.0,
            width,
            height,
        }
    }

    /// Default crop of a `src_w × src_h` image shown in a `dst_w × dst_h` cell.
    pub fn default_for(src_w: u32, src_h: u32, dst_w: f32, dst_h: f32) -> Self {
        Self::centered(crop_aspect(
            dst_w as f64,
            dst_h as f64,
            src_w as f64,
            src_h as f64,
        ))
    }

    /// Translates by a normalized delta. Each axis is clamped on its own, so
    /// a gesture that overshoots one edge still moves along the other axis.
    pub fn dragged(self, dx: f64, dy: f64) -> Self {
        let mut next = self.clamped();

        if dx.is_finite() {
            next.x = (next.x + dx).clamp(0.0, 1.0 - next.width);
        }

        if dy.is_finite() {
            next.y = (next.y + dy).clamp(0.0, 1.0 - next.height);
        }

        next
    }

    /// Scales the extents around the current center. A `factor` above one
    /// zooms in (smaller crop). The result keeps `aspect`.
    pub fn zoomed(self, factor: f64, aspect: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return self.clamped();
        }

        let aspect = clamp_aspect(aspect);
        let (cx, cy) = (self.x + self.width / 2.0, self.y + self.height / 2.0);

        let mut width = (self.width / factor).clamp(MIN_CROP, 1.0);
        let mut height = width / aspect;

        if height > 1.0 {
            height = 1.0;
            width = aspect;
        } else if height < MIN_CROP {
            height = MIN_CROP;
            width = (height * aspect).min(1.0);
        }

        if width > 1.0 {
            width = 1.0;
            height = 1.0 / aspect;
        }

        Self {
            x: (cx - width / 2.0).clamp(0.0, 1.0 - width),
            y: (cy - height / 2.0).clamp(0.0, 1.0 - height),
            width,
            height,
        }
    }

    /// Returns the nearest rectangle that satisfies the crop invariants.
    pub fn clamped(self) -> Self {
        let sanitize = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };

        let width = sanitize(self.width, 1.0).clamp(MIN_CROP, 1.0);
        let height = sanitize(self.height, 1.0).clamp(MIN_CROP, 1.0);

        Self {
            x: sanitize(self.x, 0.0).clamp(0.0, 1.0 - width),
            y: sanitize(self.y, 0.0).clamp(0.0, 1.0 - height),
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width >= MIN_CROP - EPSILON
            && self.height >= MIN_CROP - EPSILON
            && self.x + self.width <= 1.0 + EPSILON
            && self.y + self.height <= 1.0 + EPSILON
    }

    /// Pixel rectangle of a `src_w × src_h` source selected by this crop.
    pub fn to_source_rect(&self, src_w: u32, src_h: u32) -> Rect {
        let crop = self.clamped();
        let (w, h) = (src_w as f64, src_h as f64);

        Rect::new(
            (crop.x * w) as f32,
            (crop.y * h) as f32,
            (crop.width * w) as f32,
            (crop.height * h) as f32,
        )
    }
}

/// Cover-fits `src` into `dst`: scale is `max(dst.w / src.w, dst.h / src.h)`
/// and the overflow is trimmed evenly from both sides. Returns the part of
/// `src` that ends up visible, which maps exactly onto `dst`.
pub fn cover_fit(src: Rect, dst: Rect) -> Rect {
    if src.is_empty() || dst.is_empty() {
        return src;
    }

    let scale = (dst.width / src.width).max(dst.height / src.height);
    let visible_w = dst.width / scale;
    let visible_h = dst.height / scale;

    Rect::new(
        src.x + (src.width - visible_w) / 2.0,
        src.y + (src.height - visible_h) / 2.0,
        visible_w,
        visible_h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: [(u32, u32); 5] = [(1000, 1000), (4000, 3000), (600, 1800), (1, 1), (8192, 17)];

    #[test]
    fn default_crop_matches_aspect() {
        for (w, h) in SOURCES {
            for (cell_w, cell_h) in [(350.0, 350.0), (520.0, 390.0), (300.0, 400.0)] {
                let aspect = crop_aspect(cell_w, cell_h, w as f64, h as f64);
                let crop = CropRect::centered(aspect);
                let expected = clamp_aspect(aspect);

                assert!(
                    (crop.width / crop.height - expected).abs() < 1e-6,
                    "{w}x{h} into {cell_w}x{cell_h}"
                );
                assert!(crop.is_valid());
            }
        }
    }

    #[test]
    fn default_crop_is_maximal_and_centered() {
        let crop = CropRect::centered(2.0);
        assert_eq!(crop.width, 1.0);
        assert_eq!(crop.height, 0.5);
        assert_eq!(crop.y, 0.25);

        let crop = CropRect::centered(0.5);
        assert_eq!(crop.height, 1.0);
        assert_eq!(crop.x, 0.25);
    }

    #[test]
    fn drag_never_escapes_bounds() {
        let deltas = [-3.0, -1.0, -0.3, -0.01, 0.0, 0.02, 0.4, 1.0, 7.5];

        for start in [CropRect::centered(1.0), CropRect::centered(0.3), CropRect::centered(3.0)] {
            for dx in deltas {
                for dy in deltas {
                    let crop = start.dragged(dx, dy);
                    assert!(crop.x >= 0.0 && crop.y >= 0.0);
                    assert!(crop.x + crop.width <= 1.0 + 1e-9);
                    assert!(crop.y + crop.height <= 1.0 + 1e-9);
                }
            }
        }
    }

    #[test]
    fn drag_clamps_only_the_offending_axis() {
        let start = CropRect {
            x: 0.25,
            y: 0.25,
            width: 0.5,
            height: 0.5,
        };

        let crop = start.dragged(10.0, -0.1);
        assert_eq!(crop.x, 0.5);
        assert!((crop.y - 0.15).abs() < 1e-9);
    }

    #[test]
    fn zoom_keeps_aspect_and_bounds() {
        let crop = CropRect::centered(1.5);

        let zoomed_in = crop.zoomed(2.0, 1.5);
        assert!((zoomed_in.width / zoomed_in.height - 1.5).abs() < 1e-9);
        assert!(zoomed_in.width < crop.width);
        assert!(zoomed_in.is_valid());

        let zoomed_out = zoomed_in.dragged(0.5, 0.5).zoomed(0.1, 1.5);
        assert!((zoomed_out.width / zoomed_out.height - 1.5).abs() < 1e-9);
        assert!(zoomed_out.is_valid());
        assert_eq!(zoomed_out.width, 1.0);
    }

    #[test]
    fn zoom_out_on_tall_aspect_falls_back_to_full_height() {
        let crop = CropRect::centered(0.5).zoomed(0.01, 0.5);
        assert_eq!(crop.height, 1.0);
        assert!((crop.width - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clamped_repairs_nonsense() {
        let crop = CropRect {
            x: -0.5,
            y: f64::NAN,
            width: 3.0,
            height: 0.0,
        }
        .clamped();

        assert!(crop.is_valid());
        assert_eq!(crop.width, 1.0);
        assert_eq!(crop.height, MIN_CROP);
    }

    #[test]
    fn source_rect_scales_to_pixels() {
        let crop = CropRect {
            x: 0.25,
            y: 0.5,
            width: 0.5,
            height: 0.5,
        };

        assert_eq!(crop.to_source_rect(400, 200), Rect::new(100.0, 100.0, 200.0, 100.0));
    }

    #[test]
    fn cover_fit_fills_without_letterboxing() {
        let src = Rect::new(0.0, 0.0, 400.0, 200.0);
        let dst = Rect::new(10.0, 10.0, 100.0, 100.0);

        let visible = cover_fit(src, dst);
        assert_eq!(visible, Rect::new(100.0, 0.0, 200.0, 200.0));
    }
}
