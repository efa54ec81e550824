use image::Rgba;

use crate::artwork::{resolve_tag, Artwork, TagLookup};
use crate::crop::{cover_fit, CropRect};
use crate::layout::{GridCell, LayoutConfig};
use crate::meta::{
    compose_meta_labels, format_duration_compact, format_duration_long, MetaOptions,
    UNKNOWN_DATE_LABEL,
};
use crate::surface::{Rect, Surface, TextAlign};

pub const BACKGROUND: Rgba<u8> = Rgba([250, 247, 242, 255]);
const INK: Rgba<u8> = Rgba([46, 44, 52, 255]);
const BRAND: Rgba<u8> = Rgba([226, 110, 74, 255]);

/// Drawn into cells that should hold an image but have none.
pub const WORDMARK: &str = "EchoDraw";

// All sizes are relative to the canvas width.
const GAP: f32 = 0.01;
const CORNER_RADIUS: f32 = 0.01;
const CAPTION_STRIP: f32 = 0.06;
const LABEL_BAND: f32 = 0.03;
const LABEL_SIZE: f32 = 0.02;
const CAPTION_SIZE: f32 = 0.022;
const BORDER_WIDTH: f32 = 0.002;
const DASH: f32 = 0.01;

/// User-facing template switches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateSettings {
    pub overlay_opacity: f32,
    pub show_durations: bool,
    pub show_date: bool,
    pub show_meta: bool,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            overlay_opacity: 1.0,
            show_durations: true,
            show_date: true,
            show_meta: true,
        }
    }
}

/// Everything the renderer needs besides the grid, derived per render.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateViewModel {
    pub overlay_opacity: f32,
    /// Total practice time across the selection.
    pub duration_label: Option<String>,
    pub show_durations: bool,
    pub caption: Option<String>,
}

impl TemplateViewModel {
    pub fn new(settings: &TemplateSettings, artworks: &[Artwork], tags: &dyn TagLookup) -> Self {
        let total = artworks
            .iter()
            .filter_map(Artwork::duration)
            .fold(0_u32, u32::saturating_add);
        let duration_label = format_duration_compact(total);

        let caption = settings
            .show_meta
            .then(|| compose_caption(settings, artworks.first(), tags));

        Self {
            overlay_opacity: clamp_opacity(settings.overlay_opacity),
            duration_label,
            show_durations: settings.show_durations,
            caption,
        }
    }
}

fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        1.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

/// The first artwork's timestamp label followed by its tags.
fn compose_caption(settings: &TemplateSettings, first: Option<&Artwork>, tags: &dyn TagLookup) -> String {
    let Some(first) = first else {
        return UNKNOWN_DATE_LABEL.to_owned();
    };

    let labels = compose_meta_labels(
        first,
        MetaOptions {
            show_date: settings.show_date,
            show_duration: true,
        },
    );

    let hashtags: Vec<_> = first
        .tags
        .iter()
        .map(|tag| format!("#{}", resolve_tag(tag, tags)))
        .collect();

    if hashtags.is_empty() {
        labels.timestamp_label
    } else {
        format!("{}  {}", labels.timestamp_label, hashtags.join(" "))
    }
}

/// Where things go on a `width × height` template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateGeometry {
    pub gap: f32,
    pub radius: f32,
    pub caption_strip: f32,
    pub cells: Vec<Rect>,
}

impl TemplateGeometry {
    pub fn new(width: u32, height: u32, layout: &LayoutConfig, show_durations: bool) -> Self {
        let (w, h) = (width as f32, height as f32);
        let cols = layout.cols.max(1);
        let rows = layout.rows.max(1);

        let gap = w * GAP;
        let caption_strip = (w * CAPTION_STRIP).round().min(h);
        let row_gap = if show_durations { gap.max(w * LABEL_BAND) } else { gap };

        let grid_height = h - caption_strip;
        let cell_w = ((w - gap * (cols + 1) as f32) / cols as f32).max(0.0);
        let cell_h = ((grid_height - 2.0 * gap - row_gap * (rows - 1) as f32) / rows as f32).max(0.0);

        let cells = (0..layout.total_cells)
            .map(|index| {
                let (row, col) = (index / cols, index % cols);
                Rect::new(
                    gap + col as f32 * (cell_w + gap),
                    gap + row as f32 * (cell_h + row_gap),
                    cell_w,
                    cell_h,
                )
            })
            .collect();

        Self {
            gap,
            radius: w * CORNER_RADIUS,
            caption_strip,
            cells,
        }
    }
}

/// What a render pass ended up drawing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub images: usize,
    pub placeholders: usize,
    pub empty: usize,
    /// Cells whose image failed to draw and were shown empty instead.
    pub degraded: usize,
}

fn fade(color: Rgba<u8>, factor: f32) -> Rgba<u8> {
    let Rgba([r, g, b, a]) = color;
    Rgba([r, g, b, (a as f32 * factor.clamp(0.0, 1.0)).round() as u8])
}

/// Paints the template. Always starts from a cleared background, so calling
/// it again with the same inputs produces the same output.
///
/// A cell whose image cannot be drawn is rendered empty; it never aborts
/// the rest of the template.
pub fn draw_template<S: Surface + ?Sized>(
    surface: &mut S,
    view: &TemplateViewModel,
    cells: &[GridCell],
    artworks: &[Artwork],
    layout: &LayoutConfig,
) -> RenderReport {
    let mut report = RenderReport::default();
    let (width, height) = surface.size();

    surface.clear(BACKGROUND);

    if cells.is_empty() {
        return report;
    }

    if cells.len() != layout.total_cells {
        log::warn!(
            "Grid has {} cells but its layout expects {}",
            cells.len(),
            layout.total_cells
        );
    }

    let geometry = TemplateGeometry::new(width, height, layout, view.show_durations);
    let w = width as f32;
    let opacity = view.overlay_opacity;

    for (index, (cell, rect)) in cells.iter().zip(&geometry.cells).enumerate() {
        if layout.is_placeholder(index) {
            draw_placeholder(surface, *rect, w, geometry.radius, opacity);
            report.placeholders += 1;
            continue;
        }

        let Some(image) = &cell.image else {
            draw_empty(surface, *rect, w, geometry.radius, opacity);
            report.empty += 1;
            continue;
        };

        let (iw, ih) = image.dimensions();
        let crop = cell
            .crop
            .map(CropRect::clamped)
            .unwrap_or_else(|| CropRect::default_for(iw, ih, rect.width, rect.height));
        let src = cover_fit(crop.to_source_rect(iw, ih), *rect);

        if let Err(err) = surface.draw_image_clipped(image, src, *rect, geometry.radius) {
            log::warn!("Cell {index} ({}) could not be drawn: {err}", image.url);
            draw_empty(surface, *rect, w, geometry.radius, opacity);
            report.degraded += 1;
            continue;
        }

        report.images += 1;

        if !view.show_durations {
            continue;
        }

        let label = cell
            .artwork_id
            .as_deref()
            .and_then(|id| artworks.iter().find(|art| art.id == id))
            .and_then(Artwork::duration)
            .and_then(format_duration_long);

        if let Some(label) = label {
            let size = w * LABEL_SIZE;
            surface.draw_text(
                &label,
                rect.right(),
                rect.bottom() + geometry.gap / 2.0 + size,
                size,
                TextAlign::Right,
                fade(INK, opacity),
            );
        }
    }

    if let Some(caption) = &view.caption {
        surface.draw_text(
            caption,
            geometry.gap,
            height as f32 - geometry.caption_strip * 0.25,
            w * CAPTION_SIZE,
            TextAlign::Left,
            fade(INK, opacity),
        );
    }

    log::debug!("Rendered template: {report:?}");

    report
}

fn draw_cell_frame<S: Surface + ?Sized>(surface: &mut S, rect: Rect, w: f32, radius: f32, opacity: f32) {
    surface.fill_rounded_rect(rect, radius, fade(BRAND, 0.08 * opacity));
    surface.stroke_dashed_rounded_rect(
        rect,
        radius,
        (w * BORDER_WIDTH).max(1.0),
        w * DASH,
        fade(BRAND, 0.5 * opacity),
    );
}

/// Decorative filler: dashed frame with a dashed inner panel.
fn draw_placeholder<S: Surface + ?Sized>(surface: &mut S, rect: Rect, w: f32, radius: f32, opacity: f32) {
    draw_cell_frame(surface, rect, w, radius, opacity);

    let inset = rect.width.min(rect.height) * 0.18;
    let inner = Rect::new(
        rect.x + inset,
        rect.y + inset,
        rect.width - 2.0 * inset,
        rect.height - 2.0 * inset,
    );

    surface.stroke_dashed_rounded_rect(
        inner,
        radius,
        (w * BORDER_WIDTH).max(1.0),
        w * DASH * 0.5,
        fade(BRAND, 0.3 * opacity),
    );
}

/// A slot waiting for (or unable to show) its image.
fn draw_empty<S: Surface + ?Sized>(surface: &mut S, rect: Rect, w: f32, radius: f32, opacity: f32) {
    draw_cell_frame(surface, rect, w, radius, opacity);

    let size = rect.width.min(rect.height) * 0.12;
    let (cx, cy) = rect.center();

    surface.draw_text(
        WORDMARK,
        cx,
        cy + size / 3.0,
        size,
        TextAlign::Center,
        fade(INK, 0.35 * opacity),
    );
}
