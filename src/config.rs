use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use echodraw_cards::export::RELOAD_TIMEOUT;
use echodraw_cards::fonts::FontSource;
use echodraw_cards::loader::LoadPolicy;
use echodraw_cards::{AspectPreset, TemplateSettings};

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON file with the artworks to compose.
    ///
    /// Either a bare array of artwork records, or an object with an
    /// `artworks` array and a `tags` map from numeric tag id to name.
    #[arg(short, long, env = "ECHODRAW_MANIFEST")]
    pub manifest: PathBuf,
    /// Only compose the artworks of this collection, oldest upload first.
    ///
    /// Without it, every artwork in the manifest is used.
    #[arg(short, long, env = "ECHODRAW_COLLECTION")]
    pub collection: Option<String>,
    /// Output shape.
    ///
    /// - square: 1080x1080
    ///
    /// - portrait: 1080x1350
    #[arg(short, long, value_enum, env = "ECHODRAW_PRESET", default_value = "square")]
    pub preset: Preset,
    /// Where the exported PNG is written.
    #[arg(short, long, env = "ECHODRAW_OUTPUT", default_value = "echodraw_card.png")]
    pub output: PathBuf,
    /// Also write the live preview to this path.
    #[arg(long, env = "ECHODRAW_PREVIEW")]
    pub preview: Option<PathBuf>,
    /// Width of the live preview; the height follows the preset.
    #[arg(long, value_parser = clap::value_parser!(u32).range(64..=1080), env = "ECHODRAW_PREVIEW_WIDTH", default_value_t = 540)]
    pub preview_width: u32,
    /// Font used for captions and labels. Defaults to a system font.
    #[arg(short, long, env = "ECHODRAW_FONT")]
    pub font: Option<PathBuf>,
    /// Opacity of text overlays and placeholder decorations, in percent.
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100), env = "ECHODRAW_OVERLAY_OPACITY", default_value_t = 100)]
    pub overlay_opacity: u32,
    /// Don't draw per-image durations under each cell.
    #[arg(long, env = "ECHODRAW_HIDE_DURATIONS", default_value_t = false)]
    pub hide_durations: bool,
    /// Leave the date out of the caption.
    #[arg(long, env = "ECHODRAW_HIDE_DATE", default_value_t = false)]
    pub hide_date: bool,
    /// Don't draw the caption (date, total time, tags) at all.
    #[arg(long, env = "ECHODRAW_HIDE_META", default_value_t = false)]
    pub hide_meta: bool,
    /// Origin sent with image requests. Image servers must allow it via CORS.
    #[arg(long, env = "ECHODRAW_ORIGIN", default_value = "https://echodraw.app")]
    pub origin: String,
    /// Per-image download timeout for the preview, in seconds. The export
    /// always reloads with its own 10 second bound.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=300), env = "ECHODRAW_TIMEOUT", default_value_t = RELOAD_TIMEOUT.as_secs())]
    pub timeout: u64,
    /// How many decoded images the preview keeps around.
    #[arg(long, env = "ECHODRAW_CACHE_CAPACITY", default_value_t = 64)]
    pub cache_capacity: usize,
    /// Show images in the preview even when their server does not allow
    /// cross-origin reads. Such previews cannot be saved.
    #[arg(long, env = "ECHODRAW_ALLOW_OPAQUE_PREVIEW", default_value_t = false)]
    pub allow_opaque_preview: bool,
    /// Pause after loading fonts before drawing the export, in milliseconds.
    #[arg(long, env = "ECHODRAW_SETTLE_MS", default_value_t = 100)]
    pub settle_ms: u64,
    /// Print the export as a data URL on stdout.
    #[arg(long, env = "ECHODRAW_DATA_URL", default_value_t = false)]
    pub data_url: bool,
    /// Open the exported image once it is written.
    #[arg(long, env = "ECHODRAW_OPEN", default_value_t = false)]
    pub open: bool,
    /// Command used to open the export instead of the platform viewer.
    ///
    /// The command will be ran as `sh -c "{open_command} {path}"`.
    #[arg(long, env = "ECHODRAW_OPEN_COMMAND")]
    pub open_command: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Square,
    Portrait,
}

impl Preset {
    pub fn aspect(self) -> AspectPreset {
        match self {
            Preset::Square => AspectPreset::Square,
            Preset::Portrait => AspectPreset::Portrait,
        }
    }
}

impl Config {
    pub fn settings(&self) -> TemplateSettings {
        TemplateSettings {
            overlay_opacity: self.overlay_opacity as f32 / 100.0,
            show_durations: !self.hide_durations,
            show_date: !self.hide_date,
            show_meta: !self.hide_meta,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn load_policy(&self) -> LoadPolicy {
        if self.allow_opaque_preview {
            LoadPolicy::Permissive
        } else {
            LoadPolicy::Strict
        }
    }

    pub fn font_source(&self) -> FontSource {
        match &self.font {
            Some(path) => FontSource::file(path),
            None => FontSource::system(),
        }
    }

    /// Preview dimensions: the export scaled down to `preview_width`.
    pub fn preview_size(&self) -> (u32, u32) {
        let (width, height) = self.preset.aspect().size();
        let scale = self.preview_width as f32 / width as f32;

        (self.preview_width, (height as f32 * scale).round() as u32)
    }
}
