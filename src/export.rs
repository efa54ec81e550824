use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use image::imageops::FilterType;
use thiserror::Error;

use crate::artwork::Artwork;
use crate::canvas::{CanvasError, RasterCanvas};
use crate::composite::{draw_template, TemplateViewModel};
use crate::fonts::{FontError, FontSource};
use crate::layout::{GridCell, LayoutConfig};
use crate::loader::{Fetcher, ImageCache, ImageLoader, LoadError, LoadPolicy};

pub const EXPORT_WIDTH: u32 = 1080;

/// Per-image timeout for export reloads.
pub const RELOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything shorter cannot be a real PNG data URL.
const MIN_DATA_URL_LEN: usize = 64;

const EMPTY_DATA_URL: &str = "data:,";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AspectPreset {
    /// 1080 × 1080
    #[default]
    Square,
    /// 1080 × 1350
    Portrait,
}

impl AspectPreset {
    pub fn size(self) -> (u32, u32) {
        match self {
            Self::Square => (EXPORT_WIDTH, 1080),
            Self::Portrait => (EXPORT_WIDTH, 1350),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("artwork {0} is on the grid but not in the artwork list")]
    MissingArtwork(String),
    #[error("{url} does not allow cross-origin reads; enable CORS for this origin on the image server")]
    CorsRequired { url: String },
    #[error("load timed out: {url}")]
    TimedOut { url: String },
    #[error("failed to reload image for export: {0}")]
    Reload(#[source] LoadError),
    #[error("caption font unavailable: {0}")]
    Font(#[from] FontError),
    #[error("canvas tainted by cross-origin image; enable CORS on the image server")]
    Tainted,
    #[error("{0} cell(s) could not be drawn")]
    Incomplete(usize),
    #[error("export produced an empty image")]
    Empty,
    #[error("failed to encode export: {0}")]
    Encode(String),
}

impl ExportError {
    /// Whether fixing this needs a CORS change on the image server.
    pub fn is_cors(&self) -> bool {
        matches!(self, Self::CorsRequired { .. } | Self::Tainted)
    }
}

impl From<LoadError> for ExportError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::CorsRequired { url } => Self::CorsRequired { url },
            LoadError::TimedOut { url } => Self::TimedOut { url },
            other => Self::Reload(other),
        }
    }
}

impl From<CanvasError> for ExportError {
    fn from(err: CanvasError) -> Self {
        match err {
            CanvasError::Tainted => Self::Tainted,
            other => Self::Encode(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub preset: AspectPreset,
    /// Bound on each source reload, independent of how the preview loads.
    pub reload_timeout: Duration,
    /// Pause between font loading and drawing.
    pub settle_delay: Duration,
    pub font: FontSource,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            preset: AspectPreset::default(),
            reload_timeout: RELOAD_TIMEOUT,
            settle_delay: Duration::from_millis(100),
            font: FontSource::system(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
    pub data_url: String,
}

/// Full-resolution, CORS-safe render of a template.
///
/// Every image is fetched again through a fresh, strict loader rather than
/// taken from the live grid, whose images may have been loaded permissively.
pub struct ExportPipeline {
    fetcher: Arc<dyn Fetcher>,
    options: ExportOptions,
}

impl ExportPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, options: ExportOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn export_template(
        &self,
        cells: &[GridCell],
        artworks: &[Artwork],
        view: &TemplateViewModel,
        layout: &LayoutConfig,
    ) -> Result<ExportedImage, ExportError> {
        let sources = cells
            .iter()
            .filter_map(|cell| cell.artwork_id.as_deref())
            .map(|id| {
                artworks
                    .iter()
                    .find(|art| art.id == id)
                    .map(|art| (id.to_owned(), art.image_src.clone()))
                    .ok_or_else(|| ExportError::MissingArtwork(id.to_owned()))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        log::info!("Reloading {} source images for export...", sources.len());

        let loader = ImageLoader::new(
            Arc::clone(&self.fetcher),
            ImageCache::with_capacity(sources.len()),
            LoadPolicy::Strict,
        )
        .with_timeout(self.options.reload_timeout);
        let urls: Vec<_> = sources.values().collect();
        let reloaded = loader.get_or_load_images(&urls)?;

        let cells: Vec<_> = cells
            .iter()
            .map(|cell| GridCell {
                image: cell
                    .artwork_id
                    .as_ref()
                    .and_then(|id| sources.get(id))
                    .and_then(|url| reloaded.get(url))
                    .cloned(),
                ..cell.clone()
            })
            .collect();

        log::info!("Loading caption font...");

        let font = self.options.font.resolve()?;

        if !self.options.settle_delay.is_zero() {
            std::thread::sleep(self.options.settle_delay);
        }

        let (width, height) = self.options.preset.size();

        log::info!("Drawing {width}x{height} export...");

        let mut canvas = RasterCanvas::new(width, height)
            .with_font(font)
            .with_filter(FilterType::Lanczos3);

        let report = draw_template(&mut canvas, view, &cells, artworks, layout);

        if report.degraded > 0 {
            return Err(ExportError::Incomplete(report.degraded));
        }

        let png = canvas.to_png()?;
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );

        if data_url == EMPTY_DATA_URL || data_url.len() < MIN_DATA_URL_LEN {
            return Err(ExportError::Empty);
        }

        log::info!("Export complete ({} bytes).", png.len());

        Ok(ExportedImage {
            width,
            height,
            png,
            data_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::composite::TemplateSettings;
    use crate::layout::Grid;
    use crate::loader::{FetchError, LoadedImage};
    use crate::testing::{png_data_uri, StubFetcher, StubReply};

    fn options(preset: AspectPreset) -> ExportOptions {
        ExportOptions {
            preset,
            reload_timeout: RELOAD_TIMEOUT,
            settle_delay: Duration::ZERO,
            font: FontSource::system(),
        }
    }

    fn setup(urls: &[String]) -> (Vec<Artwork>, Grid, TemplateViewModel) {
        let artworks: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let mut art = Artwork::new(format!("a{i}"), url.clone());
                art.duration_minutes = Some(45.0);
                art
            })
            .collect();

        let grid = Grid::with_artworks(artworks.iter().map(|a| a.id.clone()));
        let view = TemplateViewModel::new(
            &TemplateSettings::default(),
            &artworks,
            &HashMap::<u32, String>::new(),
        );

        (artworks, grid, view)
    }

    fn export(
        fetcher: StubFetcher,
        preset: AspectPreset,
        urls: &[String],
    ) -> Result<ExportedImage, ExportError> {
        let (artworks, grid, view) = setup(urls);
        let pipeline = ExportPipeline::new(Arc::new(fetcher), options(preset));

        pipeline.export_template(grid.cells(), &artworks, &view, grid.layout())
    }

    #[test]
    fn exports_at_preset_resolution() -> Result<(), ExportError> {
        let remote = "https://cdn.example/a.png".to_owned();
        let urls = [png_data_uri(30, 20), remote.clone(), png_data_uri(8, 8)];

        for (preset, height) in [(AspectPreset::Square, 1080), (AspectPreset::Portrait, 1350)] {
            let fetcher = StubFetcher::default().with(&remote, StubReply::png(64, 48));
            let exported = export(fetcher, preset, &urls)?;

            assert_eq!((exported.width, exported.height), (1080, height));
            assert!(exported.data_url.starts_with("data:image/png;base64,"));

            let decoded = image::load_from_memory(&exported.png)
                .map_err(|err| ExportError::Encode(err.to_string()))?;
            assert_eq!((decoded.width(), decoded.height()), (1080, height));
        }

        Ok(())
    }

    #[test]
    fn missing_image_fails_the_export_and_leaves_the_grid_alone() {
        let ok = "https://cdn.example/ok.png".to_owned();
        let gone = "https://cdn.example/gone.png".to_owned();
        let fetcher = StubFetcher::default().with(&ok, StubReply::png(10, 10));

        let (artworks, mut grid, view) = setup(&[ok.clone(), gone]);
        grid.set_image(
            0,
            Some(LoadedImage {
                url: ok,
                image: Arc::new(image::RgbaImage::new(10, 10)),
                tainted: false,
            }),
        );
        let before = grid.clone();

        let pipeline = ExportPipeline::new(Arc::new(fetcher), options(AspectPreset::Square));
        let result = pipeline.export_template(grid.cells(), &artworks, &view, grid.layout());

        assert!(matches!(
            result,
            Err(ExportError::Reload(LoadError::Status { status: 404, .. }))
        ));
        assert_eq!(grid, before);
    }

    #[test]
    fn cors_failures_are_reported_as_such() {
        let url = "https://cdn.example/private.png".to_owned();
        let fetcher = StubFetcher::default().with(&url, StubReply::opaque_png(10, 10));

        let err = export(fetcher, AspectPreset::Square, &[url]).unwrap_err();

        assert!(matches!(err, ExportError::CorsRequired { .. }));
        assert!(err.is_cors());
    }

    #[test]
    fn timeouts_are_reported_as_such() {
        let url = "https://cdn.example/slow.png".to_owned();
        let fetcher = StubFetcher::default().with(&url, StubReply::Fail(FetchError::TimedOut));

        let err = export(fetcher, AspectPreset::Square, &[url]).unwrap_err();

        assert!(matches!(err, ExportError::TimedOut { .. }));
        assert!(!err.is_cors());
    }

    #[test]
    fn reloads_use_their_own_timeout() -> Result<(), ExportError> {
        let url = "https://cdn.example/slow.png".to_owned();
        let fetcher = Arc::new(
            StubFetcher::default().with(&url, StubReply::slow_png(10, 10, Duration::from_secs(30))),
        );

        let preview = ImageLoader::new(fetcher.clone(), ImageCache::default(), LoadPolicy::Strict)
            .with_timeout(Duration::from_secs(300));
        assert!(preview.get_or_load_image(&url).is_ok());

        let (artworks, grid, view) = setup(&[url.clone()]);
        let pipeline = ExportPipeline::new(fetcher.clone(), options(AspectPreset::Square));
        let err = pipeline
            .export_template(grid.cells(), &artworks, &view, grid.layout())
            .unwrap_err();

        assert!(matches!(err, ExportError::TimedOut { url: timed_out } if timed_out == url));
        assert_eq!(
            fetcher.timeouts(),
            [Duration::from_secs(300), RELOAD_TIMEOUT]
        );

        let patient = ExportPipeline::new(
            fetcher,
            ExportOptions {
                reload_timeout: Duration::from_secs(60),
                ..options(AspectPreset::Square)
            },
        );
        patient.export_template(grid.cells(), &artworks, &view, grid.layout())?;
        Ok(())
    }

    #[test]
    fn live_images_are_not_reused() -> Result<(), ExportError> {
        let url = "https://cdn.example/a.png".to_owned();
        let fetcher = Arc::new(StubFetcher::default().with(&url, StubReply::png(10, 10)));

        let (artworks, mut grid, view) = setup(&[url.clone(), png_data_uri(4, 4)]);
        grid.set_image(
            0,
            Some(LoadedImage {
                url: url.clone(),
                image: Arc::new(image::RgbaImage::new(10, 10)),
                tainted: true,
            }),
        );

        let pipeline = ExportPipeline::new(fetcher.clone(), options(AspectPreset::Square));
        pipeline.export_template(grid.cells(), &artworks, &view, grid.layout())?;

        assert_eq!(fetcher.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn unknown_artwork_is_an_error() {
        let (artworks, _, view) = setup(&[png_data_uri(4, 4)]);
        let grid = Grid::with_artworks(["nope", "a0"]);

        let pipeline = ExportPipeline::new(Arc::new(StubFetcher::default()), options(AspectPreset::Square));
        let result = pipeline.export_template(grid.cells(), &artworks, &view, grid.layout());

        assert!(matches!(result, Err(ExportError::MissingArtwork(id)) if id == "nope"));
    }
}
