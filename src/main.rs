mod config;
mod viewer;

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use echodraw_cards::artwork::{group_collections, sort_by_upload};
use echodraw_cards::export::RELOAD_TIMEOUT;
use echodraw_cards::loader::Fetcher;
use echodraw_cards::{
    Artwork, ExportOptions, ExportPipeline, ImageCache, ImageLoader, Manifest, PreviewSession,
    RasterCanvas, UreqFetcher,
};

use crate::config::*;

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    env_logger::init();

    let config = Config::parse();

    compose_card(&config).context("An error occurred while composing the card")?;

    Ok(())
}

fn compose_card(config: &Config) -> Result<()> {
    log::info!("Reading manifest {}...", config.manifest.display());

    let file = File::open(&config.manifest)
        .with_context(|| format!("Failed to open manifest {}", config.manifest.display()))?;
    let manifest = Manifest::from_reader(BufReader::new(file))
        .context("Failed to parse manifest")?;

    let artworks = select_artworks(manifest.artworks, config.collection.as_deref())?;

    log::info!("Composing {} artworks.", artworks.len());

    let fetcher: Arc<dyn Fetcher> = Arc::new(UreqFetcher::new(config.origin.clone()));
    let loader = ImageLoader::new(
        Arc::clone(&fetcher),
        ImageCache::with_capacity(config.cache_capacity),
        config.load_policy(),
    )
    .with_timeout(config.fetch_timeout());

    let (width, height) = config.preview_size();
    let mut session = PreviewSession::new(Arc::new(loader), artworks, (width, height))
        .with_tags(manifest.tags)
        .with_settings(config.settings());

    let failed = session.load_pending();
    if failed > 0 {
        log::warn!("{failed} image(s) could not be loaded; their cells stay empty in the preview.");
    }

    if let Some(path) = &config.preview {
        write_preview(&session, config, path, (width, height))?;
    }

    let pipeline = ExportPipeline::new(
        fetcher,
        ExportOptions {
            preset: config.preset.aspect(),
            reload_timeout: RELOAD_TIMEOUT,
            settle_delay: config.settle_delay(),
            font: config.font_source(),
        },
    );

    let exported = pipeline
        .export_template(
            session.grid().cells(),
            session.artworks(),
            &session.view_model(),
            session.grid().layout(),
        )
        .map_err(|err| {
            if err.is_cors() {
                log::error!("Export needs every image server to send Access-Control-Allow-Origin for {}.", config.origin);
            }
            err
        })
        .context("Export failed")?;

    std::fs::write(&config.output, &exported.png)
        .with_context(|| format!("Failed to write {}", config.output.display()))?;

    log::info!(
        "Wrote {}x{} card to {}.",
        exported.width,
        exported.height,
        config.output.display()
    );

    if config.data_url {
        println!("{}", exported.data_url);
    }

    if config.open {
        viewer::open(&config.output, config.open_command.as_deref())?;
    }

    Ok(())
}

/// The artworks of `collection` in upload order, or all of them.
fn select_artworks(mut artworks: Vec<Artwork>, collection: Option<&str>) -> Result<Vec<Artwork>> {
    let Some(collection) = collection else {
        sort_by_upload(&mut artworks);
        return Ok(artworks);
    };

    match group_collections(&artworks).remove(collection) {
        Some(group) => Ok(group),
        None => bail!("Collection {collection} is not in the manifest"),
    }
}

fn write_preview(
    session: &PreviewSession,
    config: &Config,
    path: &std::path::Path,
    (width, height): (u32, u32),
) -> Result<()> {
    log::info!("Drawing {width}x{height} preview...");

    let font = config
        .font_source()
        .resolve()
        .context("Failed to load preview font")?;
    let mut canvas = RasterCanvas::new(width, height).with_font(font);

    let report = session.render(&mut canvas);
    log::debug!("Preview: {report:?}");

    if canvas.is_tainted() {
        log::warn!("Preview shows cross-origin images and cannot be saved; skipping {}.", path.display());
        return Ok(());
    }

    let png = canvas.to_png().context("Failed to encode preview")?;
    std::fs::write(path, png).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
