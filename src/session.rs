use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::artwork::Artwork;
use crate::composite::{draw_template, RenderReport, TemplateGeometry, TemplateSettings, TemplateViewModel};
use crate::crop::{crop_aspect, CropRect};
use crate::layout::Grid;
use crate::loader::{ImageLoader, LoadError, LoadedImage};
use crate::surface::Surface;

/// Identifies one pending image load. Only accepted while the session is
/// still on the generation it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub index: usize,
    pub artwork_id: String,
    pub url: String,
}

/// Live-preview state: the artworks, their grid, crops, and the settings the
/// template is drawn with.
pub struct PreviewSession {
    loader: Arc<ImageLoader>,
    artworks: Vec<Artwork>,
    tags: HashMap<u32, String>,
    settings: TemplateSettings,
    grid: Grid,
    generation: u64,
    size: (u32, u32),
}

impl PreviewSession {
    pub fn new(loader: Arc<ImageLoader>, artworks: Vec<Artwork>, size: (u32, u32)) -> Self {
        let grid = Grid::with_artworks(artworks.iter().map(|a| a.id.clone()));

        Self {
            loader,
            artworks,
            tags: HashMap::new(),
            settings: TemplateSettings::default(),
            grid,
            generation: 1,
            size,
        }
    }

    pub fn with_tags(mut self, tags: HashMap<u32, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_settings(mut self, settings: TemplateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn artworks(&self) -> &[Artwork] {
        &self.artworks
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings(&self) -> &TemplateSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TemplateSettings) {
        self.settings = settings;
    }

    fn bump(&mut self) {
        self.generation += 1;
        log::debug!("Preview generation is now {}", self.generation);
    }

    /// Replaces the selection; any load in flight becomes stale.
    pub fn set_artworks(&mut self, artworks: Vec<Artwork>) {
        self.grid = Grid::with_artworks(artworks.iter().map(|a| a.id.clone()));
        self.artworks = artworks;
        self.bump();
    }

    pub fn push_artwork(&mut self, artwork: Artwork) {
        self.grid.push(artwork.id.clone());
        self.artworks.push(artwork);
        self.bump();
    }

    pub fn assign(&mut self, index: usize, artwork_id: &str) -> bool {
        if !self.artworks.iter().any(|a| a.id == artwork_id) {
            return false;
        }

        let assigned = self.grid.assign(index, artwork_id);
        if assigned {
            self.bump();
        }
        assigned
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        let removed = self.grid.remove(index);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Tickets for every assigned cell that has no image yet.
    pub fn pending_loads(&self) -> Vec<LoadTicket> {
        self.grid
            .cells()
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.image.is_none())
            .filter_map(|(index, cell)| {
                let id = cell.artwork_id.as_deref()?;
                let artwork = self.artworks.iter().find(|a| a.id == id)?;

                Some(LoadTicket {
                    generation: self.generation,
                    index,
                    artwork_id: id.to_owned(),
                    url: artwork.image_src.clone(),
                })
            })
            .collect()
    }

    /// Stores a finished load. Returns `false` when the ticket is stale, in
    /// which case the grid is left alone. A failed load leaves the cell
    /// empty; the preview keeps working.
    pub fn accept_image(
        &mut self,
        ticket: &LoadTicket,
        result: Result<LoadedImage, LoadError>,
    ) -> bool {
        if ticket.generation != self.generation {
            log::debug!(
                "Dropping stale load of {} (generation {} < {})",
                ticket.url,
                ticket.generation,
                self.generation
            );
            return false;
        }

        let matches = self
            .grid
            .cell(ticket.index)
            .is_some_and(|cell| cell.artwork_id.as_deref() == Some(ticket.artwork_id.as_str()));

        if !matches {
            return false;
        }

        match result {
            Ok(image) => {
                self.grid.set_image(ticket.index, Some(image));
            }
            Err(err) => log::warn!("Could not load {}: {err}", ticket.url),
        }

        true
    }

    /// Loads every pending image concurrently and stores the results.
    /// Returns how many loads failed.
    pub fn load_pending(&mut self) -> usize {
        let tickets = self.pending_loads();

        log::info!("Loading {} images for preview...", tickets.len());

        let loader = Arc::clone(&self.loader);
        let results: Vec<_> = tickets
            .par_iter()
            .map(|ticket| loader.get_or_load_image(&ticket.url))
            .collect();

        let mut failed = 0;

        for (ticket, result) in tickets.iter().zip(results) {
            if result.is_err() {
                failed += 1;
            }
            self.accept_image(ticket, result);
        }

        failed
    }

    /// Crop aspect for the image in `index`, in normalized crop space.
    fn cell_aspect(&self, index: usize) -> Option<f64> {
        let image = self.grid.cell(index)?.image.as_ref()?;
        let geometry = TemplateGeometry::new(
            self.size.0,
            self.size.1,
            self.grid.layout(),
            self.settings.show_durations,
        );
        let rect = geometry.cells.get(index)?;
        let (w, h) = image.dimensions();

        Some(crop_aspect(
            rect.width as f64,
            rect.height as f64,
            w as f64,
            h as f64,
        ))
    }

    /// The crop in effect for `index`: the stored one, or the default.
    pub fn crop(&self, index: usize) -> Option<CropRect> {
        let cell = self.grid.cell(index)?;

        cell.crop
            .or_else(|| self.cell_aspect(index).map(CropRect::centered))
    }

    pub fn set_crop(&mut self, index: usize, crop: CropRect) -> bool {
        self.grid.set_crop(index, Some(crop.clamped()))
    }

    /// Pans the crop of `index` by a normalized delta.
    pub fn drag_crop(&mut self, index: usize, dx: f64, dy: f64) -> Option<CropRect> {
        let crop = self.crop(index)?.dragged(dx, dy);
        self.set_crop(index, crop).then_some(crop)
    }

    /// Zooms the crop of `index`; `factor > 1` zooms in.
    pub fn zoom_crop(&mut self, index: usize, factor: f64) -> Option<CropRect> {
        let aspect = self.cell_aspect(index)?;
        let crop = self.crop(index)?.zoomed(factor, aspect);
        self.set_crop(index, crop).then_some(crop)
    }

    pub fn view_model(&self) -> TemplateViewModel {
        TemplateViewModel::new(&self.settings, &self.artworks, &self.tags)
    }

    /// Draws the current state onto `surface`.
    pub fn render<S: Surface + ?Sized>(&self, surface: &mut S) -> RenderReport {
        draw_template(
            surface,
            &self.view_model(),
            self.grid.cells(),
            &self.artworks,
            self.grid.layout(),
        )
    }
}
