//! Compositing engine for EchoDraw report cards: lays artworks out on a grid,
//! crops them, captions them, and exports the result as a PNG.

pub mod artwork;
pub mod canvas;
pub mod composite;
pub mod crop;
pub mod export;
pub mod fonts;
pub mod layout;
pub mod loader;
pub mod meta;
pub mod session;
pub mod surface;

#[cfg(test)]
mod testing;

pub use artwork::{Artwork, Manifest, TagLookup};
pub use canvas::{CanvasError, RasterCanvas};
pub use composite::{draw_template, TemplateSettings, TemplateViewModel};
pub use crop::CropRect;
pub use export::{AspectPreset, ExportError, ExportOptions, ExportPipeline, ExportedImage};
pub use layout::{resolve_layout, Grid, GridCell, LayoutConfig};
pub use loader::{ImageCache, ImageLoader, LoadError, LoadPolicy, LoadedImage, UreqFetcher};
pub use session::PreviewSession;
