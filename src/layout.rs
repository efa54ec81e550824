use crate::crop::CropRect;
use crate::loader::LoadedImage;

/// Grid shape for a given number of images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    pub cols: usize,
    pub rows: usize,
    pub total_cells: usize,
    pub placeholder_indices: Vec<usize>,
}

impl LayoutConfig {
    fn new(cols: usize, rows: usize, placeholder_indices: &[usize]) -> Self {
        Self {
            cols,
            rows,
            total_cells: cols * rows,
            placeholder_indices: placeholder_indices.to_vec(),
        }
    }

    pub fn is_placeholder(&self, index: usize) -> bool {
        self.placeholder_indices.contains(&index)
    }

    /// Number of cells that can carry an artwork.
    pub fn capacity(&self) -> usize {
        self.total_cells - self.placeholder_indices.len()
    }
}

/// Maps an image count to its grid.
///
/// This is a table, not a formula: three images deliberately get a 2×2 grid
/// with a trailing placeholder. Counts above nine share the nine-image grid.
pub fn resolve_layout(image_count: usize) -> LayoutConfig {
    match image_count {
        0 => LayoutConfig::new(1, 1, &[0]),
        // No dedicated single-image layout exists; one image lands in the
        // default 3×3 grid and the remaining cells render empty.
        1 => LayoutConfig::new(3, 3, &[]),
        2 => LayoutConfig::new(2, 1, &[]),
        3 => LayoutConfig::new(2, 2, &[3]),
        4 => LayoutConfig::new(2, 2, &[]),
        5 => LayoutConfig::new(3, 2, &[5]),
        6 => LayoutConfig::new(3, 2, &[]),
        7 => LayoutConfig::new(3, 3, &[7, 8]),
        // Index 8 stays a placeholder here too, so only the first eight images land.
        _ => LayoutConfig::new(3, 3, &[8]),
    }
}

/// One slot of the compositing grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridCell {
    pub artwork_id: Option<String>,
    pub image: Option<LoadedImage>,
    pub crop: Option<CropRect>,
}

impl GridCell {
    fn assigned(artwork_id: String) -> Self {
        Self {
            artwork_id: Some(artwork_id),
            ..Self::default()
        }
    }
}

/// Sparse, ordered cell array kept in step with its [`LayoutConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    layout: LayoutConfig,
    cells: Vec<GridCell>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::with_artworks(std::iter::empty::<String>())
    }
}

impl Grid {
    /// Builds a grid holding the given artwork ids in order.
    pub fn with_artworks<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells = ids.into_iter().map(|id| GridCell::assigned(id.into())).collect();
        Self::lay_out(cells)
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&GridCell> {
        self.cells.get(index)
    }

    /// Stores the decoded image for an assigned cell. Cells without an
    /// artwork are left alone.
    pub fn set_image(&mut self, index: usize, image: Option<LoadedImage>) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) if cell.artwork_id.is_some() => {
                cell.image = image;
                true
            }
            _ => false,
        }
    }

    pub fn set_crop(&mut self, index: usize, crop: Option<CropRect>) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) if cell.artwork_id.is_some() => {
                cell.crop = crop;
                true
            }
            _ => false,
        }
    }

    pub fn assigned_count(&self) -> usize {
        self.cells.iter().filter(|c| c.artwork_id.is_some()).count()
    }

    /// Re-lays the grid out for `count` images, keeping the assigned cells in
    /// order. Running it twice with the same count changes nothing.
    pub fn resize_for(&mut self, count: usize) {
        let layout = resolve_layout(count);

        if layout == self.layout && self.cells.len() == layout.total_cells {
            return;
        }

        log::debug!(
            "Resizing grid from {}x{} to {}x{} for {count} images",
            self.layout.cols,
            self.layout.rows,
            layout.cols,
            layout.rows
        );

        let kept: Vec<_> = self
            .cells
            .drain(..)
            .filter(|c| c.artwork_id.is_some())
            .collect();

        self.cells = Self::place(&layout, kept);
        self.layout = layout;
    }

    /// Restores the count/layout agreement if something broke it.
    pub fn normalize(&mut self) {
        let count = self.assigned_count();
        let expected = resolve_layout(count);

        let misplaced = self
            .layout
            .placeholder_indices
            .iter()
            .any(|&i| self.cells.get(i).is_some_and(|c| c.artwork_id.is_some()));

        if expected != self.layout || self.cells.len() != expected.total_cells || misplaced {
            log::warn!("Grid disagrees with its layout ({count} images); recomputing");
            let kept = std::mem::take(&mut self.cells)
                .into_iter()
                .filter(|c| c.artwork_id.is_some())
                .collect();
            self.cells = Self::place(&expected, kept);
            self.layout = expected;
        }
    }

    /// Appends an artwork after the last assigned cell.
    pub fn push(&mut self, artwork_id: impl Into<String>) {
        let mut kept: Vec<_> = std::mem::take(&mut self.cells)
            .into_iter()
            .filter(|c| c.artwork_id.is_some())
            .collect();
        kept.push(GridCell::assigned(artwork_id.into()));

        *self = Self::lay_out(kept);
    }

    /// Puts an artwork into `index`, dropping whatever image and crop the
    /// slot held. Placeholder and out-of-range indices are refused.
    pub fn assign(&mut self, index: usize, artwork_id: impl Into<String>) -> bool {
        if self.layout.is_placeholder(index) || index >= self.cells.len() {
            return false;
        }

        self.cells[index] = GridCell::assigned(artwork_id.into());
        self.resize_for(self.assigned_count());
        true
    }

    /// Empties `index`; returns the artwork id it held.
    pub fn remove(&mut self, index: usize) -> Option<String> {
        let removed = self.cells.get_mut(index)?.artwork_id.take();

        if removed.is_some() {
            self.cells[index] = GridCell::default();
            self.resize_for(self.assigned_count());
        }

        removed
    }

    fn lay_out(cells: Vec<GridCell>) -> Self {
        let layout = resolve_layout(cells.len());
        let cells = Self::place(&layout, cells);

        Self { layout, cells }
    }

    fn place(layout: &LayoutConfig, kept: Vec<GridCell>) -> Vec<GridCell> {
        let mut kept = kept.into_iter();

        (0..layout.total_cells)
            .map(|i| {
                if layout.is_placeholder(i) {
                    GridCell::default()
                } else {
                    kept.next().unwrap_or_default()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_consistent() {
        for count in 0..=9 {
            let layout = resolve_layout(count);
            assert_eq!(layout.total_cells, layout.cols * layout.rows, "count {count}");

            let mut seen = layout.placeholder_indices.clone();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), layout.placeholder_indices.len());
            assert!(seen.iter().all(|&i| i < layout.total_cells));
        }
    }

    #[test]
    fn large_counts_share_the_nine_image_grid() {
        for count in [9, 10, 25, 400] {
            let layout = resolve_layout(count);
            assert_eq!(layout.total_cells, 9);
            assert_eq!(layout.capacity(), 8);
            assert_eq!(layout, resolve_layout(9));
        }
    }

    #[test]
    fn known_shapes() {
        assert_eq!(resolve_layout(0).placeholder_indices, vec![0]);
        assert_eq!((resolve_layout(2).cols, resolve_layout(2).rows), (2, 1));
        assert_eq!(resolve_layout(3).placeholder_indices, vec![3]);
        assert_eq!(resolve_layout(7).placeholder_indices, vec![7, 8]);

        let single = resolve_layout(1);
        assert_eq!((single.cols, single.rows), (3, 3));
        assert!(single.placeholder_indices.is_empty());
    }

    #[test]
    fn five_images_leave_the_last_cell_as_placeholder() {
        let mut grid = Grid::with_artworks(["a", "b", "c", "d", "e"]);

        assert_eq!(
            grid.layout(),
            &LayoutConfig {
                cols: 3,
                rows: 2,
                total_cells: 6,
                placeholder_indices: vec![5],
            }
        );
        assert!(grid.cell(5).unwrap().artwork_id.is_none());

        grid.resize_for(grid.assigned_count());
        grid.resize_for(5);
        assert!(grid.cell(5).unwrap().artwork_id.is_none());
        assert!(!grid.assign(5, "f"));
    }

    #[test]
    fn resize_is_idempotent() {
        let mut grid = Grid::with_artworks(["a", "b", "c"]);
        grid.resize_for(3);
        let once = grid.clone();
        grid.resize_for(3);
        assert_eq!(grid, once);
    }

    #[test]
    fn resize_preserves_order() {
        let mut grid = Grid::with_artworks(["a", "b", "c", "d", "e", "f"]);
        grid.remove(1);

        let ids: Vec<_> = grid
            .cells()
            .iter()
            .filter_map(|c| c.artwork_id.as_deref())
            .collect();
        assert_eq!(ids, ["a", "c", "d", "e", "f"]);
        assert_eq!(grid.layout(), &resolve_layout(5));
    }

    #[test]
    fn push_grows_the_layout() {
        let mut grid = Grid::default();
        assert_eq!(grid.cells().len(), 1);
        assert!(!grid.assign(0, "a"));

        grid.push("a");
        grid.push("b");
        grid.push("c");

        assert_eq!(grid.layout(), &resolve_layout(3));
        assert_eq!(grid.cell(2).unwrap().artwork_id.as_deref(), Some("c"));
    }

    #[test]
    fn assign_replaces_image_and_crop() {
        let mut grid = Grid::with_artworks(["a", "b"]);
        assert!(grid.set_crop(0, Some(CropRect::full())));

        assert!(grid.assign(0, "z"));
        assert_eq!(grid.cell(0).unwrap().artwork_id.as_deref(), Some("z"));
        assert!(grid.cell(0).unwrap().crop.is_none());
        assert!(!grid.assign(9, "y"));
    }

    #[test]
    fn images_and_crops_only_go_to_assigned_cells() {
        let mut grid = Grid::with_artworks(["a", "b", "c"]);

        assert!(!grid.set_crop(3, Some(CropRect::full())));
        assert!(!grid.set_image(3, None));
        assert!(!grid.set_crop(7, None));
        assert!(grid.cell(3).unwrap().crop.is_none());

        assert!(grid.set_crop(2, Some(CropRect::full())));
        assert_eq!(grid.assigned_count(), 3);
        assert_eq!(grid.layout(), &resolve_layout(3));
    }

    #[test]
    fn nine_or_more_images_fill_eight_cells() {
        let ids: Vec<_> = (0..10).map(|i| format!("a{i}")).collect();
        let grid = Grid::with_artworks(ids.clone());

        let kept: Vec<_> = grid.cells().iter().filter_map(|c| c.artwork_id.clone()).collect();
        assert_eq!(kept, &ids[..8]);
        assert!(grid.cell(8).unwrap().artwork_id.is_none());
    }

    #[test]
    fn normalize_recovers_a_broken_grid() {
        let mut grid = Grid::with_artworks(["a", "b", "c"]);
        grid.cells[3].artwork_id = Some("intruder".into());

        grid.normalize();

        assert_eq!(grid.assigned_count(), 4);
        assert_eq!(grid.layout(), &resolve_layout(4));
    }
}
