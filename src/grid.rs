//! Tile grid planning: how a raster level is cut into fixed-size blocks.

/// Reduction factor of an overview, `round(base / overview)` per the PostGIS
/// loader convention.
#[inline]
pub fn overview_factor(base_dimension: usize, overview_dimension: usize) -> usize {
    (0.5 + base_dimension as f64 / overview_dimension as f64) as usize
}

/// One cell of the tile grid: where to read and how much of the read window
/// actually lies inside the raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileWindow {
    /// Grid cell index, (column, row).
    pub cell: (usize, usize),
    /// Pixel offset of the read window in the base raster.
    pub offset: (usize, usize),
    /// Part of the read window inside the raster, per axis.
    pub valid: (usize, usize),
    /// Read window minus valid size; nonzero only on edge tiles.
    pub padding: (usize, usize),
}

/// Tiling plan for one pyramid level of a raster.
///
/// The emitted tile is always `block` pixels; for `level` > 1 each tile is
/// produced from a `read_block = block * level` window of the base raster, so
/// the grid is laid over read windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelPlan {
    pub level: usize,
    pub raster: (usize, usize),
    /// Dimensions of every emitted tile.
    pub block: (usize, usize),
    /// Window read from the base raster per tile.
    pub read_block: (usize, usize),
    /// Grid dimensions in tiles, (columns, rows).
    pub grid: (usize, usize),
}

impl LevelPlan {
    /// Plan the grid for a raster. Without a requested block size the whole
    /// raster is a single tile and no padding can occur.
    ///
    /// The grid is laid over the level's raster size `floor(raster / level)`:
    /// base pixels beyond the last full level pixel never start a new tile.
    pub fn new(raster: (usize, usize), block: Option<(usize, usize)>, level: usize) -> Self {
        match block {
            Some(block) => {
                let read_block = (block.0 * level, block.1 * level);
                let level_size = (raster.0 / level, raster.1 / level);
                let grid = (
                    level_size.0.div_ceil(block.0),
                    level_size.1.div_ceil(block.1),
                );
                Self {
                    level,
                    raster,
                    block,
                    read_block,
                    grid,
                }
            }
            None => Self {
                level,
                raster,
                block: raster,
                read_block: raster,
                grid: (1, 1),
            },
        }
    }

    pub fn tile_count(&self) -> usize {
        self.grid.0 * self.grid.1
    }

    /// The window for grid cell (`col`, `row`).
    pub fn window(&self, col: usize, row: usize) -> TileWindow {
        let offset = (col * self.read_block.0, row * self.read_block.1);
        let bound = (offset.0 + self.read_block.0, offset.1 + self.read_block.1);
        let padding = (
            bound.0.saturating_sub(self.raster.0),
            bound.1.saturating_sub(self.raster.1),
        );
        TileWindow {
            cell: (col, row),
            offset,
            valid: (self.read_block.0 - padding.0, self.read_block.1 - padding.1),
            padding,
        }
    }

    /// All windows in row-major grid order, the order tiles are emitted in.
    pub fn windows(&self) -> impl Iterator<Item = TileWindow> + '_ {
        let (cols, rows) = self.grid;
        (0..rows).flat_map(move |row| (0..cols).map(move |col| self.window(col, row)))
    }
}
