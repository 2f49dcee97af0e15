//! Load GeoTIFF rasters into PostGIS WKT Raster tables.
//!
//! The crate turns raster files into an SQL script: each raster is cut into
//! tiles, every tile is serialized to the hex-encoded WKB form the `raster`
//! type accepts, and the surrounding DDL (table creation, raster column
//! registration, overview catalog rows, GiST index) is emitted around the
//! INSERTs. The script is meant to be piped into `psql`.
//!
//! ```no_run
//! use raster2pgsql::{BlockSize, LoaderConfig};
//!
//! # fn main() -> raster2pgsql::Result<()> {
//! let mut config = LoaderConfig::new(vec!["dem.tif".to_string()], "public.dem");
//! config.block_size = Some(BlockSize::Fixed(256, 256));
//! config.create_index = true;
//! let summary = raster2pgsql::run(&config)?;
//! println!("loaded {} file(s)", summary.files);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod geotiff;
pub mod grid;
pub mod loader;
pub mod pixel;
pub mod raster;
mod sql;
pub mod wkb;

pub use config::{parse_block_size, BlockSize, LoaderConfig, TableMode};
pub use error::{LoaderError, Result};
pub use loader::{run, RunSummary};
pub use raster::{GeoTransform, RasterBand, RasterDataset};
