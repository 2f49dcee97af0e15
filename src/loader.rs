//! The loading pipeline: expand the input file list, open each raster, cut it
//! into tiles, serialize every tile and emit the SQL script around them.
//!
//! One run loads one pyramid level into one table. The base level (1) also
//! registers the raster column; higher levels load `o_<level>_<table>` and add
//! a row to the overview catalog.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use log::{debug, warn};

use crate::config::{BlockSize, LoaderConfig, TableMode};
use crate::error::{LoaderError, Result};
use crate::geotiff;
use crate::grid::LevelPlan;
use crate::raster::RasterDataset;
use crate::sql;
use crate::wkb::RecordBuilder;

/// What a finished run produced, for the end-of-run report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of source rasters processed.
    pub files: usize,
    /// Loaded tables with their tile counts.
    pub tables: Vec<(String, usize)>,
}

/// Execute a validated configuration, writing the SQL script to the
/// configured output file or to stdout.
pub fn run(config: &LoaderConfig) -> Result<RunSummary> {
    config.validate()?;
    let paths = expand_rasters(&config.rasters)?;
    let datasets = paths.iter().map(geotiff::open);
    match &config.output {
        Some(path) => {
            let mut file = File::create(path)?;
            load_all(config, datasets, &mut file)
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            load_all(config, datasets, &mut lock)
        }
    }
}

/// Expand each input argument as a glob pattern; a plain path matches itself.
fn expand_rasters(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let before = paths.len();
        let matches =
            glob::glob(pattern).map_err(|err| LoaderError::Message(err.to_string()))?;
        for entry in matches {
            paths.push(entry.map_err(|err| LoaderError::Message(err.to_string()))?);
        }
        if paths.len() == before {
            return Err(LoaderError::NoMatchingFiles(pattern.clone()));
        }
    }
    Ok(paths)
}

/// Write the full SQL script for a sequence of opened datasets.
fn load_all<W, I>(config: &LoaderConfig, datasets: I, sink: &mut W) -> Result<RunSummary>
where
    W: Write,
    I: IntoIterator<Item = Result<RasterDataset>>,
{
    let (schema, base_table) = sql::schema_table(&config.table)?;
    let level = config.overview_level;
    let target_table = if level > 1 {
        format!("o_{level}_{base_table}")
    } else {
        base_table.clone()
    };

    sink.write_all(sql::SQL_BEGIN.as_bytes())?;

    if config.create_overview_catalog {
        sink.write_all(sql::create_raster_overviews(&schema).as_bytes())?;
    }
    // Drop applies to the base table only; overview tables are never dropped.
    if config.table_mode == TableMode::Drop && level == 1 {
        sink.write_all(sql::drop_raster_table(&schema, &target_table).as_bytes())?;
    }
    if config.table_mode.creates_table() {
        sink.write_all(
            sql::create_table(
                &schema,
                &target_table,
                &config.column,
                config.filename_column,
                level > 1,
            )
            .as_bytes(),
        )?;
    }

    let mut files = 0usize;
    let mut tiles = 0usize;
    let mut pixel_size: Option<(f64, f64)> = None;

    for dataset in datasets {
        let dataset = dataset?;
        let size = dataset.geo_transform().pixel_size();
        match pixel_size {
            None => pixel_size = Some(size),
            Some(expected) if expected != size => {
                return Err(LoaderError::PixelSizeMismatch {
                    expected,
                    got: size,
                });
            }
            Some(_) => {}
        }
        tiles += process_dataset(
            config,
            &schema,
            &base_table,
            &target_table,
            &dataset,
            files == 0,
            sink,
        )?;
        files += 1;
    }
    if files == 0 {
        return Err(LoaderError::NoInputRasters);
    }

    if config.create_index {
        sink.write_all(sql::create_gist_index(&schema, &target_table, &config.column).as_bytes())?;
    }
    sink.write_all(sql::SQL_END.as_bytes())?;
    if config.vacuum {
        sink.write_all(sql::vacuum(&schema, &target_table).as_bytes())?;
    }
    sink.flush()?;

    Ok(RunSummary {
        files,
        tables: vec![(format!("{schema}.{target_table}"), tiles)],
    })
}

/// Tile one dataset into the target table, returning the tile count.
fn process_dataset<W: Write>(
    config: &LoaderConfig,
    schema: &str,
    base_table: &str,
    target_table: &str,
    dataset: &RasterDataset,
    first: bool,
    sink: &mut W,
) -> Result<usize> {
    let level = config.overview_level;
    let range = dataset.band_range(config.band)?;
    let srid = config.srid.or(dataset.srid()).unwrap_or(-1);

    if level > 1 {
        let declared = dataset.overview_count(range.clone())?;
        if declared > 0 {
            let mut factors = Vec::with_capacity(declared);
            for index in 0..declared {
                factors.push(dataset.overview_factor_at(range.clone(), index)?);
            }
            if !factors.contains(&level) {
                warn!(
                    "{} declares overview factors {:?}, not the requested {}",
                    dataset.path().display(),
                    factors,
                    level
                );
            }
        }
    }

    let block = match config.block_size {
        Some(BlockSize::Fixed(width, height)) => Some((width, height)),
        Some(BlockSize::Native) => Some(dataset.native_block_size(range.clone())?),
        None => None,
    };
    let plan = LevelPlan::new(dataset.size(), block, level);
    if plan.block.0 > u16::MAX as usize || plan.block.1 > u16::MAX as usize {
        return Err(LoaderError::TileTooLarge {
            width: plan.block.0,
            height: plan.block.1,
        });
    }

    if first && config.table_mode.creates_table() {
        if level == 1 {
            let pixel_types = dataset.pixel_type_names(range.clone());
            let nodata = dataset.nodata_values(range.clone());
            let registration = sql::RasterRegistration {
                schema,
                table: base_table,
                column: &config.column,
                srid,
                pixel_types: &pixel_types,
                out_db: config.out_db,
                nodata: &nodata,
                pixel_size: dataset.geo_transform().pixel_size(),
                blocking: block.map(|block| sql::Blocking {
                    block,
                    extent: dataset.bounding_box(),
                }),
            };
            sink.write_all(sql::add_raster_column(&registration).as_bytes())?;
        } else {
            sink.write_all(
                sql::register_overview(schema, target_table, base_table, &config.column, level)
                    .as_bytes(),
            )?;
        }
    }

    let gt = dataset.geo_transform();
    let scale = gt.scaled(level).pixel_size();
    let filename = if config.filename_column {
        dataset
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    } else {
        None
    };
    let out_db_path = if config.out_db {
        let absolute = std::fs::canonicalize(dataset.path())
            .unwrap_or_else(|_| dataset.path().to_path_buf());
        Some(absolute.to_string_lossy().into_owned())
    } else {
        None
    };

    let mut count = 0usize;
    for window in plan.windows() {
        let mut record = RecordBuilder::new();
        record.raster_header(
            range.len() as u16,
            scale,
            gt.apply(window.offset.0 as f64, window.offset.1 as f64),
            gt.skew(),
            srid,
            (plan.block.0 as u16, plan.block.1 as u16),
        )?;

        for b in range.clone() {
            let band = dataset.band(b)?;
            match &out_db_path {
                Some(path) => {
                    record.band_header(band.pixel_type, band.nodata, true)?;
                    record.band_reference((b - 1) as u8, path)?;
                }
                None => {
                    record.band_header(band.pixel_type, band.nodata, false)?;
                    if band.nodata.is_none() && (window.padding.0 > 0 || window.padding.1 > 0) {
                        debug!(
                            "band {} of {} has no nodata value, padding with zero",
                            b,
                            dataset.path().display()
                        );
                    }
                    let block = band.data.block(
                        window.offset.0,
                        window.offset.1,
                        window.valid.0,
                        window.valid.1,
                        level,
                        plan.block.0,
                        plan.block.1,
                        band.nodata.unwrap_or(0.0),
                    );
                    record.band_pixels(&block)?;
                }
            }
        }

        sink.write_all(
            sql::insert_tile(
                schema,
                target_table,
                &config.column,
                &record.into_hex(),
                filename.as_deref(),
            )
            .as_bytes(),
        )?;
        count += 1;
    }
    Ok(count)
}
