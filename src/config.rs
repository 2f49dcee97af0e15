use std::path::PathBuf;

use crate::error::{LoaderError, Result};
use crate::sql::schema_table;
use crate::wkb;

/// How the destination table is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableMode {
    /// Create a new table and populate it. The default.
    Create,
    /// Append to an existing table.
    Append,
    /// Drop the table first, then create and populate it.
    Drop,
}

impl TableMode {
    /// Resolve the three mutually exclusive CLI flags; none set means create,
    /// a bare drop implies create.
    pub fn from_flags(create: bool, append: bool, drop: bool) -> Result<Self> {
        match (create, append, drop) {
            (false, false, false) | (true, false, false) => Ok(TableMode::Create),
            (false, false, true) => Ok(TableMode::Drop),
            (false, true, false) => Ok(TableMode::Append),
            _ => Err(LoaderError::ConflictingTableModes),
        }
    }

    /// Whether this run creates the destination table (and so registers it).
    pub fn creates_table(self) -> bool {
        matches!(self, TableMode::Create | TableMode::Drop)
    }
}

/// Requested tiling scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSize {
    /// Fixed tile dimensions.
    Fixed(usize, usize),
    /// Use the natural block size the source format reports.
    Native,
}

/// Parse a block size argument, either `WIDTHxHEIGHT` or `auto`.
pub fn parse_block_size(value: &str) -> Result<BlockSize> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(BlockSize::Native);
    }
    let parts: Vec<&str> = if value.contains('x') {
        value.split('x').collect()
    } else {
        value.split('X').collect()
    };
    if parts.len() != 2 {
        return Err(LoaderError::InvalidBlockSize(value.to_string()));
    }
    let width: usize = parts[0]
        .parse()
        .map_err(|_| LoaderError::InvalidBlockSize(value.to_string()))?;
    let height: usize = parts[1]
        .parse()
        .map_err(|_| LoaderError::InvalidBlockSize(value.to_string()))?;
    if width == 0 || height == 0 {
        return Err(LoaderError::InvalidBlockSize(value.to_string()));
    }
    Ok(BlockSize::Fixed(width, height))
}

/// Validated run options for the loader pipeline.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Input raster paths or glob patterns, at least one required.
    pub rasters: Vec<String>,
    /// Destination in `[schema.]table` form.
    pub table: String,
    /// SRID to assign; falls back to the source's SRID, then -1.
    pub srid: Option<i32>,
    /// 1-based single-band selection.
    pub band: Option<usize>,
    /// Tile size; `None` loads each raster as a single tile.
    pub block_size: Option<BlockSize>,
    /// Register bands out-of-database (by file reference).
    pub out_db: bool,
    /// Overview level, 1 = base raster.
    pub overview_level: usize,
    pub table_mode: TableMode,
    /// Destination raster column name.
    pub column: String,
    /// Add a `filename` column carrying the source file name.
    pub filename_column: bool,
    /// Create a GiST index on the raster column at the end of the run.
    pub create_index: bool,
    /// Emit `VACUUM ANALYZE` after the transaction.
    pub vacuum: bool,
    /// Create the `raster_overviews` catalog table.
    pub create_overview_catalog: bool,
    /// Requested endianness; only NDR (1) is accepted.
    pub endian: u8,
    /// Requested protocol version; only 0 is accepted.
    pub version: u16,
    /// Output file; `None` writes to stdout.
    pub output: Option<PathBuf>,
}

impl LoaderConfig {
    pub fn new(rasters: Vec<String>, table: impl Into<String>) -> Self {
        Self {
            rasters,
            table: table.into(),
            srid: None,
            band: None,
            block_size: None,
            out_db: false,
            overview_level: 1,
            table_mode: TableMode::Create,
            column: "rast".to_string(),
            filename_column: false,
            create_index: false,
            vacuum: false,
            create_overview_catalog: false,
            endian: wkb::LITTLE_ENDIAN,
            version: wkb::WKB_VERSION,
            output: None,
        }
    }

    /// Reject configuration errors before any raster is opened.
    pub fn validate(&self) -> Result<()> {
        if self.rasters.is_empty() {
            return Err(LoaderError::NoInputRasters);
        }
        if self.block_size.is_some() && self.rasters.len() != 1 {
            return Err(LoaderError::BlockedMultiRasterInput);
        }
        if self.overview_level < 1 {
            return Err(LoaderError::InvalidOverviewLevel(self.overview_level));
        }
        if self.overview_level > 1 && self.block_size.is_none() {
            return Err(LoaderError::OverviewRequiresBlocking);
        }
        if self.create_overview_catalog && self.overview_level <= 1 {
            return Err(LoaderError::OverviewCatalogWithoutOverviews);
        }
        if self.version != wkb::WKB_VERSION {
            return Err(LoaderError::UnsupportedVersion(self.version));
        }
        if self.endian != wkb::LITTLE_ENDIAN {
            return Err(LoaderError::UnsupportedEndian(self.endian));
        }
        if let Some(band) = self.band {
            if band < 1 {
                return Err(LoaderError::BandOutOfRange { band, count: 0 });
            }
        }
        schema_table(&self.table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_block_size, BlockSize, LoaderConfig, TableMode};
    use crate::error::LoaderError;

    fn base_config() -> LoaderConfig {
        LoaderConfig::new(vec!["in.tif".to_string()], "public.rasters")
    }

    #[test]
    fn table_modes_are_mutually_exclusive() {
        assert_eq!(
            TableMode::from_flags(false, false, false).expect("default"),
            TableMode::Create
        );
        assert_eq!(
            TableMode::from_flags(false, false, true).expect("drop"),
            TableMode::Drop
        );
        // Only a bare drop implies create; spelling both out is a conflict.
        let err = TableMode::from_flags(true, false, true).expect_err("conflict");
        assert!(matches!(err, LoaderError::ConflictingTableModes));
        let err = TableMode::from_flags(true, true, false).expect_err("conflict");
        assert!(matches!(err, LoaderError::ConflictingTableModes));
        let err = TableMode::from_flags(false, true, true).expect_err("conflict");
        assert!(matches!(err, LoaderError::ConflictingTableModes));
    }

    #[test]
    fn block_size_parsing() {
        assert_eq!(
            parse_block_size("256x256").expect("lower"),
            BlockSize::Fixed(256, 256)
        );
        assert_eq!(
            parse_block_size("64X32").expect("upper"),
            BlockSize::Fixed(64, 32)
        );
        assert_eq!(parse_block_size("auto").expect("auto"), BlockSize::Native);
        assert_eq!(parse_block_size("AUTO").expect("auto"), BlockSize::Native);
        for bad in ["256", "4x4x4", "ax4", "0x4", ""] {
            let err = parse_block_size(bad).expect_err("invalid");
            assert!(matches!(err, LoaderError::InvalidBlockSize(_)), "{bad}");
        }
    }

    #[test]
    fn validate_rejects_unsupported_protocol_options() {
        let mut config = base_config();
        config.version = 1;
        assert!(matches!(
            config.validate().expect_err("version"),
            LoaderError::UnsupportedVersion(1)
        ));

        let mut config = base_config();
        config.endian = 0;
        assert!(matches!(
            config.validate().expect_err("endian"),
            LoaderError::UnsupportedEndian(0)
        ));
    }

    #[test]
    fn validate_overview_prerequisites() {
        let mut config = base_config();
        config.overview_level = 2;
        assert!(matches!(
            config.validate().expect_err("no blocking"),
            LoaderError::OverviewRequiresBlocking
        ));

        config.block_size = Some(BlockSize::Fixed(64, 64));
        config.validate().expect("blocking enables overviews");

        let mut config = base_config();
        config.create_overview_catalog = true;
        assert!(matches!(
            config.validate().expect_err("catalog needs overviews"),
            LoaderError::OverviewCatalogWithoutOverviews
        ));
    }

    #[test]
    fn validate_input_list() {
        let config = LoaderConfig::new(Vec::new(), "t");
        assert!(matches!(
            config.validate().expect_err("empty"),
            LoaderError::NoInputRasters
        ));

        let mut config =
            LoaderConfig::new(vec!["a.tif".to_string(), "b.tif".to_string()], "t");
        config.block_size = Some(BlockSize::Fixed(64, 64));
        assert!(matches!(
            config.validate().expect_err("multi"),
            LoaderError::BlockedMultiRasterInput
        ));
    }

    #[test]
    fn validate_table_name() {
        let config = LoaderConfig::new(vec!["a.tif".to_string()], "a.b.c");
        assert!(matches!(
            config.validate().expect_err("name"),
            LoaderError::InvalidTableName(_)
        ));
    }
}
