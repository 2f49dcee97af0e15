use std::error::Error;
use std::fmt;

/// Crate error type for the raster loading pipeline.
#[derive(Debug)]
pub enum LoaderError {
    /// Wraps I/O errors from the raster source or the output sink.
    Io(std::io::Error),
    /// Wraps errors returned by the `tiff` decoder.
    Tiff(tiff::TiffError),
    /// More than one of create/append/drop table modes requested.
    ConflictingTableModes,
    /// Block size string is not WIDTHxHEIGHT with positive dimensions.
    InvalidBlockSize(String),
    /// Only protocol version 0 is supported.
    UnsupportedVersion(u16),
    /// Only little-endian (NDR, 1) output is supported.
    UnsupportedEndian(u8),
    /// Overview level must be at least 1.
    InvalidOverviewLevel(usize),
    /// Overview level > 1 requires regular blocking.
    OverviewRequiresBlocking,
    /// The overview catalog table is only created when overviews are imported.
    OverviewCatalogWithoutOverviews,
    /// Regular blocking supports a single input raster only.
    BlockedMultiRasterInput,
    /// No input raster arguments given.
    NoInputRasters,
    /// Destination is not in `[schema.]table` form.
    InvalidTableName(String),
    /// A raster glob pattern matched no files.
    NoMatchingFiles(String),
    /// Requested band does not exist in the source raster.
    BandOutOfRange { band: usize, count: usize },
    /// The source sample layout cannot be mapped to a supported pixel type.
    UnsupportedSampleLayout(String),
    /// Tile dimensions are serialized as u16 and the raster does not fit.
    TileTooLarge { width: usize, height: usize },
    /// Rasters destined for one table must share a pixel size.
    PixelSizeMismatch {
        expected: (f64, f64),
        got: (f64, f64),
    },
    /// Bands of the same raster disagree on overview layout.
    OverviewMismatch {
        band: usize,
        expected: usize,
        got: usize,
    },
    /// A serialized record did not have the byte length the format requires.
    RecordLength { got: usize, expected: usize },
    Message(String),
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Tiff(err) => write!(f, "{err}"),
            Self::ConflictingTableModes => {
                write!(f, "options create, append and drop are mutually exclusive")
            }
            Self::InvalidBlockSize(value) => {
                write!(f, "invalid block size '{value}', expected WIDTHxHEIGHT")
            }
            Self::UnsupportedVersion(version) => write!(
                f,
                "invalid raster protocol version {version}, only version 0 is supported"
            ),
            Self::UnsupportedEndian(endian) => write!(
                f,
                "invalid endianness {endian}, only little-endian (NDR, 1) output is supported"
            ),
            Self::InvalidOverviewLevel(level) => {
                write!(f, "invalid overview level {level}, expected a level >= 1")
            }
            Self::OverviewRequiresBlocking => write!(
                f,
                "regular blocking mode required to enable overviews support (level > 1)"
            ),
            Self::OverviewCatalogWithoutOverviews => write!(
                f,
                "raster_overviews table is created only when an overview import is requested"
            ),
            Self::BlockedMultiRasterInput => {
                write!(f, "regular blocking supports single-raster input only")
            }
            Self::NoInputRasters => write!(f, "at least one input raster is required"),
            Self::InvalidTableName(name) => write!(
                f,
                "invalid format of table name '{name}', expected [<schema>.]table"
            ),
            Self::NoMatchingFiles(pattern) => {
                write!(f, "no input raster files found for '{pattern}'")
            }
            Self::BandOutOfRange { band, count } => {
                write!(f, "band {band} out of range, raster has {count} band(s)")
            }
            Self::UnsupportedSampleLayout(detail) => {
                write!(f, "unsupported sample layout: {detail}")
            }
            Self::TileTooLarge { width, height } => write!(
                f,
                "tile of {width}x{height} pixels does not fit the 16-bit tile dimensions"
            ),
            Self::PixelSizeMismatch { expected, got } => write!(
                f,
                "cannot load raster with pixel size ({}, {}) into a table holding ({}, {})",
                got.0, got.1, expected.0, expected.1
            ),
            Self::OverviewMismatch {
                band,
                expected,
                got,
            } => write!(
                f,
                "band {band} reports overview layout {got}, expected {expected} like the other bands"
            ),
            Self::RecordLength { got, expected } => write!(
                f,
                "invalid serialized record length of {got} byte(s), expected {expected}"
            ),
            Self::Message(message) => write!(f, "{message}"),
        }
    }
}

impl Error for LoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Tiff(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tiff::TiffError> for LoaderError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Tiff(err)
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
