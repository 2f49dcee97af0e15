use std::ops::Range;
use std::path::PathBuf;

use log::warn;

use crate::error::{LoaderError, Result};
use crate::grid::overview_factor;
use crate::pixel::{PixelBuffer, PixelType};

/// The 6-coefficient affine mapping from pixel indices to georeferenced
/// coordinates, in GDAL order: origin x, pixel width, x skew, origin y,
/// y skew, pixel height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl Default for GeoTransform {
    fn default() -> Self {
        // What GDAL reports for a raster without georeferencing.
        GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }
}

impl GeoTransform {
    /// Map a pixel coordinate to a georeferenced coordinate.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let gt = &self.0;
        let xgeo = gt[0] + gt[1] * x + gt[2] * y;
        let ygeo = gt[3] + gt[4] * x + gt[5] * y;
        (xgeo, ygeo)
    }

    /// Pixel resolution scaled for an overview level; only the pixel sizes
    /// change, origin and skew keep their base values.
    pub fn scaled(&self, level: usize) -> GeoTransform {
        let gt = &self.0;
        GeoTransform([
            gt[0],
            gt[1] * level as f64,
            gt[2],
            gt[3],
            gt[4],
            gt[5] * level as f64,
        ])
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.0[1], self.0[5])
    }

    pub fn skew(&self) -> (f64, f64) {
        (self.0[2], self.0[4])
    }
}

/// One band of an opened raster.
#[derive(Clone, Debug)]
pub struct RasterBand {
    pub pixel_type: PixelType,
    /// Declared nodata value; a NaN declaration is normalized to `None` at
    /// extraction time, so padding for such bands uses zero.
    pub nodata: Option<f64>,
    /// Full-band pixel data, row-major.
    pub data: PixelBuffer,
    /// Natural block size reported by the source format.
    pub native_block: (usize, usize),
    /// Dimensions of the band's reduced-resolution overviews, largest first.
    pub overviews: Vec<(usize, usize)>,
}

/// An opened, immutable source raster with its bands and georeference.
#[derive(Clone, Debug)]
pub struct RasterDataset {
    pub(crate) path: PathBuf,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) geo_transform: GeoTransform,
    /// SRID read from the source metadata, if any.
    pub(crate) srid: Option<i32>,
    pub(crate) bands: Vec<RasterBand>,
}

impl RasterDataset {
    /// Build a dataset from already-decoded parts. Used by the GeoTIFF opener
    /// and directly for in-memory rasters.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        geo_transform: GeoTransform,
        srid: Option<i32>,
        bands: Vec<RasterBand>,
    ) -> Result<Self> {
        let (width, height) = match bands.first() {
            Some(band) => band.data.dimensions(),
            None => {
                return Err(LoaderError::Message(
                    "raster has no bands".to_string(),
                ))
            }
        };
        for (idx, band) in bands.iter().enumerate() {
            if band.data.dimensions() != (width, height) {
                return Err(LoaderError::UnsupportedSampleLayout(format!(
                    "band {} is {:?}, expected {:?}",
                    idx + 1,
                    band.data.dimensions(),
                    (width, height)
                )));
            }
        }
        Ok(Self {
            path: path.into(),
            width,
            height,
            geo_transform,
            srid,
            bands,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn srid(&self) -> Option<i32> {
        self.srid
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// 1-based band numbers to process: the selected band alone, or all.
    pub fn band_range(&self, selected: Option<usize>) -> Result<Range<usize>> {
        match selected {
            Some(band) => {
                if band < 1 || band > self.bands.len() {
                    return Err(LoaderError::BandOutOfRange {
                        band,
                        count: self.bands.len(),
                    });
                }
                Ok(band..band + 1)
            }
            None => Ok(1..self.bands.len() + 1),
        }
    }

    /// Access a band by its 1-based number.
    pub fn band(&self, number: usize) -> Result<&RasterBand> {
        self.bands.get(number - 1).ok_or(LoaderError::BandOutOfRange {
            band: number,
            count: self.bands.len(),
        })
    }

    /// Pixel type names for the bands in range, for table registration.
    pub fn pixel_type_names(&self, range: Range<usize>) -> Vec<&'static str> {
        range
            .map(|b| self.bands[b - 1].pixel_type.sql_name())
            .collect()
    }

    /// Declared nodata values for the bands in range; absent ones are skipped.
    pub fn nodata_values(&self, range: Range<usize>) -> Vec<f64> {
        range
            .filter_map(|b| self.bands[b - 1].nodata)
            .collect()
    }

    /// Natural block size shared by the bands in range. Bands are expected to
    /// agree; a mismatch is logged and the first band's size wins.
    pub fn native_block_size(&self, range: Range<usize>) -> Result<(usize, usize)> {
        let mut dims: Option<(usize, usize)> = None;
        for b in range {
            let band = self.band(b)?;
            match dims {
                None => dims = Some(band.native_block),
                Some(expected) if expected != band.native_block => {
                    warn!(
                        "block sizes don't match: {:?} != {:?}",
                        expected, band.native_block
                    );
                }
                Some(_) => {}
            }
        }
        dims.ok_or_else(|| LoaderError::Message("failed to calculate block size".to_string()))
    }

    /// Georeferenced corners of the raster extent, in UL, LL, UR, LR order.
    pub fn bounding_box(&self) -> [(f64, f64); 4] {
        let (w, h) = (self.width as f64, self.height as f64);
        [
            self.geo_transform.apply(0.0, 0.0),
            self.geo_transform.apply(0.0, h),
            self.geo_transform.apply(w, 0.0),
            self.geo_transform.apply(w, h),
        ]
    }

    /// Number of overviews, asserted identical across the bands in range.
    pub fn overview_count(&self, range: Range<usize>) -> Result<usize> {
        let mut count: Option<usize> = None;
        for b in range {
            let n = self.band(b)?.overviews.len();
            match count {
                None => count = Some(n),
                Some(expected) if expected != n => {
                    return Err(LoaderError::OverviewMismatch {
                        band: b,
                        expected,
                        got: n,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(count.unwrap_or(0))
    }

    /// Reduction factor of the overview at `index`, asserted identical for
    /// every band in range.
    pub fn overview_factor_at(&self, range: Range<usize>, index: usize) -> Result<usize> {
        let mut factor: Option<usize> = None;
        for b in range {
            let band = self.band(b)?;
            let (ov_width, _) = *band.overviews.get(index).ok_or(LoaderError::OverviewMismatch {
                band: b,
                expected: index + 1,
                got: band.overviews.len(),
            })?;
            let f = overview_factor(self.width, ov_width);
            match factor {
                None => factor = Some(f),
                Some(expected) if expected != f => {
                    return Err(LoaderError::OverviewMismatch {
                        band: b,
                        expected,
                        got: f,
                    });
                }
                Some(_) => {}
            }
        }
        factor.ok_or_else(|| LoaderError::Message("empty band range".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoTransform, RasterBand, RasterDataset};
    use crate::error::LoaderError;
    use crate::pixel::{PixelBuffer, PixelType};
    use ndarray::Array2;

    fn gray_band(width: usize, height: usize) -> RasterBand {
        RasterBand {
            pixel_type: PixelType::U8,
            nodata: None,
            data: PixelBuffer::U8(Array2::zeros((height, width))),
            native_block: (width, 1),
            overviews: Vec::new(),
        }
    }

    #[test]
    fn geotransform_maps_and_scales() {
        let gt = GeoTransform([100.0, 0.5, 0.0, 200.0, 0.0, -0.5]);
        assert_eq!(gt.apply(0.0, 0.0), (100.0, 200.0));
        assert_eq!(gt.apply(4.0, 2.0), (102.0, 199.0));

        let scaled = gt.scaled(4);
        assert_eq!(scaled.pixel_size(), (2.0, -2.0));
        // Origin and skew are untouched by level scaling.
        assert_eq!(scaled.apply(0.0, 0.0), (100.0, 200.0));
        assert_eq!(scaled.skew(), (0.0, 0.0));
    }

    #[test]
    fn bounding_box_lists_corners_in_order() {
        let gt = GeoTransform([10.0, 1.0, 0.0, 20.0, 0.0, -1.0]);
        let ds = RasterDataset::from_parts("mem", gt, None, vec![gray_band(4, 2)]).expect("parts");
        assert_eq!(
            ds.bounding_box(),
            [(10.0, 20.0), (10.0, 18.0), (14.0, 20.0), (14.0, 18.0)]
        );
    }

    #[test]
    fn band_range_checks_selection() {
        let ds = RasterDataset::from_parts(
            "mem",
            GeoTransform::default(),
            None,
            vec![gray_band(2, 2), gray_band(2, 2), gray_band(2, 2)],
        )
        .expect("parts");

        assert_eq!(ds.band_range(None).expect("all"), 1..4);
        assert_eq!(ds.band_range(Some(2)).expect("one"), 2..3);
        let err = ds.band_range(Some(4)).expect_err("out of range");
        assert!(matches!(
            err,
            LoaderError::BandOutOfRange { band: 4, count: 3 }
        ));
    }

    #[test]
    fn overview_factor_requires_band_agreement() {
        let mut a = gray_band(100, 100);
        a.overviews = vec![(50, 50)];
        let mut b = gray_band(100, 100);
        b.overviews = vec![(25, 25)];

        let ds =
            RasterDataset::from_parts("mem", GeoTransform::default(), None, vec![a.clone(), b])
                .expect("parts");
        let err = ds.overview_factor_at(1..3, 0).expect_err("mismatch");
        assert!(matches!(err, LoaderError::OverviewMismatch { .. }));

        let ds = RasterDataset::from_parts("mem", GeoTransform::default(), None, vec![a.clone(), a])
            .expect("parts");
        assert_eq!(ds.overview_factor_at(1..3, 0).expect("factor"), 2);
    }

    #[test]
    fn native_block_size_prefers_first_band() {
        let mut a = gray_band(64, 64);
        a.native_block = (64, 8);
        let mut b = gray_band(64, 64);
        b.native_block = (32, 32);

        let ds = RasterDataset::from_parts("mem", GeoTransform::default(), None, vec![a, b])
            .expect("parts");
        assert_eq!(ds.native_block_size(1..3).expect("block"), (64, 8));
    }
}
