//! GeoTIFF metadata extraction on top of the `tiff` decoder.
//!
//! The first IFD is the full-resolution image; later IFDs flagged as reduced
//! resolution contribute only their dimensions, as the overview pyramid of the
//! dataset. Georeferencing follows the GeoTIFF convention: ModelPixelScale
//! plus ModelTiepoint when present, the full ModelTransformation matrix
//! otherwise.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::warn;
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::{LoaderError, Result};
use crate::pixel::PixelBuffer;
use crate::raster::{GeoTransform, RasterBand, RasterDataset};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
const KEY_PROJECTED_TYPE: u32 = 3072;
const CODE_USER_DEFINED: u32 = 32767;

fn geo_tag(id: u16) -> Tag {
    Tag::from_u16_exhaustive(id)
}

fn tag_u32<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<u32>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_u32()?)),
        None => Ok(None),
    }
}

fn tag_u32_vec<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<u32>>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_u32_vec()?)),
        None => Ok(None),
    }
}

fn tag_f64_vec<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

fn tag_string<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<String>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_string()?)),
        None => Ok(None),
    }
}

/// Parse the GDAL_NODATA ascii tag. A declared NaN cannot be matched against
/// pixel values, so it is treated as no declaration at all.
fn parse_nodata(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_end_matches('\0').trim();
    let value: f64 = trimmed.parse().ok()?;
    if value.is_nan() {
        warn!("ignoring NaN nodata declaration");
        return None;
    }
    Some(value)
}

/// Pull an EPSG code out of a GeoKeyDirectory. The projected CS key wins over
/// the geographic one; undefined and user-defined codes carry no EPSG number.
fn srid_from_geo_keys(directory: &[u32]) -> Option<i32> {
    if directory.len() < 4 {
        return None;
    }
    let count = directory[3] as usize;
    let mut geographic = None;
    let mut projected = None;
    for entry in directory[4..].chunks_exact(4).take(count) {
        let (key, location, code) = (entry[0], entry[1], entry[3]);
        // A nonzero location means the value lives in another tag.
        if location != 0 || code == 0 || code == CODE_USER_DEFINED {
            continue;
        }
        match key {
            KEY_PROJECTED_TYPE => projected = Some(code as i32),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(code as i32),
            _ => {}
        }
    }
    projected.or(geographic)
}

/// Combine the georeferencing tags into a GDAL-order geotransform. With none
/// of them present the identity transform with a top-left origin is used.
fn resolve_geo_transform(
    scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    transformation: Option<&[f64]>,
) -> GeoTransform {
    if let (Some(scale), Some(tie)) = (scale, tiepoint) {
        if scale.len() >= 2 && tie.len() >= 6 {
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            return GeoTransform([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]);
        }
    }
    if let Some(t) = transformation {
        if t.len() >= 16 {
            return GeoTransform([t[3], t[0], t[1], t[7], t[4], t[5]]);
        }
    }
    GeoTransform::default()
}

fn deinterleave<T: Copy>(
    data: &[T],
    width: usize,
    height: usize,
    samples: usize,
) -> Result<Vec<Array2<T>>> {
    if data.len() != width * height * samples {
        return Err(LoaderError::UnsupportedSampleLayout(format!(
            "decoded {} samples for a {}x{}x{} image",
            data.len(),
            width,
            height,
            samples
        )));
    }
    (0..samples)
        .map(|band| {
            let pixels: Vec<T> = data.iter().copied().skip(band).step_by(samples).collect();
            Array2::from_shape_vec((height, width), pixels)
                .map_err(|err| LoaderError::Message(err.to_string()))
        })
        .collect()
}

/// Split an interleaved decode into one native-typed buffer per band.
fn split_bands(
    decoded: DecodingResult,
    width: usize,
    height: usize,
    samples: usize,
) -> Result<Vec<PixelBuffer>> {
    match decoded {
        DecodingResult::U8(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::U8)
            .collect()),
        DecodingResult::I16(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::I16)
            .collect()),
        DecodingResult::U16(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::U16)
            .collect()),
        DecodingResult::I32(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::I32)
            .collect()),
        DecodingResult::U32(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::U32)
            .collect()),
        DecodingResult::F32(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::F32)
            .collect()),
        DecodingResult::F64(data) => Ok(deinterleave(&data, width, height, samples)?
            .into_iter()
            .map(PixelBuffer::F64)
            .collect()),
        _ => Err(LoaderError::UnsupportedSampleLayout(
            "sample format has no WKT Raster pixel type".to_string(),
        )),
    }
}

/// Open a GeoTIFF and extract its bands, georeference and overview layout.
pub fn open(path: impl AsRef<Path>) -> Result<RasterDataset> {
    let path = path.as_ref();
    let decoder = Decoder::new(File::open(path)?)?;
    let mut decoder = decoder.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let samples = tag_u32(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1) as usize;
    let planar = tag_u32(&mut decoder, Tag::PlanarConfiguration)?.unwrap_or(1);
    if planar != 1 && samples > 1 {
        return Err(LoaderError::UnsupportedSampleLayout(format!(
            "planar configuration {planar}"
        )));
    }

    let scale = tag_f64_vec(&mut decoder, geo_tag(TAG_MODEL_PIXEL_SCALE))?;
    let tiepoint = tag_f64_vec(&mut decoder, geo_tag(TAG_MODEL_TIEPOINT))?;
    let transformation = tag_f64_vec(&mut decoder, geo_tag(TAG_MODEL_TRANSFORMATION))?;
    let geo_transform = resolve_geo_transform(
        scale.as_deref(),
        tiepoint.as_deref(),
        transformation.as_deref(),
    );

    let srid = tag_u32_vec(&mut decoder, geo_tag(TAG_GEO_KEY_DIRECTORY))?
        .as_deref()
        .and_then(srid_from_geo_keys);

    let nodata = tag_string(&mut decoder, geo_tag(TAG_GDAL_NODATA))?
        .as_deref()
        .and_then(parse_nodata);

    let tile_width = tag_u32(&mut decoder, Tag::TileWidth)?;
    let tile_length = tag_u32(&mut decoder, Tag::TileLength)?;
    let native_block = match (tile_width, tile_length) {
        (Some(w), Some(h)) => (w as usize, h as usize),
        _ => {
            let rows = tag_u32(&mut decoder, Tag::RowsPerStrip)?
                .map(|r| r as usize)
                .unwrap_or(height);
            (width, rows.min(height))
        }
    };

    let buffers = split_bands(decoder.read_image()?, width, height, samples)?;

    let mut overviews = Vec::new();
    while decoder.more_images() {
        decoder.next_image()?;
        let subfile_type = tag_u32(&mut decoder, Tag::NewSubfileType)?.unwrap_or(0);
        if subfile_type & 1 == 1 {
            let (ov_width, ov_height) = decoder.dimensions()?;
            overviews.push((ov_width as usize, ov_height as usize));
        }
    }

    let bands = buffers
        .into_iter()
        .map(|data| RasterBand {
            pixel_type: data.pixel_type(),
            nodata,
            data,
            native_block,
            overviews: overviews.clone(),
        })
        .collect();

    RasterDataset::from_parts(path, geo_transform, srid, bands)
}
