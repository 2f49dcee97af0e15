use ndarray::Array2;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::Result;

/// WKT Raster pixel types supported by protocol version 0.
///
/// The serialized identifiers follow the PostGIS `rt_pixtype` table; gaps in
/// the numbering (9, for example) belong to types this format never emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelType {
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PixelType {
    /// Identifier stored in the low bits of the band flags byte.
    #[inline]
    pub fn wkb_id(self) -> u8 {
        match self {
            PixelType::U8 => 4,
            PixelType::I16 => 5,
            PixelType::U16 => 6,
            PixelType::I32 => 7,
            PixelType::U32 => 8,
            PixelType::F32 => 10,
            PixelType::F64 => 11,
        }
    }

    /// Width of one pixel (and of the nodata field) in bytes.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::I16 | PixelType::U16 => 2,
            PixelType::I32 | PixelType::U32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }

    /// Name in the format returned by `rt_pixtype_name`, minus the `PT_` prefix.
    #[inline]
    pub fn sql_name(self) -> &'static str {
        match self {
            PixelType::U8 => "8BUI",
            PixelType::I16 => "16BSI",
            PixelType::U16 => "16BUI",
            PixelType::I32 => "32BSI",
            PixelType::U32 => "32BUI",
            PixelType::F32 => "32BF",
            PixelType::F64 => "64BF",
        }
    }
}

/// One band's pixel data in its native type, row-major.
///
/// A tagged union instead of a type-keyed lookup table so every conversion
/// site is a total match and an unsupported type cannot fall through to a
/// default.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    U8(Array2<u8>),
    I16(Array2<i16>),
    U16(Array2<u16>),
    I32(Array2<i32>),
    U32(Array2<u32>),
    F32(Array2<f32>),
    F64(Array2<f64>),
}

/// Assemble one output block from a read window of the base raster.
///
/// The window starts at (`xoff`, `yoff`) and covers `valid_w` x `valid_h`
/// source pixels, the part of the `level`-scaled read window that lies inside
/// the raster. The output is always `block_w` x `block_h`: the valid region is
/// downsampled by `level` (nearest neighbour, pixel-center rule) into the
/// upper-left corner and everything else is filled with `fill`.
fn sample_block<T: Copy>(
    data: &Array2<T>,
    xoff: usize,
    yoff: usize,
    valid_w: usize,
    valid_h: usize,
    level: usize,
    block_w: usize,
    block_h: usize,
    fill: T,
) -> Array2<T> {
    let mut out = Array2::from_elem((block_h, block_w), fill);
    let target_w = (valid_w / level).min(block_w);
    let target_h = (valid_h / level).min(block_h);

    for ty in 0..target_h {
        let sy = yoff + ty * level + level / 2;
        for tx in 0..target_w {
            let sx = xoff + tx * level + level / 2;
            out[(ty, tx)] = data[(sy, sx)];
        }
    }
    out
}

impl PixelBuffer {
    #[inline]
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelBuffer::U8(_) => PixelType::U8,
            PixelBuffer::I16(_) => PixelType::I16,
            PixelBuffer::U16(_) => PixelType::U16,
            PixelBuffer::I32(_) => PixelType::I32,
            PixelBuffer::U32(_) => PixelType::U32,
            PixelBuffer::F32(_) => PixelType::F32,
            PixelBuffer::F64(_) => PixelType::F64,
        }
    }

    /// (width, height) of the underlying array.
    pub fn dimensions(&self) -> (usize, usize) {
        let (rows, cols) = match self {
            PixelBuffer::U8(a) => a.dim(),
            PixelBuffer::I16(a) => a.dim(),
            PixelBuffer::U16(a) => a.dim(),
            PixelBuffer::I32(a) => a.dim(),
            PixelBuffer::U32(a) => a.dim(),
            PixelBuffer::F32(a) => a.dim(),
            PixelBuffer::F64(a) => a.dim(),
        };
        (cols, rows)
    }

    /// Cut one output block out of this band, see [`sample_block`].
    ///
    /// `nodata` is cast to the band's native type before filling the padding.
    #[allow(clippy::too_many_arguments)]
    pub fn block(
        &self,
        xoff: usize,
        yoff: usize,
        valid_w: usize,
        valid_h: usize,
        level: usize,
        block_w: usize,
        block_h: usize,
        nodata: f64,
    ) -> PixelBuffer {
        match self {
            PixelBuffer::U8(a) => PixelBuffer::U8(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata as u8,
            )),
            PixelBuffer::I16(a) => PixelBuffer::I16(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata as i16,
            )),
            PixelBuffer::U16(a) => PixelBuffer::U16(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata as u16,
            )),
            PixelBuffer::I32(a) => PixelBuffer::I32(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata as i32,
            )),
            PixelBuffer::U32(a) => PixelBuffer::U32(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata as u32,
            )),
            PixelBuffer::F32(a) => PixelBuffer::F32(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata as f32,
            )),
            PixelBuffer::F64(a) => PixelBuffer::F64(sample_block(
                a, xoff, yoff, valid_w, valid_h, level, block_w, block_h, nodata,
            )),
        }
    }

    /// Serialize all pixels row-major in native width, little-endian.
    pub fn write_le(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            PixelBuffer::U8(a) => {
                for v in a.iter() {
                    out.write_u8(*v)?;
                }
            }
            PixelBuffer::I16(a) => {
                for v in a.iter() {
                    out.write_i16::<LittleEndian>(*v)?;
                }
            }
            PixelBuffer::U16(a) => {
                for v in a.iter() {
                    out.write_u16::<LittleEndian>(*v)?;
                }
            }
            PixelBuffer::I32(a) => {
                for v in a.iter() {
                    out.write_i32::<LittleEndian>(*v)?;
                }
            }
            PixelBuffer::U32(a) => {
                for v in a.iter() {
                    out.write_u32::<LittleEndian>(*v)?;
                }
            }
            PixelBuffer::F32(a) => {
                for v in a.iter() {
                    out.write_f32::<LittleEndian>(*v)?;
                }
            }
            PixelBuffer::F64(a) => {
                for v in a.iter() {
                    out.write_f64::<LittleEndian>(*v)?;
                }
            }
        }
        Ok(())
    }
}
