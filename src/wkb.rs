//! WKT Raster WKB serialization, protocol version 0.
//!
//! One record per tile: a fixed 61-byte header, then per band a flags/type
//! byte, a nodata value in the pixel's native width, and either the row-major
//! pixel payload (in-db) or a file reference (out-db). All multi-byte fields
//! are little-endian; the textual transport is the uppercase hex encoding of
//! the record.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{LoaderError, Result};
use crate::pixel::{PixelBuffer, PixelType};

/// NDR marker, the only endianness this encoder emits.
pub const LITTLE_ENDIAN: u8 = 1;
/// The only supported protocol version.
pub const WKB_VERSION: u16 = 0;
/// Header length in bytes, before the first band section.
pub const HEADER_SIZE: usize = 61;

const FLAG_HAS_NODATA: u8 = 0x40;
const FLAG_OUT_DB: u8 = 0x80;

/// Builder for one tile's serialized record.
pub struct RecordBuilder {
    buf: Vec<u8>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn expect_len(&self, expected: usize) -> Result<()> {
        if self.buf.len() != expected {
            return Err(LoaderError::RecordLength {
                got: self.buf.len(),
                expected,
            });
        }
        Ok(())
    }

    /// Write the record header. `scale` and `origin` are already computed for
    /// the tile and level; `tile` is the emitted block size.
    pub fn raster_header(
        &mut self,
        band_count: u16,
        scale: (f64, f64),
        origin: (f64, f64),
        skew: (f64, f64),
        srid: i32,
        tile: (u16, u16),
    ) -> Result<()> {
        self.buf.write_u8(LITTLE_ENDIAN)?;
        self.buf.write_u16::<LittleEndian>(WKB_VERSION)?;
        self.buf.write_u16::<LittleEndian>(band_count)?;
        self.expect_len(5)?;

        self.buf.write_f64::<LittleEndian>(scale.0)?;
        self.buf.write_f64::<LittleEndian>(scale.1)?;
        self.buf.write_f64::<LittleEndian>(origin.0)?;
        self.buf.write_f64::<LittleEndian>(origin.1)?;
        self.buf.write_f64::<LittleEndian>(skew.0)?;
        self.buf.write_f64::<LittleEndian>(skew.1)?;
        self.buf.write_i32::<LittleEndian>(srid)?;
        self.expect_len(57)?;

        self.buf.write_u16::<LittleEndian>(tile.0)?;
        self.buf.write_u16::<LittleEndian>(tile.1)?;
        self.expect_len(HEADER_SIZE)
    }

    /// Write one band's flags/type byte and its nodata value. An absent
    /// nodata leaves the flag clear and stores an explicit zero placeholder.
    pub fn band_header(
        &mut self,
        pixel_type: PixelType,
        nodata: Option<f64>,
        out_db: bool,
    ) -> Result<()> {
        let start = self.buf.len();

        let mut flags = pixel_type.wkb_id();
        if nodata.is_some() {
            flags |= FLAG_HAS_NODATA;
        }
        if out_db {
            flags |= FLAG_OUT_DB;
        }
        self.buf.write_u8(flags)?;

        let value = nodata.unwrap_or(0.0);
        match pixel_type {
            PixelType::U8 => self.buf.write_u8(value as u8)?,
            PixelType::I16 => self.buf.write_i16::<LittleEndian>(value as i16)?,
            PixelType::U16 => self.buf.write_u16::<LittleEndian>(value as u16)?,
            PixelType::I32 => self.buf.write_i32::<LittleEndian>(value as i32)?,
            PixelType::U32 => self.buf.write_u32::<LittleEndian>(value as u32)?,
            PixelType::F32 => self.buf.write_f32::<LittleEndian>(value as f32)?,
            PixelType::F64 => self.buf.write_f64::<LittleEndian>(value)?,
        }

        self.expect_len(start + 1 + pixel_type.width())
    }

    /// Write an in-db band payload: the padded block's pixels, row-major, in
    /// native width. The block must already be exactly tile-sized.
    pub fn band_pixels(&mut self, block: &PixelBuffer) -> Result<()> {
        let start = self.buf.len();
        let (width, height) = block.dimensions();
        block.write_le(&mut self.buf)?;
        self.expect_len(start + width * height * block.pixel_type().width())
    }

    /// Write an out-db band payload: 0-based band index, the absolute source
    /// path with backslashes doubled, and a zero terminator.
    pub fn band_reference(&mut self, band_index: u8, path: &str) -> Result<()> {
        let escaped = path.replace('\\', "\\\\");
        self.buf.write_u8(band_index)?;
        self.buf.extend_from_slice(escaped.as_bytes());
        self.buf.write_u8(0)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the record into its uppercase hex transport form.
    pub fn into_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        let mut out = String::with_capacity(self.buf.len() * 2);
        for byte in &self.buf {
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0F) as usize] as char);
        }
        out
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordBuilder, HEADER_SIZE};
    use crate::pixel::{PixelBuffer, PixelType};
    use ndarray::Array2;

    fn header_record() -> RecordBuilder {
        let mut record = RecordBuilder::new();
        record
            .raster_header(
                1,
                (0.5, -0.5),
                (100.0, 200.0),
                (0.0, 0.0),
                4326,
                (4, 4),
            )
            .expect("header");
        record
    }

    #[test]
    fn header_is_61_bytes() {
        let record = header_record();
        assert_eq!(record.len(), HEADER_SIZE);
        let hex = record.into_hex();
        assert_eq!(hex.len(), HEADER_SIZE * 2);
        assert_eq!(hex.len() % 2, 0);
        // Endianness marker, version 0, one band.
        assert!(hex.starts_with("0100000100"));
    }

    #[test]
    fn header_encodes_srid_and_tile_size() {
        let hex = header_record().into_hex();
        // SRID 4326 = 0x10E6 little-endian at byte offset 53.
        assert_eq!(&hex[53 * 2..57 * 2], "E6100000");
        // 4x4 tile at offset 57.
        assert_eq!(&hex[57 * 2..], "04000400");
    }

    #[test]
    fn band_header_sets_nodata_and_outdb_flags() {
        let mut record = RecordBuilder::new();
        record
            .band_header(PixelType::U8, Some(255.0), false)
            .expect("band header");
        // 0x40 nodata flag | pixel type 4, then the value in one byte.
        assert_eq!(record.into_hex(), "44FF");

        let mut record = RecordBuilder::new();
        record
            .band_header(PixelType::U8, None, true)
            .expect("band header");
        // 0x80 out-db flag | pixel type 4, zero placeholder.
        assert_eq!(record.into_hex(), "8400");
    }

    #[test]
    fn nodata_uses_native_width() {
        let mut record = RecordBuilder::new();
        record
            .band_header(PixelType::F64, Some(-9999.0), false)
            .expect("band header");
        assert_eq!(record.len(), 1 + 8);

        let mut record = RecordBuilder::new();
        record
            .band_header(PixelType::I16, Some(-1.0), false)
            .expect("band header");
        assert_eq!(record.into_hex(), "45FFFF");
    }

    #[test]
    fn in_db_payload_is_exactly_block_times_width() {
        let block = PixelBuffer::U16(Array2::from_elem((4, 4), 7u16));
        let mut record = RecordBuilder::new();
        record.band_pixels(&block).expect("pixels");
        assert_eq!(record.len(), 4 * 4 * 2);
    }

    #[test]
    fn out_db_payload_is_index_path_terminator() {
        let mut record = RecordBuilder::new();
        record
            .band_reference(2, "/data/raster.tif")
            .expect("reference");
        let hex = record.into_hex();
        assert!(hex.starts_with("02"));
        assert!(hex.ends_with("00"));
        assert_eq!(record_len(&hex), 1 + "/data/raster.tif".len() + 1);
    }

    #[test]
    fn out_db_path_doubles_backslashes() {
        let mut record = RecordBuilder::new();
        record
            .band_reference(0, r"C:\data\r.tif")
            .expect("reference");
        assert_eq!(record_len(&record.into_hex()), 1 + r"C:\\data\\r.tif".len() + 1);
    }

    #[test]
    fn encoding_is_deterministic() {
        let encode = || {
            let mut record = header_record();
            record
                .band_header(PixelType::U8, Some(0.0), false)
                .expect("band header");
            record
                .band_pixels(&PixelBuffer::U8(Array2::from_elem((4, 4), 42u8)))
                .expect("pixels");
            record.into_hex()
        };
        assert_eq!(encode(), encode());
    }

    fn record_len(hex: &str) -> usize {
        assert_eq!(hex.len() % 2, 0, "hex length must be even");
        hex.len() / 2
    }
}
