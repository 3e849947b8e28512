use super::*;
use decoder::LEGACY_MARKER;
use std::io::{BufWriter, Write};

/// Write-time options for the pathmap binary format. The legacy marker and
/// the record variant are independent choices.
#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    /// Write `data_offset == 2` and the 8-byte legacy marker after the
    /// header. On by default, matching the stock game files.
    pub legacy_marker: bool,
    /// Write a bitmask for every tile instead of only for Mixed tiles,
    /// filling uniform tiles with all-0/all-0xff masks.
    pub full_records: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            legacy_marker: true,
            full_records: false,
        }
    }
}

#[derive(Debug)]
pub enum EncodeError {
    IoError(std::io::Error),
    /// Tiles per side must be a power of two no greater than 256.
    InvalidTileCount(usize),
    /// Tile resolution must encode to a log2 in 6..=12.
    InvalidTileResolution(usize),
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(err: std::io::Error) -> Self {
        EncodeError::IoError(err)
    }
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::IoError(e) => write!(f, "IO error: {}", e),
            EncodeError::InvalidTileCount(n) => write!(f, "invalid tiles per side: {}", n),
            EncodeError::InvalidTileResolution(n) => write!(f, "invalid tile resolution: {}", n),
        }
    }
}

#[derive(Debug)]
pub struct Encoder<W: Write> {
    writer: BufWriter<W>,
    options: EncodeOptions,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Encoder::with_options(writer, EncodeOptions::default())
    }

    pub fn with_options(writer: W, options: EncodeOptions) -> Self {
        Encoder {
            writer: BufWriter::new(writer),
            options,
        }
    }

    pub fn encode(&mut self, map: &PathMap) -> Result<(), EncodeError> {
        self.write_header(map)?;
        for tile in &map.tiles {
            self.write_tile(tile, map.bytes_per_tile())?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_header(&mut self, map: &PathMap) -> Result<(), EncodeError> {
        if !map.tiles_per_row.is_power_of_two() || map.tiles_per_row > 256 {
            return Err(EncodeError::InvalidTileCount(map.tiles_per_row));
        }
        let log2_tiles = map.tiles_per_row.trailing_zeros() as i32;

        if !map.rows_per_tile.is_power_of_two() {
            return Err(EncodeError::InvalidTileResolution(map.rows_per_tile));
        }
        let log2_tile_res = map.level as i32 + map.rows_per_tile.trailing_zeros() as i32;
        if !(6..=12).contains(&log2_tile_res) {
            return Err(EncodeError::InvalidTileResolution(map.rows_per_tile));
        }

        let data_offset: i32 = if self.options.legacy_marker { 2 } else { 0 };
        for word in [
            log2_tiles,
            log2_tiles,
            log2_tile_res,
            map.level as i32,
            map.is_info as i32,
            data_offset,
        ] {
            self.writer.write_all(&word.to_le_bytes())?;
        }

        if self.options.legacy_marker {
            for word in LEGACY_MARKER {
                self.writer.write_all(&word.to_le_bytes())?;
            }
        }

        Ok(())
    }

    fn write_tile(&mut self, tile: &Tile, bytes_per_tile: usize) -> Result<(), EncodeError> {
        let tag: i32 = tile.tag().into();
        self.writer.write_all(&tag.to_le_bytes())?;

        match tile {
            Tile::Mixed(mask) => self.writer.write_all(mask)?,
            Tile::DoGo if self.options.full_records => {
                self.write_fill(0x00, bytes_per_tile)?;
            }
            Tile::NoGo if self.options.full_records => {
                self.write_fill(0xff, bytes_per_tile)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn write_fill(&mut self, byte: u8, len: usize) -> Result<(), EncodeError> {
        self.writer.write_all(&vec![byte; len])?;
        Ok(())
    }
}
