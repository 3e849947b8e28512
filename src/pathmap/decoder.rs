use super::*;
use std::{
    fmt,
    io::{Error as IoError, Read, Seek, SeekFrom},
    mem::size_of,
};

pub(crate) const HEADER_SIZE: usize = 6 * size_of::<i32>();

/// The two fixed words that follow the header when `data_offset == 2`. A
/// compatibility marker the game's own tools always emit, carried through
/// unconditionally.
pub(crate) const LEGACY_MARKER: [u32; 2] = [0x0000_0000, 0xffff_ffff];

#[derive(Debug)]
pub enum DecodeError {
    IoError(IoError),
    /// The two tiles-per-side fields disagree; grids are always square.
    MismatchedTileCounts(i32, i32),
    TileCountOutOfRange(i32),
    TileResolutionOutOfRange(i32),
    InvalidInfoFlag(i32),
    InvalidDataOffset(i32),
    InvalidLevel(i32),
    InvalidLegacyMarker(u32, u32),
    InvalidTileTag(i32),
}

impl std::error::Error for DecodeError {}

impl From<IoError> for DecodeError {
    fn from(error: IoError) -> Self {
        DecodeError::IoError(error)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::IoError(e) => write!(f, "IO error: {}", e),
            DecodeError::MismatchedTileCounts(rows, cols) => {
                write!(f, "tiles per row ({}) and column ({}) differ", rows, cols)
            }
            DecodeError::TileCountOutOfRange(v) => {
                write!(f, "log2 tiles per side {} out of range 0..=8", v)
            }
            DecodeError::TileResolutionOutOfRange(v) => {
                write!(f, "log2 tile resolution {} out of range 6..=12", v)
            }
            DecodeError::InvalidInfoFlag(v) => write!(f, "info flag {} is not 0 or 1", v),
            DecodeError::InvalidDataOffset(v) => write!(f, "data offset {} is not 0 or 2", v),
            DecodeError::InvalidLevel(v) => write!(f, "compression level {} out of range", v),
            DecodeError::InvalidLegacyMarker(a, b) => {
                write!(f, "legacy marker ({:#x}, {:#x}) is not (0, -1)", a, b)
            }
            DecodeError::InvalidTileTag(tag) => write!(f, "unrecognized tile tag {}", tag),
        }
    }
}

pub struct Decoder<R>
where
    R: Read + Seek,
{
    reader: R,
}

impl<R: Read + Seek> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder { reader }
    }

    /// Decodes a pathmap or info-map file. The vehicle category is not part
    /// of the file and must be supplied by the caller.
    pub fn decode(&mut self, vehicle: VehicleType) -> Result<PathMap, DecodeError> {
        let mut buf = [0; HEADER_SIZE];
        self.reader.read_exact(&mut buf)?;

        let word = |i: usize| i32::from_le_bytes(buf[i * 4..(i + 1) * 4].try_into().unwrap());

        let log2_tiles_per_row = word(0);
        let log2_tiles_per_col = word(1);
        let log2_tile_res = word(2);
        let level = word(3);
        let is_info = word(4);
        let data_offset = word(5);

        if log2_tiles_per_row != log2_tiles_per_col {
            return Err(DecodeError::MismatchedTileCounts(
                log2_tiles_per_row,
                log2_tiles_per_col,
            ));
        }
        if !(0..=8).contains(&log2_tiles_per_row) {
            return Err(DecodeError::TileCountOutOfRange(log2_tiles_per_row));
        }
        if !(6..=12).contains(&log2_tile_res) {
            return Err(DecodeError::TileResolutionOutOfRange(log2_tile_res));
        }
        if is_info != 0 && is_info != 1 {
            return Err(DecodeError::InvalidInfoFlag(is_info));
        }
        if data_offset != 0 && data_offset != 2 {
            return Err(DecodeError::InvalidDataOffset(data_offset));
        }
        if !(0..=MAX_LEVEL as i32).contains(&level) || level > log2_tile_res {
            return Err(DecodeError::InvalidLevel(level));
        }

        if data_offset == 2 {
            self.read_legacy_marker()?;
        }

        let tiles_per_row = 1usize << log2_tiles_per_row;
        let rows_per_tile = 1usize << (log2_tile_res - level);
        let bytes_per_row = rows_per_tile >> (3 - is_info);
        let bytes_per_tile = rows_per_tile * bytes_per_row;
        let tile_count = tiles_per_row * tiles_per_row;

        let full_records = self.has_full_records(tile_count, bytes_per_tile)?;

        let mut tiles = Vec::with_capacity(tile_count);
        for _ in 0..tile_count {
            tiles.push(self.read_tile(bytes_per_tile, full_records)?);
        }

        Ok(PathMap {
            vehicle,
            level: level as u8,
            is_info: is_info == 1,
            tiles_per_row,
            rows_per_tile,
            bytes_per_row,
            tiles,
        })
    }

    fn read_legacy_marker(&mut self) -> Result<(), DecodeError> {
        let mut buf = [0; 2 * size_of::<u32>()];
        self.reader.read_exact(&mut buf)?;

        let a = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let b = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if [a, b] != LEGACY_MARKER {
            return Err(DecodeError::InvalidLegacyMarker(a, b));
        }
        Ok(())
    }

    /// Infers the record variant from the remaining payload length. The
    /// full-record and compact encodings have the same length only when
    /// every tile is Mixed, in which case both parses are identical.
    fn has_full_records(
        &mut self,
        tile_count: usize,
        bytes_per_tile: usize,
    ) -> Result<bool, DecodeError> {
        let pos = self.reader.stream_position()?;
        let end = self.reader.seek(SeekFrom::End(0))?;
        self.reader.seek(SeekFrom::Start(pos))?;

        let remaining = (end - pos) as usize;
        Ok(remaining == tile_count * (size_of::<i32>() + bytes_per_tile))
    }

    fn read_tile(
        &mut self,
        bytes_per_tile: usize,
        full_records: bool,
    ) -> Result<Tile, DecodeError> {
        let mut buf = [0; size_of::<i32>()];
        self.reader.read_exact(&mut buf)?;

        let raw = i32::from_le_bytes(buf);
        let tag = TileTag::try_from(raw).map_err(|_| DecodeError::InvalidTileTag(raw))?;

        match tag {
            TileTag::Mixed => {
                let mut mask = vec![0; bytes_per_tile];
                self.reader.read_exact(&mut mask)?;
                Ok(Tile::Mixed(mask))
            }
            TileTag::DoGo | TileTag::NoGo => {
                if full_records {
                    // The uniform filler mask carries no information.
                    self.reader
                        .seek(SeekFrom::Current(bytes_per_tile as i64))?;
                }
                Ok(if tag == TileTag::DoGo {
                    Tile::DoGo
                } else {
                    Tile::NoGo
                })
            }
        }
    }
}
