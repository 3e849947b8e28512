use super::*;
use glam::UVec2;
use std::{
    fmt,
    io::{Error as IoError, Read, Seek, SeekFrom},
    mem::size_of,
};

pub(crate) const HEADER_SIZE: usize = 2 * size_of::<u32>();

#[derive(Debug)]
pub enum DecodeError {
    IoError(IoError),
    /// The two tiles-per-side fields disagree; grids are always square.
    MismatchedTileCounts(u32, u32),
    TileCountOutOfRange(u32),
    /// The file length does not match the header's tile count.
    WrongFileSize { expected: u64, actual: u64 },
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
                write!(f, "tiles per side {} out of range 1..=256", v)
            }
            DecodeError::WrongFileSize { expected, actual } => {
                write!(f, "file is {} bytes, expected {}", actual, expected)
            }
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

    /// Decodes a smallones binary file. The vehicle category is not part
    /// of the file and must be supplied by the caller. The result carries
    /// no slot masks.
    pub fn decode(&mut self, vehicle: VehicleType) -> Result<SmallOnes, DecodeError> {
        let mut buf = [0; HEADER_SIZE];
        self.reader.read_exact(&mut buf)?;

        let tiles_per_row = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let tiles_per_col = u32::from_le_bytes(buf[4..8].try_into().unwrap());

        if tiles_per_row != tiles_per_col {
            return Err(DecodeError::MismatchedTileCounts(
                tiles_per_row,
                tiles_per_col,
            ));
        }
        if tiles_per_row == 0 || tiles_per_row > 256 {
            return Err(DecodeError::TileCountOutOfRange(tiles_per_row));
        }

        let tile_count = tiles_per_row as usize * tiles_per_row as usize;
        let expected = (HEADER_SIZE + tile_count * RECORD_SIZE) as u64;
        let actual = self.reader.seek(SeekFrom::End(0))?;
        if actual != expected {
            return Err(DecodeError::WrongFileSize { expected, actual });
        }
        self.reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

        let mut tiles = Vec::with_capacity(tile_count);
        for _ in 0..tile_count {
            tiles.push(self.read_tile()?);
        }

        Ok(SmallOnes {
            vehicle,
            tiles_per_row: tiles_per_row as usize,
            tiles,
            masks: None,
        })
    }

    fn read_tile(&mut self) -> Result<SmallOnesTile, DecodeError> {
        let mut buf = [0; RECORD_SIZE];
        self.reader.read_exact(&mut buf)?;

        let links_below = Links::from_bits_retain(u16::from_le_bytes([buf[0], buf[1]]));
        let links_right = Links::from_bits_retain(u16::from_le_bytes([buf[2], buf[3]]));

        let mut points = [UVec2::ZERO; POINT_LEVELS];
        for (slot, point) in points.iter_mut().enumerate() {
            *point = UVec2::new(buf[4 + slot * 2] as u32, buf[5 + slot * 2] as u32);
        }

        Ok(SmallOnesTile {
            links_below,
            links_right,
            points,
            active: ActiveSlots::from_bits_retain(buf[12]),
            markers: [buf[13], buf[14], buf[15]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_decode_single_tile() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        // links_below, links_right, 4 points, active, markers
        bytes.extend_from_slice(&0x0001u16.to_le_bytes());
        bytes.extend_from_slice(&0x0100u16.to_le_bytes());
        bytes.extend_from_slice(&[48, 48, 10, 20, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[0x30, 0x10, 0, 0]);

        let so = Decoder::new(Cursor::new(bytes))
            .decode(VehicleType::Tank)
            .unwrap();

        assert_eq!(so.tiles_per_row, 1);
        assert!(!so.has_masks());
        let tile = &so.tiles[0];
        assert_eq!(tile.links_below, Links::S0_TO_0);
        assert_eq!(tile.links_right, Links::S2_TO_0);
        assert_eq!(tile.points[0], UVec2::new(48, 48));
        assert_eq!(tile.points[1], UVec2::new(10, 20));
        assert!(tile.active.contains_slot(0));
        assert!(tile.active.contains_slot(1));
        assert!(!tile.active.contains_slot(2));
        assert_eq!(tile.markers, [0x10, 0, 0]);
    }

    #[test]
    fn test_decode_rejects_mismatched_tile_counts() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());

        let result = Decoder::new(Cursor::new(bytes)).decode(VehicleType::Tank);
        assert!(matches!(
            result,
            Err(DecodeError::MismatchedTileCounts(2, 4))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_file() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 3 * RECORD_SIZE]); // one record short

        let result = Decoder::new(Cursor::new(bytes)).decode(VehicleType::Tank);
        assert!(matches!(
            result,
            Err(DecodeError::WrongFileSize {
                expected: 72,
                actual: 56,
            })
        ));
    }
}
