use super::*;
use std::io::{BufWriter, Write};

#[derive(Debug)]
pub enum EncodeError {
    IoError(std::io::Error),
    /// The tile vector does not hold `tiles_per_row` squared records.
    WrongTileCount { expected: usize, actual: usize },
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
            EncodeError::WrongTileCount { expected, actual } => {
                write!(f, "map holds {} tiles, expected {}", actual, expected)
            }
        }
    }
}

#[derive(Debug)]
pub struct Encoder<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Encoder {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes the smallones binary form. Slot masks, when present, are a
    /// generation artifact and are not part of the format.
    pub fn encode(&mut self, so: &SmallOnes) -> Result<(), EncodeError> {
        if so.tiles.len() != so.tile_count() {
            return Err(EncodeError::WrongTileCount {
                expected: so.tile_count(),
                actual: so.tiles.len(),
            });
        }

        let side = so.tiles_per_row as u32;
        self.writer.write_all(&side.to_le_bytes())?;
        self.writer.write_all(&side.to_le_bytes())?;

        for tile in &so.tiles {
            self.write_tile(tile)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_tile(&mut self, tile: &SmallOnesTile) -> Result<(), EncodeError> {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..2].copy_from_slice(&tile.links_below.bits().to_le_bytes());
        buf[2..4].copy_from_slice(&tile.links_right.bits().to_le_bytes());
        for (slot, point) in tile.points.iter().enumerate() {
            buf[4 + slot * 2] = point.x as u8;
            buf[5 + slot * 2] = point.y as u8;
        }
        buf[12] = tile.active.bits();
        buf[13..16].copy_from_slice(&tile.markers);
        self.writer.write_all(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec2;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_round_trip() {
        let mut so = SmallOnes::new(VehicleType::Boat, 2);
        so.tiles[0].set_point(0, 48, 48);
        so.tiles[1].set_point(0, 5, 60);
        so.tiles[1].set_point(1, 63, 0);
        so.tiles[0].links_right = Links::S0_TO_1;
        so.tiles[0].links_below = Links::S0_TO_0;
        so.tiles[3].markers = [0x10, 0, 0];

        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).encode(&so).unwrap();
        assert_eq!(bytes.len(), 8 + 4 * RECORD_SIZE);

        let back = Decoder::new(Cursor::new(bytes))
            .decode(VehicleType::Boat)
            .unwrap();
        assert_eq!(back, so);
    }

    #[test]
    fn test_record_layout() {
        let mut so = SmallOnes::new(VehicleType::Tank, 1);
        so.tiles[0].set_point(2, 7, 9);
        so.tiles[0].links_below = Links::S3_TO_3;

        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).encode(&so).unwrap();

        assert_eq!(&bytes[0..8], &[1, 0, 0, 0, 1, 0, 0, 0]);
        let record = &bytes[8..];
        assert_eq!(&record[0..2], &0x8000u16.to_le_bytes());
        assert_eq!(&record[2..4], &[0, 0]);
        assert_eq!(&record[8..10], &[7, 9]); // slot 2 point
        assert_eq!(record[12], 0x40);
    }

    #[test]
    fn test_encode_rejects_short_tile_vector() {
        let mut so = SmallOnes::new(VehicleType::Tank, 2);
        so.tiles.pop();

        let result = Encoder::new(Vec::new()).encode(&so);
        assert!(matches!(
            result,
            Err(EncodeError::WrongTileCount {
                expected: 4,
                actual: 3,
            })
        ));
    }

    #[test]
    fn test_default_tile_is_zeroed() {
        let tile = SmallOnesTile::default();
        assert_eq!(tile.points, [UVec2::ZERO; POINT_LEVELS]);
        assert_eq!(tile.active.bits(), 0);
    }
}
