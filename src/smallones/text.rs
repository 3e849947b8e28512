//! Text dump of a smallones map, a line-oriented editable form. `#`
//! starts a comment; three header lines precede any point, mark, or
//! link line.

use super::{Links, SmallOnes, POINT_LEVELS};
use crate::pathmap::{VehicleType, TILE_DIM};
use std::{
    fmt,
    io::{BufRead, BufWriter, Error as IoError, Write},
};

/// Marker value for a "mystery" tile, seen once in some stock files.
const MYSTERY_MARK: u8 = 0x10;

#[derive(Debug)]
pub enum DecodeError {
    IoError(IoError),
    /// A point, mark, or link line appeared before the three header lines.
    HeaderIncomplete,
    /// The header fields contradict each other.
    MalformedHeader {
        resolution: usize,
        tiles_per_row: usize,
        tile_count: usize,
    },
    BadLine { line: usize, text: String },
    SlotOutOfRange { line: usize, slot: usize },
    TileOutOfRange { line: usize, col: usize, row: usize },
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
            DecodeError::HeaderIncomplete => {
                write!(f, "tile data before the file header was complete")
            }
            DecodeError::MalformedHeader {
                resolution,
                tiles_per_row,
                tile_count,
            } => write!(
                f,
                "header fields disagree: res {}, {} tiles per row, {} tiles",
                resolution, tiles_per_row, tile_count
            ),
            DecodeError::BadLine { line, text } => {
                write!(f, "cannot parse line {}: {:?}", line, text)
            }
            DecodeError::SlotOutOfRange { line, slot } => {
                write!(f, "slot {} out of range on line {}", slot, line)
            }
            DecodeError::TileOutOfRange { line, col, row } => {
                write!(f, "tile {}x{} outside the grid on line {}", col, row, line)
            }
        }
    }
}

pub struct Decoder<R>
where
    R: BufRead,
{
    reader: R,
}

/// Header fields accumulate in any order; all three must agree before
/// tile data may follow.
#[derive(Default)]
struct Header {
    resolution: Option<usize>,
    tiles_per_row: Option<usize>,
    tile_count: Option<usize>,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder { reader }
    }

    pub fn decode(&mut self, vehicle: VehicleType) -> Result<SmallOnes, DecodeError> {
        let mut header = Header::default();
        let mut so: Option<SmallOnes> = None;

        for (index, line) in self.reader.by_ref().lines().enumerate() {
            let line = line?;
            let text = line.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let number = index + 1;

            if let Some(rest) = text.strip_prefix("Image res:") {
                header.resolution = Some(parse_pair(rest, 'x', number, text)?.0);
            } else if let Some(rest) = text.strip_prefix("Image tile res:") {
                header.tiles_per_row = Some(parse_pair(rest, 'x', number, text)?.0);
            } else if let Some(rest) = text.strip_prefix("Total tiles:") {
                header.tile_count = Some(parse_number(rest.trim(), number, text)?);
            } else {
                if so.is_none() {
                    so = Some(build_map(vehicle, &header)?);
                }
                let map = so.as_mut().ok_or(DecodeError::HeaderIncomplete)?;
                if let Some(rest) = text.strip_prefix("Set point - tile:") {
                    decode_point(map, rest, number, text)?;
                } else if let Some(rest) = text.strip_prefix("Mark mystery tile:") {
                    decode_mark(map, rest, number, text)?;
                } else if let Some(rest) = text.strip_prefix("tile:") {
                    decode_link(map, rest, number, text)?;
                } else {
                    return Err(DecodeError::BadLine {
                        line: number,
                        text: text.to_owned(),
                    });
                }
            }
        }

        // A header-only file is still a valid, if empty, map.
        match so {
            Some(so) => Ok(so),
            None => build_map(vehicle, &header),
        }
    }
}

fn build_map(vehicle: VehicleType, header: &Header) -> Result<SmallOnes, DecodeError> {
    let (Some(resolution), Some(tiles_per_row), Some(tile_count)) =
        (header.resolution, header.tiles_per_row, header.tile_count)
    else {
        return Err(DecodeError::HeaderIncomplete);
    };
    if resolution != tiles_per_row * TILE_DIM || tile_count != tiles_per_row * tiles_per_row {
        return Err(DecodeError::MalformedHeader {
            resolution,
            tiles_per_row,
            tile_count,
        });
    }
    Ok(SmallOnes::new(vehicle, tiles_per_row))
}

/// One endpoint of a point or link line: tile, slot, coordinate, and
/// whether the `P` flag offsets the coordinate by one tile.
struct Point {
    col: usize,
    row: usize,
    slot: usize,
    x: u32,
    y: u32,
}

fn parse_number(s: &str, line: usize, text: &str) -> Result<usize, DecodeError> {
    s.trim().parse().map_err(|_| DecodeError::BadLine {
        line,
        text: text.to_owned(),
    })
}

fn parse_pair(s: &str, sep: char, line: usize, text: &str) -> Result<(usize, usize), DecodeError> {
    let bad = || DecodeError::BadLine {
        line,
        text: text.to_owned(),
    };
    let (a, b) = s.trim().split_once(sep).ok_or_else(bad)?;
    Ok((
        parse_number(a, line, text)?,
        parse_number(b.trim(), line, text)?,
    ))
}

/// Parses `CCxRR:L pt: XXxYY [P]` from a token stream, consuming 3 or 4
/// tokens depending on the flag.
fn parse_point(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'_>>,
    line: usize,
    text: &str,
) -> Result<Point, DecodeError> {
    let bad = || DecodeError::BadLine {
        line,
        text: text.to_owned(),
    };

    let tile = tokens.next().ok_or_else(bad)?;
    let (coords, slot) = tile.split_once(':').ok_or_else(bad)?;
    let (col, row) = parse_pair(coords, 'x', line, text)?;
    let slot = parse_number(slot, line, text)?;

    if tokens.next() != Some("pt:") {
        return Err(bad());
    }
    let (x, y) = parse_pair(tokens.next().ok_or_else(bad)?, 'x', line, text)?;

    let mut x = x as u32;
    let mut y = y as u32;
    if matches!(tokens.peek(), Some(&"P") | Some(&"p")) {
        tokens.next();
        x += TILE_DIM as u32;
        y += TILE_DIM as u32;
    }

    Ok(Point { col, row, slot, x, y })
}

fn set_point(so: &mut SmallOnes, pt: &Point, line: usize) -> Result<usize, DecodeError> {
    if pt.slot >= POINT_LEVELS {
        return Err(DecodeError::SlotOutOfRange {
            line,
            slot: pt.slot,
        });
    }
    if pt.col >= so.tiles_per_row || pt.row >= so.tiles_per_row {
        return Err(DecodeError::TileOutOfRange {
            line,
            col: pt.col,
            row: pt.row,
        });
    }
    let index = pt.row * so.tiles_per_row + pt.col;
    so.tiles[index].set_point(pt.slot, pt.x, pt.y);
    Ok(index)
}

fn decode_point(
    so: &mut SmallOnes,
    rest: &str,
    line: usize,
    text: &str,
) -> Result<(), DecodeError> {
    let mut tokens = rest.split_whitespace().peekable();
    let pt = parse_point(&mut tokens, line, text)?;
    set_point(so, &pt, line)?;
    Ok(())
}

fn decode_mark(
    so: &mut SmallOnes,
    rest: &str,
    line: usize,
    text: &str,
) -> Result<(), DecodeError> {
    let (col, row) = parse_pair(rest, 'x', line, text)?;
    if col >= so.tiles_per_row || row >= so.tiles_per_row {
        return Err(DecodeError::TileOutOfRange { line, col, row });
    }
    so.tiles[row * so.tiles_per_row + col].markers[0] = MYSTERY_MARK;
    Ok(())
}

fn decode_link(
    so: &mut SmallOnes,
    rest: &str,
    line: usize,
    text: &str,
) -> Result<(), DecodeError> {
    let bad = || DecodeError::BadLine {
        line,
        text: text.to_owned(),
    };

    let mut tokens = rest.split_whitespace().peekable();
    let first = parse_point(&mut tokens, line, text)?;
    if tokens.next() != Some("to") {
        return Err(bad());
    }
    let second = parse_point(&mut tokens, line, text)?;

    let index = set_point(so, &first, line)?;
    set_point(so, &second, line)?;

    // Same column means the partner sits below, same row to the right.
    // The link is always recorded on the first tile.
    if first.col == second.col {
        so.tiles[index].links_below |= Links::between(first.slot, second.slot);
    }
    if first.row == second.row {
        so.tiles[index].links_right |= Links::between(first.slot, second.slot);
    }
    Ok(())
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

    /// Writes the text form: header, then all points and mystery marks,
    /// then all links.
    pub fn encode(&mut self, so: &SmallOnes) -> Result<(), IoError> {
        let side = so.tiles_per_row;
        let res = side * TILE_DIM;
        writeln!(self.writer, "Image res:        {} x {}", res, res)?;
        writeln!(self.writer, "Image tile res:   {} x {}", side, side)?;
        writeln!(self.writer, "Total tiles:      {}", so.tile_count())?;

        for (index, tile) in so.tiles.iter().enumerate() {
            let (col, row) = (index % side, index / side);
            for slot in 0..POINT_LEVELS {
                if tile.active.contains_slot(slot) {
                    let pt = tile.points[slot];
                    writeln!(
                        self.writer,
                        "Set point - tile: {:02}x{:02}:{} pt: {:02}x{:02}",
                        col,
                        row,
                        slot,
                        pt.x % TILE_DIM as u32,
                        pt.y % TILE_DIM as u32,
                    )?;
                }
            }
            if tile.markers[0] != 0 {
                writeln!(self.writer, "Mark mystery tile: {:02}x{:02}", col, row)?;
            }
        }

        for (index, tile) in so.tiles.iter().enumerate() {
            let (col, row) = (index % side, index / side);
            for own_slot in 0..POINT_LEVELS {
                if !tile.active.contains_slot(own_slot) {
                    continue;
                }
                for other_slot in 0..POINT_LEVELS {
                    if tile.links_below.contains(Links::between(own_slot, other_slot))
                        && index + side < so.tiles.len()
                    {
                        self.write_link(
                            so,
                            (col, row, index, own_slot),
                            (col, row + 1, index + side, other_slot),
                        )?;
                    }
                    if tile.links_right.contains(Links::between(own_slot, other_slot))
                        && (index + 1) % side != 0
                    {
                        self.write_link(
                            so,
                            (col, row, index, own_slot),
                            (col + 1, row, index + 1, other_slot),
                        )?;
                    }
                }
            }
        }

        self.writer.flush()
    }

    fn write_link(
        &mut self,
        so: &SmallOnes,
        (col1, row1, index1, slot1): (usize, usize, usize, usize),
        (col2, row2, index2, slot2): (usize, usize, usize, usize),
    ) -> Result<(), IoError> {
        let a = so.tiles[index1].points[slot1];
        let b = so.tiles[index2].points[slot2];
        let flag = |x: u32| if x >= TILE_DIM as u32 { "P" } else { " " };
        writeln!(
            self.writer,
            "tile: {:02}x{:02}:{} pt: {:02}x{:02} {} to {:02}x{:02}:{} pt: {:02}x{:02} {}",
            col1,
            row1,
            slot1,
            a.x % TILE_DIM as u32,
            a.y % TILE_DIM as u32,
            flag(a.x),
            col2,
            row2,
            slot2,
            b.x % TILE_DIM as u32,
            b.y % TILE_DIM as u32,
            flag(b.x),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smallones::ActiveSlots;
    use glam::UVec2;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn sample() -> SmallOnes {
        let mut so = SmallOnes::new(VehicleType::Infantry, 2);
        so.tiles[0].set_point(0, 48, 48);
        so.tiles[1].set_point(0, 5, 60);
        so.tiles[2].set_point(0, 30, 2);
        so.tiles[2].set_point(1, 1, 63);
        so.tiles[0].links_right |= Links::between(0, 0);
        so.tiles[0].links_below |= Links::between(0, 1);
        so.tiles[3].markers[0] = MYSTERY_MARK;
        so
    }

    fn decode(text: &str) -> Result<SmallOnes, DecodeError> {
        Decoder::new(Cursor::new(text)).decode(VehicleType::Infantry)
    }

    #[test]
    fn test_round_trip() {
        let so = sample();
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).encode(&so).unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let back = decode(&text).unwrap();
        assert_eq!(back, so);
    }

    #[test]
    fn test_encode_layout() {
        let mut so = SmallOnes::new(VehicleType::Tank, 1);
        so.tiles[0].set_point(0, 9, 40);

        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).encode(&so).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert_eq!(
            text,
            "Image res:        64 x 64\n\
             Image tile res:   1 x 1\n\
             Total tiles:      1\n\
             Set point - tile: 00x00:0 pt: 09x40\n"
        );
    }

    #[test]
    fn test_decode_offset_flag() {
        let text = "\
            Image res:        128 x 128\n\
            Image tile res:   2 x 2\n\
            Total tiles:      4\n\
            tile: 00x00:0 pt: 10x12 P to 00x01:0 pt: 10x00  \n";
        let so = decode(text).unwrap();

        assert_eq!(so.tiles[0].points[0], UVec2::new(74, 76));
        assert_eq!(so.tiles[2].points[0], UVec2::new(10, 0));
        assert!(so.tiles[0].links_below.contains(Links::S0_TO_0));
        assert!(so.tiles[0].links_right.is_empty());
    }

    #[test]
    fn test_decode_rejects_point_before_header() {
        let text = "Image res: 64 x 64\nSet point - tile: 00x00:0 pt: 01x01\n";
        assert!(matches!(decode(text), Err(DecodeError::HeaderIncomplete)));
    }

    #[test]
    fn test_decode_rejects_contradictory_header() {
        let text = "\
            Image res:        128 x 128\n\
            Image tile res:   2 x 2\n\
            Total tiles:      5\n\
            Set point - tile: 00x00:0 pt: 01x01\n";
        assert!(matches!(
            decode(text),
            Err(DecodeError::MalformedHeader { tile_count: 5, .. })
        ));
    }

    #[test]
    fn test_decode_skips_comments_and_mystery_marks() {
        let text = "\
            # generated for a test\n\
            Image res:        64 x 64\n\
            Image tile res:   1 x 1\n\
            Total tiles:      1\n\
            Mark mystery tile: 00x00 # odd one\n";
        let so = decode(text).unwrap();

        assert_eq!(so.tiles[0].markers[0], MYSTERY_MARK);
        assert_eq!(so.tiles[0].active, ActiveSlots::default());
    }

    #[test]
    fn test_decode_rejects_unknown_line() {
        let text = "\
            Image res:        64 x 64\n\
            Image tile res:   1 x 1\n\
            Total tiles:      1\n\
            wibble\n";
        assert!(matches!(
            decode(text),
            Err(DecodeError::BadLine { line: 4, .. })
        ));
    }
}
