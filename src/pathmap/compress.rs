use super::*;
use std::fmt;
use tracing::debug;

#[derive(Debug)]
pub enum CompressError {
    /// Info maps are a derived summary and are never compressed.
    InfoMapInput,
    /// Only native 64-row tiles can be merged.
    TileResolution(usize),
    /// The grid has a single tile; there is no 2x2 block to merge.
    GridTooSmall(usize),
    /// Compressing past the coarsest supported level.
    LevelLimit(u8),
}

impl std::error::Error for CompressError {}

impl fmt::Display for CompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressError::InfoMapInput => write!(f, "cannot compress an info map"),
            CompressError::TileResolution(n) => {
                write!(f, "cannot compress tiles with {} rows", n)
            }
            CompressError::GridTooSmall(n) => {
                write!(f, "cannot compress a {0}x{0}-tile grid", n)
            }
            CompressError::LevelLimit(level) => {
                write!(f, "cannot compress past level {}", level)
            }
        }
    }
}

/// Produces the next-coarser level of a raw pathmap by merging every 2x2
/// block of tiles into one, down-sampling pixels 2x. A parent pixel is
/// blocked iff any of its 4 source pixels is blocked: coarser levels serve
/// larger vehicles, which must never be routed through a sub-cell obstacle.
///
/// Decompression is not supported; compression only runs finer to coarser.
pub fn compress(map: &PathMap) -> Result<PathMap, CompressError> {
    if map.is_info {
        return Err(CompressError::InfoMapInput);
    }
    if map.rows_per_tile != TILE_DIM {
        return Err(CompressError::TileResolution(map.rows_per_tile));
    }
    if map.tiles_per_row < 2 {
        return Err(CompressError::GridTooSmall(map.tiles_per_row));
    }
    if map.level >= MAX_LEVEL {
        return Err(CompressError::LevelLimit(map.level));
    }

    debug!(
        "compressing {:?} map from level {} to {}",
        map.vehicle,
        map.level,
        map.level + 1
    );

    let tiles_per_row = map.tiles_per_row / 2;
    let mut tiles = Vec::with_capacity(tiles_per_row * tiles_per_row);

    for row in 0..tiles_per_row {
        for col in 0..tiles_per_row {
            tiles.push(merge_block(map, row, col));
        }
    }

    Ok(PathMap {
        vehicle: map.vehicle,
        level: map.level + 1,
        is_info: false,
        tiles_per_row,
        rows_per_tile: TILE_DIM,
        bytes_per_row: ROW_BYTES,
        tiles,
    })
}

fn merge_block(map: &PathMap, row: usize, col: usize) -> Tile {
    let src = |dr: usize, dc: usize| {
        &map.tiles[(row * 2 + dr) * map.tiles_per_row + col * 2 + dc]
    };
    let block = [src(0, 0), src(0, 1), src(1, 0), src(1, 1)];

    if block.iter().all(|t| **t == Tile::DoGo) {
        return Tile::DoGo;
    }
    if block.iter().all(|t| **t == Tile::NoGo) {
        return Tile::NoGo;
    }

    let mut mask = vec![0u8; TILE_BYTES];
    for out_row in 0..TILE_DIM {
        for out_col in 0..TILE_DIM {
            let tile = block[(out_row / 32) * 2 + out_col / 32];
            let src_row = (out_row % 32) * 2;
            let src_col = (out_col % 32) * 2;

            let blocked = (0..2).any(|dr| {
                (0..2).any(|dc| tile.is_blocked(src_row + dr, src_col + dc, ROW_BYTES))
            });
            if blocked {
                mask[out_row * ROW_BYTES + out_col / 8] |= 1 << (out_col % 8);
            }
        }
    }

    Tile::from_mask(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_dogo_block_compresses_to_dogo() {
        let map = PathMap::new(VehicleType::Tank, 2);
        let out = compress(&map).unwrap();

        assert_eq!(out.tiles_per_row, 1);
        assert_eq!(out.level, 1);
        assert_eq!(out.tiles, vec![Tile::DoGo]);
    }

    #[test]
    fn test_mixed_block_normalizes_when_uniform() {
        // Two DoGo and two NoGo source tiles give a half-and-half parent,
        // which must stay Mixed rather than collapse to either extreme.
        let mut map = PathMap::new(VehicleType::Tank, 2);
        map.tiles[1] = Tile::NoGo;
        map.tiles[3] = Tile::NoGo;

        let out = compress(&map).unwrap();
        let Tile::Mixed(mask) = &out.tiles[0] else {
            panic!("expected a Mixed parent tile");
        };
        // Left half passable, right half blocked, every row.
        for row in 0..TILE_DIM {
            assert_eq!(&mask[row * ROW_BYTES..row * ROW_BYTES + 4], &[0; 4]);
            assert_eq!(&mask[row * ROW_BYTES + 4..(row + 1) * ROW_BYTES], &[0xff; 4]);
        }
    }

    #[test]
    fn test_single_blocked_pixel_survives_downsampling() {
        let mut mask = vec![0u8; TILE_BYTES];
        mask[0] = 1; // pixel (0, 0) blocked
        let mut map = PathMap::new(VehicleType::Tank, 2);
        for tile in map.tiles.iter_mut() {
            *tile = Tile::Mixed(mask.clone());
        }

        let out = compress(&map).unwrap();
        let parent = &out.tiles[0];
        assert!(matches!(parent, Tile::Mixed(_)));

        // Each quadrant's corner pixel carries the blocked source pixel.
        assert!(parent.is_blocked(0, 0, ROW_BYTES));
        assert!(parent.is_blocked(0, 32, ROW_BYTES));
        assert!(parent.is_blocked(32, 0, ROW_BYTES));
        assert!(parent.is_blocked(32, 32, ROW_BYTES));
        assert!(!parent.is_blocked(0, 1, ROW_BYTES));
        assert!(!parent.is_blocked(1, 0, ROW_BYTES));
    }

    #[test]
    fn test_compression_is_monotonic() {
        // A blocked pixel at level L implies the covering pixel at level
        // L+1 is blocked: compression only adds blocked area.
        let mut map = PathMap::new(VehicleType::Car, 2);
        let mut mask = vec![0u8; TILE_BYTES];
        for row in 10..20 {
            for col in 30..50 {
                mask[row * ROW_BYTES + col / 8] |= 1 << (col % 8);
            }
        }
        map.tiles[0] = Tile::Mixed(mask);
        map.tiles[3] = Tile::NoGo;

        let out = compress(&map).unwrap();
        for y in 0..map.resolution() {
            for x in 0..map.resolution() {
                if map.is_blocked(x, y) {
                    assert!(out.is_blocked(x / 2, y / 2), "lost obstacle at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_compress_rejects_info_maps() {
        let mut map = PathMap::new(VehicleType::Tank, 2);
        map.is_info = true;
        assert!(matches!(compress(&map), Err(CompressError::InfoMapInput)));
    }

    #[test]
    fn test_compress_rejects_single_tile_grid() {
        let map = PathMap::new(VehicleType::Tank, 1);
        assert!(matches!(compress(&map), Err(CompressError::GridTooSmall(1))));
    }
}
