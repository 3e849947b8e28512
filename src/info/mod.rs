//! Region-classification ("info") maps: 2 bits per pixel telling the game
//! which waypoint region, if any, covers each block of the tile.

use crate::pathmap::{PathMap, Tile, ROW_BYTES, TILE_DIM};
use crate::smallones::{SlotMasks, SmallOnes, POINT_LEVELS};
use std::fmt;
use tracing::debug;

#[derive(Debug)]
pub enum DeriveError {
    /// The waypoint map carries no slot masks. Maps decoded from files
    /// never do; regenerate from the level-0 raw map instead.
    MissingMasks,
}

impl std::error::Error for DeriveError {}

impl fmt::Display for DeriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeriveError::MissingMasks => {
                write!(f, "waypoint map carries no region masks")
            }
        }
    }
}

/// Derives an info map from a generated waypoint map. Each output pixel
/// summarizes a `p x p` block of the source tile, `p = 2` for land
/// vehicles and `8` for sea vehicles; its 2-bit value is the first slot
/// whose region covers the whole block, or 3 when none does.
pub fn derive(so: &SmallOnes) -> Result<PathMap, DeriveError> {
    let masks = so.masks.as_ref().ok_or(DeriveError::MissingMasks)?;

    let level = so.vehicle.info_level();
    let pixel_size = 1usize << level;
    let rows_per_tile = TILE_DIM >> level;
    let bytes_per_row = ROW_BYTES >> (level - 1);

    debug!(
        "deriving {:?} info map at level {} for {} tiles",
        so.vehicle,
        level,
        so.tile_count()
    );

    let tiles = masks
        .iter()
        .map(|slots| classify_tile(slots, level, pixel_size, rows_per_tile, bytes_per_row))
        .collect();

    Ok(PathMap {
        vehicle: so.vehicle,
        level,
        is_info: true,
        tiles_per_row: so.tiles_per_row,
        rows_per_tile,
        bytes_per_row,
        tiles,
    })
}

fn classify_tile(
    slots: &SlotMasks,
    level: u8,
    pixel_size: usize,
    rows_per_tile: usize,
    bytes_per_row: usize,
) -> Tile {
    // A tile with no regions at all is solid NoGo.
    if slots.masks[0].is_none() {
        return Tile::NoGo;
    }

    let mut bits = vec![0xffu8; rows_per_tile * bytes_per_row];
    for block_row in 0..rows_per_tile {
        for block_col in 0..(TILE_DIM >> level) {
            let Some(slot) = covering_slot(slots, block_row, block_col, pixel_size) else {
                continue;
            };
            let byte = block_row * bytes_per_row + block_col / 4;
            let shift = (block_col % 4) * 2;
            bits[byte] = (bits[byte] & !(3 << shift)) | ((slot as u8) << shift);
        }
    }

    Tile::from_mask(bits)
}

/// The first slot whose region covers every pixel of the block.
fn covering_slot(
    slots: &SlotMasks,
    block_row: usize,
    block_col: usize,
    pixel_size: usize,
) -> Option<usize> {
    for slot in 0..POINT_LEVELS {
        let Some(mask) = &slots.masks[slot] else {
            break;
        };
        let covered = (0..pixel_size).all(|dr| {
            let row = block_row * pixel_size + dr;
            (0..pixel_size).all(|dc| {
                let col = block_col * pixel_size + dc;
                mask[row * ROW_BYTES + col / 8] & (1 << (col % 8)) == 0
            })
        });
        if covered {
            return Some(slot);
        }
    }
    None
}
