mod decoder;
mod encoder;
mod generator;
pub mod text;

use bitflags::bitflags;
use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::pathmap::VehicleType;

pub use decoder::{DecodeError, Decoder};
pub use encoder::{EncodeError, Encoder};
pub use generator::{GenerateError, Generator, GeneratorOptions};

/// Waypoint slots per tile.
pub const POINT_LEVELS: usize = 4;
/// Waypoint coordinate used for tiles with no obstacles at all.
pub const DEFAULT_POINT: u8 = 48;
/// On-disk size of one tile record.
pub const RECORD_SIZE: usize = 16;

bitflags! {
    /// A 4x4 bit matrix linking each waypoint slot of one tile to the
    /// slots of the neighboring tile below or to the right. Bit
    /// `own_slot * 4 + neighbor_slot`.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct Links: u16 {
        const S0_TO_0 = 1 << 0;
        const S0_TO_1 = 1 << 1;
        const S0_TO_2 = 1 << 2;
        const S0_TO_3 = 1 << 3;
        const S1_TO_0 = 1 << 4;
        const S1_TO_1 = 1 << 5;
        const S1_TO_2 = 1 << 6;
        const S1_TO_3 = 1 << 7;
        const S2_TO_0 = 1 << 8;
        const S2_TO_1 = 1 << 9;
        const S2_TO_2 = 1 << 10;
        const S2_TO_3 = 1 << 11;
        const S3_TO_0 = 1 << 12;
        const S3_TO_1 = 1 << 13;
        const S3_TO_2 = 1 << 14;
        const S3_TO_3 = 1 << 15;
    }
}

impl Links {
    /// The flag linking `own_slot` of this tile to `neighbor_slot` of the
    /// neighbor. Both slots must be below [POINT_LEVELS].
    #[inline]
    pub fn between(own_slot: usize, neighbor_slot: usize) -> Links {
        Links::from_bits_retain(1 << (own_slot * 4 + neighbor_slot))
    }
}

bitflags! {
    /// Which waypoint slots of a tile are in use. Slot `i` is active when
    /// bit `4 + i` is set. The low nibble is unused by this tool but
    /// appears set in some stock game files, so it is carried verbatim.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct ActiveSlots: u8 {
        const SLOT0 = 1 << 4;
        const SLOT1 = 1 << 5;
        const SLOT2 = 1 << 6;
        const SLOT3 = 1 << 7;
    }
}

impl ActiveSlots {
    #[inline]
    pub fn slot(slot: usize) -> ActiveSlots {
        ActiveSlots::from_bits_retain(1 << (4 + slot))
    }

    #[inline]
    pub fn contains_slot(&self, slot: usize) -> bool {
        self.bits() & (1 << (4 + slot)) != 0
    }
}

/// One tile's waypoint record, 16 bytes on the wire.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SmallOnesTile {
    /// Links from this tile's slots to the slots of the tile below.
    pub links_below: Links,
    /// Links from this tile's slots to the slots of the tile to the right.
    pub links_right: Links,
    /// Waypoint coordinates per slot, x = column, y = row within the tile.
    pub points: [UVec2; POINT_LEVELS],
    pub active: ActiveSlots,
    /// Three trailing bytes of unknown semantics, round-tripped verbatim.
    /// The text format's "mystery tile" mark sets `markers[0]` to 0x10.
    pub markers: [u8; 3],
}

impl SmallOnesTile {
    /// Activates `slot` at (`col`, `row`).
    pub fn set_point(&mut self, slot: usize, col: u32, row: u32) {
        self.points[slot] = UVec2::new(col, row);
        self.active |= ActiveSlots::slot(slot);
    }
}

/// Per-slot painted region masks for one tile, same bit layout as a
/// pathmap tile mask with region pixels clear. Only generated maps carry
/// these; the binary format does not store them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SlotMasks {
    pub masks: [Option<Box<[u8]>>; POINT_LEVELS],
}

/// A waypoint ("smallones") map: one record per tile of the level-0
/// pathmap it was generated from.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SmallOnes {
    pub vehicle: VehicleType,
    pub tiles_per_row: usize,
    pub tiles: Vec<SmallOnesTile>,
    /// Present only on maps built by [Generator]; needed for info-map
    /// derivation. Not serialized in either external format.
    #[serde(skip)]
    pub(crate) masks: Option<Vec<SlotMasks>>,
}

impl SmallOnes {
    /// Creates an all-inactive map.
    pub fn new(vehicle: VehicleType, tiles_per_row: usize) -> SmallOnes {
        SmallOnes {
            vehicle,
            tiles_per_row,
            tiles: vec![SmallOnesTile::default(); tiles_per_row * tiles_per_row],
            masks: None,
        }
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_per_row * self.tiles_per_row
    }

    /// Whether this map carries the painted slot masks needed to derive
    /// an info map. Maps decoded from files do not.
    #[inline]
    pub fn has_masks(&self) -> bool {
        self.masks.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_links_between() {
        assert_eq!(Links::between(0, 0), Links::S0_TO_0);
        assert_eq!(Links::between(2, 1), Links::S2_TO_1);
        assert_eq!(Links::between(3, 3), Links::S3_TO_3);
    }

    #[test]
    fn test_active_slots_preserve_low_nibble() {
        let active = ActiveSlots::from_bits_retain(0x0b);
        assert!(!active.contains_slot(0));
        let marked = active | ActiveSlots::slot(0);
        assert!(marked.contains_slot(0));
        assert_eq!(marked.bits(), 0x1b);
    }

    #[test]
    fn test_set_point_activates_slot() {
        let mut tile = SmallOnesTile::default();
        tile.set_point(1, 10, 20);

        assert_eq!(tile.points[1], UVec2::new(10, 20));
        assert!(tile.active.contains_slot(1));
        assert!(!tile.active.contains_slot(0));
    }
}
