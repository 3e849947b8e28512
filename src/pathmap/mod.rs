mod compress;
mod decoder;
mod encoder;

use image::GrayImage;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

pub use compress::{compress, CompressError};
pub use decoder::{DecodeError, Decoder};
pub use encoder::{EncodeError, EncodeOptions, Encoder};

/// Pixels per tile side at the native resolution.
pub const TILE_DIM: usize = 64;
/// Bytes per bitmask row (1 bit per pixel).
pub const ROW_BYTES: usize = TILE_DIM / 8;
/// Bytes per full tile bitmask.
pub const TILE_BYTES: usize = TILE_DIM * ROW_BYTES;
/// Coarsest compression level the format supports.
pub const MAX_LEVEL: u8 = 5;

/// The navigation-mesh variant a map belongs to. Each vehicle category has
/// its own set of pathmap files.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    IntoPrimitive,
    PartialEq,
    Serialize,
    TryFromPrimitive,
)]
#[repr(u8)]
pub enum VehicleType {
    Tank = 0,
    Infantry,
    Boat,
    LandingCraft,
    Car,
    Helicopter,
    Amphibious,
}

impl VehicleType {
    /// Sea vehicles use a coarser info-map down-sample than land vehicles.
    #[inline]
    pub fn is_sea(&self) -> bool {
        matches!(self, VehicleType::Boat | VehicleType::LandingCraft)
    }

    /// The compression level info maps are derived at for this vehicle.
    #[inline]
    pub fn info_level(&self) -> u8 {
        if self.is_sea() {
            3
        } else {
            1
        }
    }
}

/// The per-tile classification tag as stored on disk.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum TileTag {
    Mixed = -1,
    DoGo = 0,
    NoGo = 1,
}

/// One tile of a pathmap.
///
/// A `Mixed` tile owns a bitmask with one bit per pixel, row-major, bit 0 of
/// each byte being the leftmost pixel. A set bit is a blocked (NoGo) pixel.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Tile {
    /// Every pixel is passable.
    DoGo,
    /// Every pixel is blocked.
    NoGo,
    Mixed(Vec<u8>),
}

impl Tile {
    /// Builds a tile from a bitmask, normalizing uniform masks down to
    /// `DoGo`/`NoGo` so that no produced tile is `Mixed` but uniform.
    pub fn from_mask(mask: Vec<u8>) -> Tile {
        if mask.iter().all(|b| *b == 0) {
            Tile::DoGo
        } else if mask.iter().all(|b| *b == 0xff) {
            Tile::NoGo
        } else {
            Tile::Mixed(mask)
        }
    }

    #[inline]
    pub fn tag(&self) -> TileTag {
        match self {
            Tile::DoGo => TileTag::DoGo,
            Tile::NoGo => TileTag::NoGo,
            Tile::Mixed(_) => TileTag::Mixed,
        }
    }

    /// Whether the pixel at (`row`, `col`) within this tile is blocked.
    /// `bytes_per_row` is the owning map's row stride.
    #[inline]
    pub fn is_blocked(&self, row: usize, col: usize, bytes_per_row: usize) -> bool {
        match self {
            Tile::DoGo => false,
            Tile::NoGo => true,
            Tile::Mixed(mask) => mask[row * bytes_per_row + col / 8] & (1 << (col % 8)) != 0,
        }
    }
}

/// One resolution level of a pathfinding map.
///
/// Grids are always square: `tiles_per_row` counts tiles along both axes and
/// tiles are stored row-major. Raw maps carry 1 bit per pixel; info maps
/// carry 2 bits per pixel and keep the resolution of the raw map they were
/// derived from.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PathMap {
    pub vehicle: VehicleType,
    /// Compression level, 0 = finest.
    pub level: u8,
    /// Region-classification (info) map rather than a raw pixel map.
    pub is_info: bool,
    pub tiles_per_row: usize,
    pub rows_per_tile: usize,
    pub bytes_per_row: usize,
    pub tiles: Vec<Tile>,
}

impl PathMap {
    /// Creates an all-passable level-0 map with native 64x64 tiles.
    pub fn new(vehicle: VehicleType, tiles_per_row: usize) -> PathMap {
        PathMap {
            vehicle,
            level: 0,
            is_info: false,
            tiles_per_row,
            rows_per_tile: TILE_DIM,
            bytes_per_row: ROW_BYTES,
            tiles: vec![Tile::DoGo; tiles_per_row * tiles_per_row],
        }
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_per_row * self.tiles_per_row
    }

    #[inline]
    pub fn bytes_per_tile(&self) -> usize {
        self.rows_per_tile * self.bytes_per_row
    }

    /// Pixels per map side. Info maps report the resolution of the raw map
    /// they were derived from, not their own down-sampled pixel count.
    #[inline]
    pub fn resolution(&self) -> usize {
        if self.is_info {
            self.tiles_per_row * (self.rows_per_tile << self.level)
        } else {
            self.tiles_per_row * self.rows_per_tile
        }
    }

    /// Pixel columns per tile. Equals `rows_per_tile` for raw maps; info
    /// maps pack 2 bits per pixel.
    #[inline]
    pub fn cols_per_tile(&self) -> usize {
        if self.is_info {
            self.bytes_per_row * 4
        } else {
            self.bytes_per_row * 8
        }
    }

    /// Whether the raw-map pixel at grid coordinates (`x`, `y`) is blocked.
    pub fn is_blocked(&self, x: usize, y: usize) -> bool {
        let side = self.rows_per_tile;
        let tile = &self.tiles[(y / side) * self.tiles_per_row + x / side];
        tile.is_blocked(y % side, x % side, self.bytes_per_row)
    }

    /// Renders the map as a grayscale image, the editable proxy form. Raw
    /// maps render white for passable and black for blocked; info maps
    /// spread the four 2-bit zone values over the gray ramp.
    pub fn image(&self) -> GrayImage {
        let side = (self.tiles_per_row * self.rows_per_tile) as u32;
        let mut img = GrayImage::new(side, side);

        if self.is_info {
            let cols = self.cols_per_tile();
            for (i, tile) in self.tiles.iter().enumerate() {
                let tile_x = (i % self.tiles_per_row) * cols;
                let tile_y = (i / self.tiles_per_row) * self.rows_per_tile;
                for row in 0..self.rows_per_tile {
                    for col in 0..cols {
                        let value = match tile {
                            Tile::DoGo => 0,
                            Tile::NoGo => 3,
                            Tile::Mixed(bits) => {
                                (bits[row * self.bytes_per_row + col / 4] >> ((col % 4) * 2)) & 3
                            }
                        };
                        let luma = 255 - value * 85;
                        img.put_pixel((tile_x + col) as u32, (tile_y + row) as u32, [luma].into());
                    }
                }
            }
        } else {
            for y in 0..side as usize {
                for x in 0..side as usize {
                    let luma = if self.is_blocked(x, y) { 0 } else { 255 };
                    img.put_pixel(x as u32, y as u32, [luma].into());
                }
            }
        }

        img
    }

    /// Rebuilds a level-0 raw map from a grayscale image. Any pixel darker
    /// than mid-gray is blocked. The image must be square with a
    /// power-of-two number of 64-pixel tiles per side.
    pub fn from_image(
        img: &GrayImage,
        vehicle: VehicleType,
    ) -> Result<PathMap, RasterError> {
        let (w, h) = img.dimensions();
        if w != h || w as usize % TILE_DIM != 0 {
            return Err(RasterError::BadDimensions(w, h));
        }
        let tiles_per_row = w as usize / TILE_DIM;
        if !tiles_per_row.is_power_of_two() {
            return Err(RasterError::BadDimensions(w, h));
        }

        let mut map = PathMap::new(vehicle, tiles_per_row);
        for i in 0..map.tile_count() {
            let tile_x = (i % tiles_per_row) * TILE_DIM;
            let tile_y = (i / tiles_per_row) * TILE_DIM;
            let mut mask = vec![0u8; TILE_BYTES];
            for row in 0..TILE_DIM {
                for col in 0..TILE_DIM {
                    let luma = img.get_pixel((tile_x + col) as u32, (tile_y + row) as u32)[0];
                    if luma < 128 {
                        mask[row * ROW_BYTES + col / 8] |= 1 << (col % 8);
                    }
                }
            }
            map.tiles[i] = Tile::from_mask(mask);
        }
        Ok(map)
    }
}

#[derive(Debug)]
pub enum RasterError {
    /// The image is not square or not a power-of-two count of 64-pixel
    /// tiles per side.
    BadDimensions(u32, u32),
}

impl std::error::Error for RasterError {}

impl std::fmt::Display for RasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterError::BadDimensions(w, h) => {
                write!(f, "image dimensions {}x{} do not form a tile grid", w, h)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_mask_normalizes_uniform() {
        assert_eq!(Tile::from_mask(vec![0; TILE_BYTES]), Tile::DoGo);
        assert_eq!(Tile::from_mask(vec![0xff; TILE_BYTES]), Tile::NoGo);

        let mut mask = vec![0u8; TILE_BYTES];
        mask[0] = 1;
        assert!(matches!(Tile::from_mask(mask), Tile::Mixed(_)));
    }

    #[test]
    fn test_tile_pixel_addressing() {
        let mut mask = vec![0u8; TILE_BYTES];
        // Pixel (row 2, col 10) => byte 2 * 8 + 1, bit 2.
        mask[2 * ROW_BYTES + 1] = 1 << 2;
        let tile = Tile::Mixed(mask);

        assert!(tile.is_blocked(2, 10, ROW_BYTES));
        assert!(!tile.is_blocked(2, 9, ROW_BYTES));
        assert!(!tile.is_blocked(1, 10, ROW_BYTES));
    }

    #[test]
    fn test_map_is_blocked_crosses_tiles() {
        let mut map = PathMap::new(VehicleType::Tank, 2);
        map.tiles[3] = Tile::NoGo; // bottom-right tile

        assert!(!map.is_blocked(0, 0));
        assert!(!map.is_blocked(63, 127)); // bottom-left tile
        assert!(map.is_blocked(64, 64));
        assert!(map.is_blocked(127, 127));
    }

    #[test]
    fn test_image_round_trip() {
        let mut map = PathMap::new(VehicleType::Car, 1);
        let mut mask = vec![0u8; TILE_BYTES];
        mask[0] = 0x0f; // first four pixels of row 0 blocked
        map.tiles[0] = Tile::from_mask(mask);

        let img = map.image();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(4, 0)[0], 255);

        let back = PathMap::from_image(&img, VehicleType::Car).unwrap();
        assert_eq!(back.tiles, map.tiles);
    }

    #[test]
    fn test_from_image_rejects_bad_dimensions() {
        let img = GrayImage::new(96, 96);
        assert!(matches!(
            PathMap::from_image(&img, VehicleType::Tank),
            Err(RasterError::BadDimensions(96, 96))
        ));
    }
}
