use super::*;
use crate::pathmap::{PathMap, Tile, ROW_BYTES, TILE_BYTES, TILE_DIM};
use std::fmt;
use tracing::debug;

/// Iterations of midpoint recentring before giving up on a pathological
/// mask. Real maps settle within a handful of steps.
const RECENTER_LIMIT: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct GeneratorOptions {
    /// Rank regions that touch no tile edge. The stock game files keep
    /// waypoints on such landlocked regions even though nothing can reach
    /// them, so this defaults to true for byte fidelity.
    pub keep_islands: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions { keep_islands: true }
    }
}

#[derive(Debug)]
pub enum GenerateError {
    /// Waypoints are generated from the finest level only.
    NotLevelZero(u8),
    InfoMapInput,
    TileResolution(usize),
    /// A ranked region produced no reachable waypoint pixel.
    NoPassablePixel { tile: usize, slot: usize },
    /// Midpoint recentring failed to settle.
    RecenterDiverged { tile: usize, slot: usize },
}

impl std::error::Error for GenerateError {}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::NotLevelZero(level) => {
                write!(f, "cannot generate waypoints from a level {} map", level)
            }
            GenerateError::InfoMapInput => {
                write!(f, "cannot generate waypoints from an info map")
            }
            GenerateError::TileResolution(n) => {
                write!(f, "cannot generate waypoints from {}-row tiles", n)
            }
            GenerateError::NoPassablePixel { tile, slot } => {
                write!(f, "no passable waypoint pixel in tile {} slot {}", tile, slot)
            }
            GenerateError::RecenterDiverged { tile, slot } => {
                write!(f, "recentring diverged in tile {} slot {}", tile, slot)
            }
        }
    }
}

/// Builds a waypoint map from a level-0 raw pathmap: per-tile connected
/// region extraction, ranking, waypoint placement, and cross-tile
/// adjacency linking.
#[derive(Debug, Default)]
pub struct Generator {
    options: GeneratorOptions,
}

impl Generator {
    pub fn new() -> Self {
        Generator::default()
    }

    pub fn with_options(options: GeneratorOptions) -> Self {
        Generator { options }
    }

    pub fn generate(&self, map: &PathMap) -> Result<SmallOnes, GenerateError> {
        if map.is_info {
            return Err(GenerateError::InfoMapInput);
        }
        if map.level != 0 {
            return Err(GenerateError::NotLevelZero(map.level));
        }
        if map.rows_per_tile != TILE_DIM {
            return Err(GenerateError::TileResolution(map.rows_per_tile));
        }

        debug!(
            "generating {:?} waypoints for {} tiles",
            map.vehicle,
            map.tile_count()
        );

        let mut so = SmallOnes::new(map.vehicle, map.tiles_per_row);
        let mut masks = vec![SlotMasks::default(); map.tile_count()];

        for (index, tile) in map.tiles.iter().enumerate() {
            match tile {
                Tile::NoGo => {}
                Tile::DoGo => {
                    // The whole tile is one region.
                    masks[index].masks[0] = Some(vec![0u8; TILE_BYTES].into_boxed_slice());
                    self.place_point(
                        &mut so,
                        &masks,
                        index,
                        0,
                        DEFAULT_POINT as usize,
                        DEFAULT_POINT as usize,
                    );
                }
                Tile::Mixed(bits) => {
                    self.survey_tile(&mut so, &mut masks, index, bits)?;
                }
            }
        }

        so.masks = Some(masks);
        Ok(so)
    }

    /// Extracts the tile's connected passable regions and fills waypoint
    /// slots from the highest-ranked ones.
    fn survey_tile(
        &self,
        so: &mut SmallOnes,
        masks: &mut [SlotMasks],
        index: usize,
        bits: &[u8],
    ) -> Result<(), GenerateError> {
        let mut regions = extract_regions(bits);
        if !self.options.keep_islands {
            regions.retain(|r| r.touches_edge());
        }
        regions.sort_by_key(|r| std::cmp::Reverse(r.weight()));

        for (slot, region) in regions.iter().take(POINT_LEVELS).enumerate() {
            let mask = region.paint();
            let (mut col, mut row) = region.centroid();

            if !passable(&mask, row, col) {
                (col, row) = probe_outward(&mask, col, row)
                    .ok_or(GenerateError::NoPassablePixel { tile: index, slot })?;
            }
            if region.size > 16 {
                (col, row) = recenter(&mask, col, row)
                    .ok_or(GenerateError::RecenterDiverged { tile: index, slot })?;
            }

            masks[index].masks[slot] = Some(mask.into_boxed_slice());
            self.place_point(so, masks, index, slot, col, row);
        }
        Ok(())
    }

    /// Records the waypoint and links it to the slots of the tiles above
    /// and to the left whose regions share an open edge. The check is a
    /// byte-granular approximation of reachability, kept as-is for
    /// fidelity with the game's own files.
    fn place_point(
        &self,
        so: &mut SmallOnes,
        masks: &[SlotMasks],
        index: usize,
        slot: usize,
        col: usize,
        row: usize,
    ) {
        so.tiles[index].set_point(slot, col as u32, row as u32);
        let own = match &masks[index].masks[slot] {
            Some(mask) => mask,
            None => return,
        };

        if index >= so.tiles_per_row {
            let above = index - so.tiles_per_row;
            for i in 0..POINT_LEVELS {
                if !so.tiles[above].active.contains_slot(i) {
                    continue;
                }
                let Some(theirs) = &masks[above].masks[i] else {
                    continue;
                };
                let joined = (0..ROW_BYTES).any(|b| {
                    (!theirs[(TILE_DIM - 1) * ROW_BYTES + b] & !own[b]) != 0
                });
                if joined {
                    so.tiles[above].links_below |= Links::between(i, slot);
                }
            }
        }

        if index % so.tiles_per_row != 0 {
            let left = index - 1;
            for i in 0..POINT_LEVELS {
                if !so.tiles[left].active.contains_slot(i) {
                    continue;
                }
                let Some(theirs) = &masks[left].masks[i] else {
                    continue;
                };
                let joined = (0..TILE_DIM).any(|r| {
                    theirs[(r + 1) * ROW_BYTES - 1] & 0x80 == 0 && own[r * ROW_BYTES] & 1 == 0
                });
                if joined {
                    so.tiles[left].links_right |= Links::between(i, slot);
                }
            }
        }
    }
}

/// A maximal passable run within one pixel row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Segment {
    row: usize,
    begin: usize,
    end: usize,
}

impl Segment {
    #[inline]
    fn len(&self) -> usize {
        self.end - self.begin + 1
    }
}

/// A connected passable region, built up segment by segment.
#[derive(Clone, Debug)]
struct Region {
    segments: Vec<Segment>,
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
    size: usize,
}

impl Region {
    fn new(seg: Segment) -> Region {
        Region {
            top: seg.row,
            bottom: seg.row,
            left: seg.begin,
            right: seg.end,
            size: seg.len(),
            segments: vec![seg],
        }
    }

    /// Whether `seg` is adjacent to any segment of this region: within one
    /// row and with column ranges at most one pixel apart.
    fn connects(&self, seg: &Segment) -> bool {
        self.segments.iter().any(|s| {
            s.row.abs_diff(seg.row) <= 1 && seg.end + 1 >= s.begin && seg.begin <= s.end + 1
        })
    }

    /// Adds a segment, coalescing with same-row segments it overlaps or
    /// touches so that every covered pixel counts once.
    fn insert(&mut self, seg: Segment) {
        let mut merged = seg;
        let mut absorbed = 0;
        let mut i = 0;
        while i < self.segments.len() {
            let s = self.segments[i];
            if s.row == merged.row && merged.end + 1 >= s.begin && merged.begin <= s.end + 1 {
                merged.begin = merged.begin.min(s.begin);
                merged.end = merged.end.max(s.end);
                absorbed += s.len();
                self.segments.remove(i);
            } else {
                i += 1;
            }
        }

        self.size += merged.len() - absorbed;
        self.top = self.top.min(merged.row);
        self.bottom = self.bottom.max(merged.row);
        self.left = self.left.min(merged.begin);
        self.right = self.right.max(merged.end);
        self.segments.push(merged);
    }

    fn touches_edge(&self) -> bool {
        self.top == 0 || self.left == 0 || self.bottom == TILE_DIM - 1 || self.right == TILE_DIM - 1
    }

    /// Ranking weight. Regions reaching a tile edge outrank any interior
    /// region regardless of pixel count.
    fn weight(&self) -> usize {
        self.size + if self.touches_edge() { TILE_DIM * TILE_DIM } else { 0 }
    }

    /// Renders the region as a tile mask: region pixels clear, everything
    /// else set.
    fn paint(&self) -> Vec<u8> {
        let mut mask = vec![0xffu8; TILE_BYTES];
        for seg in &self.segments {
            for col in seg.begin..=seg.end {
                mask[seg.row * ROW_BYTES + col / 8] &= !(1 << (col % 8));
            }
        }
        mask
    }

    /// The density-weighted center, biased toward wide rows and columns.
    fn centroid(&self) -> (usize, usize) {
        let mut row_wt: u64 = 0;
        let mut col_wt: u64 = 0;
        for seg in &self.segments {
            row_wt += seg.len() as u64 * (seg.row as u64 + 1);
            for col in seg.begin..=seg.end {
                col_wt += col as u64 + 1;
            }
        }
        let size = self.size as u64;
        let col = (col_wt / size).saturating_sub(1).min(TILE_DIM as u64 - 1);
        let row = (row_wt / size).saturating_sub(1).min(TILE_DIM as u64 - 1);
        (col as usize, row as usize)
    }
}

/// Splits a tile bitmask into connected passable regions by scanline. A
/// run may bridge several previously separate regions, which are then
/// unioned.
fn extract_regions(bits: &[u8]) -> Vec<Region> {
    let mut regions: Vec<Region> = Vec::new();

    for row in 0..TILE_DIM {
        let mut begin = None;
        for col in 0..=TILE_DIM {
            let open =
                col < TILE_DIM && bits[row * ROW_BYTES + col / 8] & (1 << (col % 8)) == 0;
            match (open, begin) {
                (true, None) => begin = Some(col),
                (false, Some(b)) => {
                    add_segment(
                        &mut regions,
                        Segment {
                            row,
                            begin: b,
                            end: col - 1,
                        },
                    );
                    begin = None;
                }
                _ => {}
            }
        }
    }

    regions
}

fn add_segment(regions: &mut Vec<Region>, seg: Segment) {
    let matching: Vec<usize> = (0..regions.len())
        .filter(|&i| regions[i].connects(&seg))
        .collect();

    match matching.split_first() {
        None => regions.push(Region::new(seg)),
        Some((&target, rest)) => {
            regions[target].insert(seg);
            // The segment bridges several regions; union them into the
            // first, removing from the back to keep indices valid.
            for &i in rest.iter().rev() {
                let other = regions.remove(i);
                for seg in other.segments {
                    regions[target].insert(seg);
                }
            }
        }
    }
}

#[inline]
fn passable(mask: &[u8], row: usize, col: usize) -> bool {
    mask[row * ROW_BYTES + col / 8] & (1 << (col % 8)) == 0
}

/// Probes at growing radius in the order right, down, left, up and
/// returns the first passable pixel.
fn probe_outward(mask: &[u8], col: usize, row: usize) -> Option<(usize, usize)> {
    let max_off = row
        .max(TILE_DIM - row - 1)
        .max(col.max(TILE_DIM - col - 1));

    for i in 1..=max_off {
        if col + i < TILE_DIM && passable(mask, row, col + i) {
            return Some((col + i, row));
        }
        if row + i < TILE_DIM && passable(mask, row + i, col) {
            return Some((col, row + i));
        }
        if col >= i && passable(mask, row, col - i) {
            return Some((col - i, row));
        }
        if row >= i && passable(mask, row - i, col) {
            return Some((col, row - i));
        }
    }
    None
}

/// Walked distance and endpoint of the open span from a pixel in one
/// direction, stopping at the edge or just before a blocked pixel.
fn open_span(
    mask: &[u8],
    row: usize,
    col: usize,
    step: impl Fn(usize, usize, usize) -> Option<(usize, usize)>,
) -> (usize, usize, usize) {
    let (mut r, mut c) = (row, col);
    let mut off = 0;
    loop {
        if !passable(mask, r, c) {
            break;
        }
        match step(r, c, 1) {
            Some((nr, nc)) if passable(mask, nr, nc) => {
                (r, c) = (nr, nc);
                off += 1;
            }
            _ => break,
        }
    }
    (r, c, off)
}

/// Nudges a waypoint toward the middle of its open surroundings: when the
/// point hugs one side of an axis while the other side has room, it moves
/// to the open midpoint of the perpendicular axis, repeating until stable.
fn recenter(mask: &[u8], col: usize, row: usize) -> Option<(usize, usize)> {
    let (mut c, mut r) = (col, row);

    for _ in 0..RECENTER_LIMIT {
        let (_, c_max, c_max_off) = open_span(mask, r, c, |r, c, i| {
            (c + i < TILE_DIM).then(|| (r, c + i))
        });
        let (_, c_min, c_min_off) = open_span(mask, r, c, |r, c, i| (c >= i).then(|| (r, c - i)));
        let (r_max, _, r_max_off) = open_span(mask, r, c, |r, c, i| {
            (r + i < TILE_DIM).then(|| (r + i, c))
        });
        let (r_min, _, r_min_off) = open_span(mask, r, c, |r, c, i| (r >= i).then(|| (r - i, c)));

        let go_left = c_max_off < 2 && c_min >= 2;
        let go_right = c_min_off < 2 && c_max >= 2;
        let go_up = r_max_off < 2 && r_min >= 2;
        let go_down = r_min_off < 2 && r_max >= 2;

        let row_mid = (r_max + r_min) / 2;
        let col_mid = (c_max + c_min) / 2;
        if (go_left || go_right) && row_mid.abs_diff(r) > 2 {
            r = row_mid;
        } else if (go_up || go_down) && col_mid.abs_diff(c) > 2 {
            c = col_mid;
        } else {
            return Some((c, r));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathmap::VehicleType;
    use glam::UVec2;
    use pretty_assertions::assert_eq;

    fn blocked_mask(pred: impl Fn(usize, usize) -> bool) -> Vec<u8> {
        let mut mask = vec![0u8; TILE_BYTES];
        for row in 0..TILE_DIM {
            for col in 0..TILE_DIM {
                if pred(row, col) {
                    mask[row * ROW_BYTES + col / 8] |= 1 << (col % 8);
                }
            }
        }
        mask
    }

    #[test]
    fn test_nogo_tile_yields_zero_record() {
        let mut map = PathMap::new(VehicleType::Tank, 1);
        map.tiles[0] = Tile::NoGo;

        let so = Generator::new().generate(&map).unwrap();
        assert_eq!(so.tiles[0], SmallOnesTile::default());
    }

    #[test]
    fn test_dogo_tile_gets_default_point() {
        let map = PathMap::new(VehicleType::Tank, 1);
        let so = Generator::new().generate(&map).unwrap();

        let tile = &so.tiles[0];
        assert!(tile.active.contains_slot(0));
        assert!(!tile.active.contains_slot(1));
        assert_eq!(tile.points[0], UVec2::new(48, 48));

        let masks = so.masks.as_ref().unwrap();
        let mask = masks[0].masks[0].as_ref().unwrap();
        assert!(mask.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_diagonal_band_splits_two_regions() {
        // A 3-pixel diagonal wall leaves two triangles that never come
        // within reach of each other.
        let wall = blocked_mask(|row, col| col.abs_diff(row) <= 1);
        let regions = extract_regions(&wall);
        assert_eq!(regions.len(), 2);

        let mut map = PathMap::new(VehicleType::Infantry, 1);
        map.tiles[0] = Tile::Mixed(wall);
        let so = Generator::new().generate(&map).unwrap();

        let tile = &so.tiles[0];
        assert!(tile.active.contains_slot(0));
        assert!(tile.active.contains_slot(1));
        assert!(!tile.active.contains_slot(2));

        // Each waypoint lands inside its own region.
        let masks = so.masks.as_ref().unwrap();
        for slot in 0..2 {
            let pt = tile.points[slot];
            let mask = masks[0].masks[slot].as_ref().unwrap();
            assert!(passable(mask, pt.y as usize, pt.x as usize));
        }
    }

    #[test]
    fn test_u_shape_is_one_region() {
        // Two vertical arms joined at the bottom must union into one
        // region when the bridging rows are scanned.
        let arms = blocked_mask(|row, col| row < 48 && (10..54).contains(&col));
        let regions = extract_regions(&arms);

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].size, 64 * 64 - 48 * 44);
    }

    #[test]
    fn test_edge_region_outranks_larger_island() {
        // A big landlocked square and a small strip on the edge.
        let bits = blocked_mask(|row, col| {
            let island = (20..60).contains(&row) && (20..60).contains(&col);
            let strip = row == 0 && col < 8;
            !(island || strip)
        });
        let regions = extract_regions(&bits);
        assert_eq!(regions.len(), 2);

        let mut ranked = regions;
        ranked.sort_by_key(|r| std::cmp::Reverse(r.weight()));
        assert!(ranked[0].touches_edge());
        assert_eq!(ranked[0].size, 8);
    }

    #[test]
    fn test_skip_islands_option() {
        let bits = blocked_mask(|row, col| {
            !((20..24).contains(&row) && (20..24).contains(&col))
        });
        let mut map = PathMap::new(VehicleType::Tank, 1);
        map.tiles[0] = Tile::Mixed(bits);

        let so = Generator::with_options(GeneratorOptions { keep_islands: false })
            .generate(&map)
            .unwrap();
        assert_eq!(so.tiles[0].active.bits(), 0);

        let so = Generator::new().generate(&map).unwrap();
        assert!(so.tiles[0].active.contains_slot(0));
    }

    #[test]
    fn test_open_tiles_link_both_ways() {
        let map = PathMap::new(VehicleType::Car, 2);
        let so = Generator::new().generate(&map).unwrap();

        assert!(so.tiles[0].links_right.contains(Links::S0_TO_0));
        assert!(so.tiles[0].links_below.contains(Links::S0_TO_0));
        assert!(so.tiles[1].links_below.contains(Links::S0_TO_0));
        assert!(so.tiles[2].links_right.contains(Links::S0_TO_0));
        // Nothing below or right of the last tile.
        assert!(so.tiles[3].links_below.is_empty());
        assert!(so.tiles[3].links_right.is_empty());
    }

    #[test]
    fn test_wall_blocks_sideways_link() {
        let mut map = PathMap::new(VehicleType::Tank, 2);
        map.tiles[0] = Tile::Mixed(blocked_mask(|_, col| col == 63));

        let so = Generator::new().generate(&map).unwrap();
        assert!(so.tiles[0].links_right.is_empty());
        assert!(so.tiles[0].links_below.contains(Links::S0_TO_0));
    }

    #[test]
    fn test_recenter_moves_off_wall_hug() {
        // An L-shaped room; a point hugging the right wall of the top
        // strip slides to the open midpoint of its row.
        let bits = blocked_mask(|row, col| row >= 8 && col >= 8);
        let region = &extract_regions(&bits)[0];
        let mask = region.paint();

        assert_eq!(recenter(&mask, 62, 0), Some((31, 0)));
        // A point already near the middle stays put.
        assert_eq!(recenter(&mask, 30, 3), Some((30, 3)));
    }

    #[test]
    fn test_generate_rejects_compressed_input() {
        let mut map = PathMap::new(VehicleType::Tank, 1);
        map.level = 2;
        assert!(matches!(
            Generator::new().generate(&map),
            Err(GenerateError::NotLevelZero(2))
        ));
    }
}
