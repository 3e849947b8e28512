//! Derivation resolver: a memoizing store that loads, converts, and
//! persists maps on demand. Every derived map is cached by
//! `(kind, vehicle, level)` so repeated requests reuse earlier work.

use derive_more::derive::{Display, Error, From};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::info;
use crate::pathmap::{self, compress, EncodeOptions, PathMap, VehicleType, MAX_LEVEL};
use crate::smallones::{self, text, Generator, SmallOnes};

/// The map families the resolver can produce.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum MapKind {
    Pathmap,
    Info,
    SmallOnes,
}

/// Serialized form of a smallones map; pathmaps and info maps are always
/// binary.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum FileFormat {
    #[default]
    Binary,
    Text,
}

/// Cache key: one stored map per kind, vehicle, and level.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MapKey {
    pub kind: MapKind,
    pub vehicle: VehicleType,
    pub level: u8,
}

/// Names a map to resolve: what it is, and optionally where to load it
/// from when it is not already cached.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MapDescriptor {
    pub kind: MapKind,
    pub vehicle: VehicleType,
    pub level: u8,
    pub path: Option<PathBuf>,
    pub format: FileFormat,
}

impl MapDescriptor {
    pub fn new(kind: MapKind, vehicle: VehicleType, level: u8) -> MapDescriptor {
        MapDescriptor {
            kind,
            vehicle,
            level,
            path: None,
            format: FileFormat::Binary,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> MapDescriptor {
        self.path = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> MapDescriptor {
        self.format = format;
        self
    }

    fn key(&self) -> MapKey {
        MapKey {
            kind: self.kind,
            vehicle: self.vehicle,
            level: self.level,
        }
    }
}

/// Where and how to persist a resolved map. The default writes nothing.
#[derive(Clone, Debug, Default)]
pub struct OutputOptions {
    pub path: Option<PathBuf>,
    pub format: FileFormat,
    /// Pathmap binary options; ignored for smallones output.
    pub encode: EncodeOptions,
}

/// A cached map of either family.
#[derive(Clone, Debug)]
pub enum StoredMap {
    Pixels(PathMap),
    SmallOnes(SmallOnes),
}

#[non_exhaustive]
#[derive(Debug, Display, Error, From)]
pub enum ResolveError {
    /// An [IO](std::io) error.
    #[display("IO error: {_0}")]
    Io(std::io::Error),
    #[display("could not decode pathmap: {_0}")]
    PathmapDecode(pathmap::DecodeError),
    #[display("could not encode pathmap: {_0}")]
    PathmapEncode(pathmap::EncodeError),
    #[display("could not compress pathmap: {_0}")]
    Compress(pathmap::CompressError),
    #[display("could not decode smallones: {_0}")]
    SmallOnesDecode(smallones::DecodeError),
    #[display("could not encode smallones: {_0}")]
    SmallOnesEncode(smallones::EncodeError),
    #[display("could not decode smallones text: {_0}")]
    TextDecode(text::DecodeError),
    #[display("could not generate waypoints: {_0}")]
    Generate(smallones::GenerateError),
    #[display("could not derive info map: {_0}")]
    Derive(info::DeriveError),
    /// The map is not cached and the descriptor names no file to load.
    #[display("no source available for the requested map")]
    NotFound,
    /// A loaded file's header disagrees with its descriptor.
    #[display("loaded map does not match its descriptor")]
    SourceMismatch,
    #[display("unsupported derivation: {_0}")]
    #[from(skip)]
    NotSupported(#[error(not(source))] String),
}

/// The memoizing map store. Single-threaded by design: resolution is a
/// short batch activity, not a service.
#[derive(Debug, Default)]
pub struct MapStore {
    maps: IndexMap<MapKey, StoredMap>,
    generator: Generator,
}

impl MapStore {
    pub fn new() -> MapStore {
        MapStore::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, key: &MapKey) -> Option<&StoredMap> {
        self.maps.get(key)
    }

    /// Seeds the store with an already-built map.
    pub fn insert_pathmap(&mut self, map: PathMap) {
        let key = MapKey {
            kind: if map.is_info {
                MapKind::Info
            } else {
                MapKind::Pathmap
            },
            vehicle: map.vehicle,
            level: map.level,
        };
        self.maps.insert(key, StoredMap::Pixels(map));
    }

    pub fn insert_smallones(&mut self, so: SmallOnes) {
        let key = MapKey {
            kind: MapKind::SmallOnes,
            vehicle: so.vehicle,
            level: 0,
        };
        self.maps.insert(key, StoredMap::SmallOnes(so));
    }

    /// Resolves `dst`, deriving it from `src` (loading `src` from disk if
    /// needed) unless it is already cached, then persists it according to
    /// `out`. A load or derivation failure leaves the store's existing
    /// entries untouched, so a batch caller can skip the input and move
    /// on.
    pub fn resolve(
        &mut self,
        src: &MapDescriptor,
        dst: &MapDescriptor,
        out: &OutputOptions,
    ) -> Result<&StoredMap, ResolveError> {
        let key = dst.key();
        if self.maps.contains_key(&key) {
            debug!(
                "reusing cached {:?} {:?} map at level {}",
                key.kind, key.vehicle, key.level
            );
        } else {
            self.ensure_loaded(src)?;
            self.derive_into(src, dst)?;
        }

        let map = self.maps.get(&key).ok_or(ResolveError::NotFound)?;
        if let Some(path) = &out.path {
            debug!("writing resolved map to {}", path.display());
            write_map(map, path, out)?;
        }
        Ok(map)
    }

    /// Loads the source map from its file unless a map with the same key
    /// is already cached.
    fn ensure_loaded(&mut self, src: &MapDescriptor) -> Result<(), ResolveError> {
        if self.maps.contains_key(&src.key()) {
            return Ok(());
        }
        let path = src.path.as_ref().ok_or(ResolveError::NotFound)?;
        debug!(
            "loading {:?} {:?} map from {}",
            src.kind,
            src.vehicle,
            path.display()
        );

        let file = BufReader::new(File::open(path)?);
        let map = match (src.kind, src.format) {
            (MapKind::Pathmap | MapKind::Info, _) => {
                let map = pathmap::Decoder::new(file).decode(src.vehicle)?;
                let is_info = src.kind == MapKind::Info;
                if map.is_info != is_info || map.level != src.level {
                    return Err(ResolveError::SourceMismatch);
                }
                StoredMap::Pixels(map)
            }
            (MapKind::SmallOnes, FileFormat::Binary) => {
                StoredMap::SmallOnes(smallones::Decoder::new(file).decode(src.vehicle)?)
            }
            (MapKind::SmallOnes, FileFormat::Text) => {
                StoredMap::SmallOnes(text::Decoder::new(file).decode(src.vehicle)?)
            }
        };
        self.maps.insert(src.key(), map);
        Ok(())
    }

    fn derive_into(
        &mut self,
        src: &MapDescriptor,
        dst: &MapDescriptor,
    ) -> Result<(), ResolveError> {
        match dst.kind {
            MapKind::Pathmap => self.compress_to(src, dst),
            MapKind::SmallOnes => {
                self.generate_smallones(dst.vehicle)?;
                Ok(())
            }
            MapKind::Info => self.derive_info(src, dst),
        }
    }

    /// Compresses the cached raw map level by level up to `dst.level`,
    /// caching every intermediate.
    fn compress_to(&mut self, src: &MapDescriptor, dst: &MapDescriptor) -> Result<(), ResolveError> {
        if src.kind != MapKind::Pathmap {
            return Err(ResolveError::NotSupported(format!(
                "cannot convert {:?} to a pathmap",
                src.kind
            )));
        }
        if dst.level < src.level {
            return Err(ResolveError::NotSupported(format!(
                "cannot decompress level {} to level {}",
                src.level, dst.level
            )));
        }
        if dst.level > MAX_LEVEL {
            return Err(ResolveError::NotSupported(format!(
                "level {} is beyond the coarsest supported level",
                dst.level
            )));
        }

        for level in src.level..dst.level {
            let from = MapKey {
                kind: MapKind::Pathmap,
                vehicle: dst.vehicle,
                level,
            };
            let to = MapKey { level: level + 1, ..from };
            if self.maps.contains_key(&to) {
                continue;
            }
            let Some(StoredMap::Pixels(map)) = self.maps.get(&from) else {
                return Err(ResolveError::NotFound);
            };
            let compressed = compress(map)?;
            self.maps.insert(to, StoredMap::Pixels(compressed));
        }
        Ok(())
    }

    /// Generates the waypoint map from the cached level-0 raw map.
    fn generate_smallones(&mut self, vehicle: VehicleType) -> Result<&SmallOnes, ResolveError> {
        let key = MapKey {
            kind: MapKind::SmallOnes,
            vehicle,
            level: 0,
        };
        if !self.maps.contains_key(&key) {
            let raw = MapKey {
                kind: MapKind::Pathmap,
                vehicle,
                level: 0,
            };
            let Some(StoredMap::Pixels(map)) = self.maps.get(&raw) else {
                return Err(ResolveError::NotFound);
            };
            let so = self.generator.generate(map)?;
            self.maps.insert(key, StoredMap::SmallOnes(so));
        }
        match self.maps.get(&key) {
            Some(StoredMap::SmallOnes(so)) => Ok(so),
            _ => Err(ResolveError::NotFound),
        }
    }

    /// Derives the info map from the vehicle's waypoint map, regenerating
    /// the waypoints from the raw map when the cached ones carry no
    /// region masks (maps loaded from files never do).
    fn derive_info(&mut self, src: &MapDescriptor, dst: &MapDescriptor) -> Result<(), ResolveError> {
        if dst.level != dst.vehicle.info_level() {
            return Err(ResolveError::NotSupported(format!(
                "info maps for {:?} exist only at level {}",
                dst.vehicle,
                dst.vehicle.info_level()
            )));
        }

        let key = MapKey {
            kind: MapKind::SmallOnes,
            vehicle: dst.vehicle,
            level: 0,
        };
        let needs_regen = match self.maps.get(&key) {
            Some(StoredMap::SmallOnes(so)) => !so.has_masks(),
            _ => true,
        };
        if needs_regen {
            if src.kind == MapKind::SmallOnes && !self.maps.contains_key(&MapKey {
                kind: MapKind::Pathmap,
                vehicle: dst.vehicle,
                level: 0,
            }) {
                return Err(ResolveError::NotSupported(
                    "info derivation needs the level-0 raw map to rebuild region masks"
                        .to_owned(),
                ));
            }
            self.maps.shift_remove(&key);
        }

        let so = self.generate_smallones(dst.vehicle)?;
        let info = info::derive(so)?;
        self.maps.insert(dst.key(), StoredMap::Pixels(info));
        Ok(())
    }
}

fn write_map(map: &StoredMap, path: &Path, out: &OutputOptions) -> Result<(), ResolveError> {
    let file = File::create(path)?;
    match (map, out.format) {
        (StoredMap::Pixels(map), FileFormat::Binary) => {
            pathmap::Encoder::with_options(file, out.encode).encode(map)?;
        }
        (StoredMap::Pixels(_), FileFormat::Text) => {
            return Err(ResolveError::NotSupported(
                "pathmaps have no text form".to_owned(),
            ));
        }
        (StoredMap::SmallOnes(so), FileFormat::Binary) => {
            smallones::Encoder::new(file).encode(so)?;
        }
        (StoredMap::SmallOnes(so), FileFormat::Text) => {
            text::Encoder::new(file).encode(so)?;
        }
    }
    Ok(())
}
