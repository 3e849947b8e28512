pub mod info;
pub mod pathmap;
pub mod resolver;
pub mod smallones;

pub mod prelude {
    #[doc(hidden)]
    pub use crate::pathmap::{PathMap, Tile, VehicleType};
    #[doc(hidden)]
    pub use crate::resolver::{MapDescriptor, MapKind, MapStore, OutputOptions};
    #[doc(hidden)]
    pub use crate::smallones::{Generator, SmallOnes, SmallOnesTile};
}
