//! Packet iterator for a JPEG 2000 tile: walks the `(layer, resolution,
//! component, precinct)` quadruples a tile's coding parameters require,
//! in whichever of the five progression orders (LRCP/RLCP/RPCL/PCRL/CPRL)
//! is in force, honoring progression-order-change (POC) restrictions and
//! encoder tile-part slicing. See `SPEC_FULL.md` for the full contract.

pub mod error;
pub mod geom;
pub mod iterator;
pub mod model;
pub mod resolution;

pub use error::{PiError, PiResult};
pub use iterator::{Packet, PacketIterator, PacketIteratorArray};
pub use model::{
  CodingParameters, CodingStyle, ComponentCodingParams, EncodeMode, Image, ImageComponent,
  PocSegment, Progression, TileCodingParams,
};
pub use resolution::{tile_extents, tile_geometry, ComponentGeom, ResolutionGeom, TileGeometry};
