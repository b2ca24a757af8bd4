//! Read-only input data model: image, coding parameters, POC segments.

use bitflags::bitflags;
use smallvec::SmallVec;

/// Maximum number of resolution levels a component may declare, mirroring
/// the reference codec's `J2K_MAXRLVLS` limit.
pub const J2K_MAXRLVLS: u32 = 33;

/// Maximum precinct size exponent (2^15 samples), also the default when a
/// component declares no explicit precinct partition.
pub const DEFAULT_PRECINCT_EXPONENT: u32 = 15;

bitflags! {
  /// Per-component coding-style flags relevant to the packet iterator.
  #[derive(Default)]
  pub struct CodingStyle: u8 {
    /// Explicit per-resolution precinct sizes are present (`SPcod`/`SPcoc`
    /// precinct-size bytes follow); otherwise every resolution defaults to
    /// `DEFAULT_PRECINCT_EXPONENT` in both axes.
    const PRECINCT_SIZES = 0b0000_0001;
  }
}

/// One of the five progression orders the iterator can walk, plus the
/// "not yet assigned" sentinel carried by a freshly parsed but unresolved
/// POC segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progression {
  /// Layer - Resolution - Component - Precinct.
  Lrcp,
  /// Resolution - Layer - Component - Precinct.
  Rlcp,
  /// Resolution - Position - Component - Layer.
  Rpcl,
  /// Position - Component - Resolution - Layer.
  Pcrl,
  /// Component - Position - Resolution - Layer.
  Cprl,
  /// No progression could be determined; `next` always reports exhausted.
  Unknown,
}

impl Progression {
  /// The four-character progression string used by tile-part axis slicing
  /// (`"LRCP"`, `"RLCP"`, `"RPCL"`, `"PCRL"`, `"CPRL"`). `Unknown` has none.
  pub fn axis_letters(self) -> Option<[char; 4]> {
    match self {
      Progression::Lrcp => Some(['L', 'R', 'C', 'P']),
      Progression::Rlcp => Some(['R', 'L', 'C', 'P']),
      Progression::Rpcl => Some(['R', 'P', 'C', 'L']),
      Progression::Pcrl => Some(['P', 'C', 'R', 'L']),
      Progression::Cprl => Some(['C', 'P', 'R', 'L']),
      Progression::Unknown => None,
    }
  }
}

/// Encoder pass this iterator array is being constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
  /// Rate-distortion threshold search: tile-part slicing is not yet final.
  ThreshCalc,
  /// Final emission pass: tile-part slicing (if enabled) takes effect.
  FinalPass,
}

/// One image component's canvas-level geometry.
#[derive(Debug, Clone, Copy)]
pub struct ImageComponent {
  /// Horizontal subsampling step, >= 1.
  pub dx: u32,
  /// Vertical subsampling step, >= 1.
  pub dy: u32,
}

/// Canvas-level image description (read-only input).
#[derive(Debug, Clone)]
pub struct Image {
  pub x0: i32,
  pub y0: i32,
  pub x1: i32,
  pub y1: i32,
  pub comps: Vec<ImageComponent>,
}

impl Image {
  pub fn numcomps(&self) -> usize {
    self.comps.len()
  }
}

/// Per-component, per-resolution explicit precinct size, when declared.
#[derive(Debug, Clone)]
pub struct ComponentCodingParams {
  pub numresolutions: u32,
  pub csty: CodingStyle,
  /// Explicit precinct width/height exponents, one pair per resolution,
  /// present only when `csty.contains(CodingStyle::PRECINCT_SIZES)`.
  pub prcw: SmallVec<[u32; 8]>,
  pub prch: SmallVec<[u32; 8]>,
}

impl ComponentCodingParams {
  /// `(pdx, pdy)` for resolution `resno`: the explicit size if declared,
  /// else the maximum-precinct default.
  pub fn precinct_exponents(&self, resno: usize) -> (u32, u32) {
    if self.csty.contains(CodingStyle::PRECINCT_SIZES) {
      (self.prcw[resno], self.prch[resno])
    } else {
      (DEFAULT_PRECINCT_EXPONENT, DEFAULT_PRECINCT_EXPONENT)
    }
  }
}

/// A progression-order-change segment: an index box plus the progression
/// to walk it in.
#[derive(Debug, Clone, Copy)]
pub struct PocSegment {
  pub resno0: u32,
  pub resno1: u32,
  pub compno0: u32,
  pub compno1: u32,
  pub layno0: u32,
  pub layno1: u32,
  pub prg: Progression,
  /// Spatial window in canvas coordinates; `None` lets the iterator use
  /// the full tile extent (the common case for non-tile-part decoding).
  pub tile_window: Option<(i32, i32, i32, i32)>,
}

/// Per-tile coding parameters: layer count, default progression, optional
/// POC segments, and per-component parameters.
#[derive(Debug, Clone)]
pub struct TileCodingParams {
  pub numlayers: u32,
  pub prg: Progression,
  pub pocs: Vec<PocSegment>,
  pub comps: Vec<ComponentCodingParams>,
  /// Whether tile-part slicing is enabled for this tile (encoder only).
  pub tp_on: bool,
}

impl TileCodingParams {
  pub fn numpocs(&self) -> usize {
    self.pocs.len()
  }
}

/// Tile-grid coding parameters shared by every tile.
#[derive(Debug, Clone)]
pub struct CodingParameters {
  pub tx0: i32,
  pub ty0: i32,
  pub tdx: i32,
  pub tdy: i32,
  pub tw: u32,
  pub th: u32,
  pub tcps: Vec<TileCodingParams>,
}

impl CodingParameters {
  pub fn tile(&self, tileno: u32) -> &TileCodingParams {
    &self.tcps[tileno as usize]
  }
}
