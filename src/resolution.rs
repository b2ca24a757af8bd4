//! Resolution/component geometry builder: derives, per tile, the precinct
//! partition of every (component, resolution) pair plus the stride
//! constants the iterator needs to size its visited-packet bitmap.

use crate::error::{PiError, PiResult};
use crate::geom::{ceil_div, ceil_div_pow2, floor_div_pow2, imax, imin};
use crate::model::{CodingParameters, Image, TileCodingParams};
use smallvec::SmallVec;

/// Precinct partition of one (component, resolution) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionGeom {
  pub pdx: u32,
  pub pdy: u32,
  pub pw: u32,
  pub ph: u32,
}

impl ResolutionGeom {
  pub fn num_precincts(&self) -> u32 {
    self.pw * self.ph
  }
}

/// One component's per-resolution geometry for a single tile.
#[derive(Debug, Clone)]
pub struct ComponentGeom {
  pub dx: u32,
  pub dy: u32,
  pub numresolutions: u32,
  pub resolutions: SmallVec<[ResolutionGeom; 8]>,
}

/// Full tile geometry: extents, per-component resolution tables, and the
/// maxima used to size the shared `include` bitmap.
#[derive(Debug, Clone)]
pub struct TileGeometry {
  pub tx0: i32,
  pub tx1: i32,
  pub ty0: i32,
  pub ty1: i32,
  pub dx_min: u32,
  pub dy_min: u32,
  pub max_res: u32,
  pub max_prec: u32,
  pub comps: Vec<ComponentGeom>,
}

/// Tile extents in canvas coordinates, clamped to the image canvas.
pub fn tile_extents(image: &Image, cp: &CodingParameters, tileno: u32) -> (i32, i32, i32, i32) {
  let p = (tileno % cp.tw) as i32;
  let q = (tileno / cp.tw) as i32;
  let tx0 = imax(cp.tx0 + p * cp.tdx, image.x0);
  let ty0 = imax(cp.ty0 + q * cp.tdy, image.y0);
  let tx1 = imin(cp.tx0 + (p + 1) * cp.tdx, image.x1);
  let ty1 = imin(cp.ty0 + (q + 1) * cp.tdy, image.y1);
  (tx0, tx1, ty0, ty1)
}

/// The precinct-exponent shift budget: `pdx + levelno` (and the `y` analog)
/// must stay below this so `1 << rp*` and `dx << rp*` remain valid,
/// non-overflowing `i32` shifts. See SPEC_FULL.md §9's note on the
/// reference's implicit `rpy < 31` precondition.
const MAX_SHIFT_EXPONENT: u32 = 30;

/// Computes the full per-tile geometry described in SPEC_FULL.md §4.2,
/// unifying the reference's duplicated `pi_create_decode` /
/// `pi_initialise_encode` inline computation and its factored
/// `get_all_encoding_parameters` path onto one procedure.
pub fn tile_geometry(
  image: &Image,
  cp: &CodingParameters,
  tcp: &TileCodingParams,
  tileno: u32,
) -> PiResult<TileGeometry> {
  if tileno >= cp.tw * cp.th {
    return Err(PiError::InvalidParameters(format!(
      "tile {tileno} out of range for a {}x{} tile grid",
      cp.tw, cp.th
    )));
  }
  if tcp.comps.len() != image.numcomps() {
    return Err(PiError::InvalidParameters(
      "tile coding parameters component count does not match image".into(),
    ));
  }

  let (tx0, tx1, ty0, ty1) = tile_extents(image, cp, tileno);

  let mut max_res = 0u32;
  let mut max_prec = 0u32;
  let mut dx_min = u32::MAX;
  let mut dy_min = u32::MAX;
  let mut comps = Vec::with_capacity(image.numcomps());

  for (compno, (img_comp, tccp)) in image.comps.iter().zip(tcp.comps.iter()).enumerate() {
    if tccp.numresolutions == 0 || tccp.numresolutions > crate::model::J2K_MAXRLVLS {
      return Err(PiError::InvalidParameters(format!(
        "component {compno} has {} resolutions, outside 1..={}",
        tccp.numresolutions,
        crate::model::J2K_MAXRLVLS
      )));
    }

    let tcx0 = ceil_div(tx0, img_comp.dx as i32);
    let tcy0 = ceil_div(ty0, img_comp.dy as i32);
    let tcx1 = ceil_div(tx1, img_comp.dx as i32);
    let tcy1 = ceil_div(ty1, img_comp.dy as i32);

    max_res = max_res.max(tccp.numresolutions);

    let mut resolutions = SmallVec::with_capacity(tccp.numresolutions as usize);
    for resno in 0..tccp.numresolutions {
      let levelno = tccp.numresolutions - 1 - resno;
      let (pdx, pdy) = tccp.precinct_exponents(resno as usize);

      if pdx + levelno >= MAX_SHIFT_EXPONENT || pdy + levelno >= MAX_SHIFT_EXPONENT {
        return Err(PiError::InvalidParameters(format!(
          "component {compno} resolution {resno}: precinct exponent + level {} overflows shift range",
          pdx.max(pdy) + levelno
        )));
      }

      let dx_cr = img_comp.dx * (1 << (pdx + levelno));
      let dy_cr = img_comp.dy * (1 << (pdy + levelno));
      dx_min = dx_min.min(dx_cr);
      dy_min = dy_min.min(dy_cr);

      let rx0 = ceil_div_pow2(tcx0, levelno as i32);
      let ry0 = ceil_div_pow2(tcy0, levelno as i32);
      let rx1 = ceil_div_pow2(tcx1, levelno as i32);
      let ry1 = ceil_div_pow2(tcy1, levelno as i32);

      let px0 = floor_div_pow2(rx0, pdx as i32) << pdx;
      let py0 = floor_div_pow2(ry0, pdy as i32) << pdy;
      let px1 = ceil_div_pow2(rx1, pdx as i32) << pdx;
      let py1 = ceil_div_pow2(ry1, pdy as i32) << pdy;

      let pw = if rx0 == rx1 { 0 } else { ((px1 - px0) >> pdx) as u32 };
      let ph = if ry0 == ry1 { 0 } else { ((py1 - py0) >> pdy) as u32 };

      max_prec = max_prec.max(pw * ph);
      resolutions.push(ResolutionGeom { pdx, pdy, pw, ph });
    }

    comps.push(ComponentGeom {
      dx: img_comp.dx,
      dy: img_comp.dy,
      numresolutions: tccp.numresolutions,
      resolutions,
    });
  }

  log::debug!(
    "tile {tileno}: extents=({tx0},{ty0})..({tx1},{ty1}) max_res={max_res} max_prec={max_prec}"
  );

  Ok(TileGeometry {
    tx0,
    tx1,
    ty0,
    ty1,
    dx_min,
    dy_min,
    max_res,
    max_prec,
    comps,
  })
}
