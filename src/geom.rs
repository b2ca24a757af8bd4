//! Integer geometry helpers shared by the resolution/precinct math.
//!
//! All operate on signed 32-bit integers; callers are responsible for
//! keeping inputs within the bounds that image and tile extents imply
//! (at most `i32::MAX`).

/// `ceil(a / b)` for `b > 0`.
pub fn ceil_div(a: i32, b: i32) -> i32 {
  (a + b - 1) / b
}

/// `ceil(a / 2^k)` for `k >= 0`.
pub fn ceil_div_pow2(a: i32, k: i32) -> i32 {
  if k == 0 {
    a
  } else {
    (a + (1 << k) - 1) >> k
  }
}

/// `floor(a / 2^k)`, an arithmetic shift that preserves the sign of `a`.
pub fn floor_div_pow2(a: i32, k: i32) -> i32 {
  a >> k
}

pub fn imin(a: i32, b: i32) -> i32 {
  if a < b {
    a
  } else {
    b
  }
}

pub fn imax(a: i32, b: i32) -> i32 {
  if a > b {
    a
  } else {
    b
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ceil_div_rounds_up() {
    assert_eq!(ceil_div(7, 2), 4);
    assert_eq!(ceil_div(8, 2), 4);
    assert_eq!(ceil_div(0, 5), 0);
  }

  #[test]
  fn ceil_div_pow2_matches_ceil_div() {
    for a in 0..40 {
      for k in 0..5 {
        assert_eq!(ceil_div_pow2(a, k), ceil_div(a, 1 << k));
      }
    }
  }

  #[test]
  fn floor_div_pow2_is_arithmetic_shift() {
    assert_eq!(floor_div_pow2(7, 1), 3);
    assert_eq!(floor_div_pow2(-7, 1), -4);
  }

  #[test]
  fn min_max() {
    assert_eq!(imin(3, 5), 3);
    assert_eq!(imax(3, 5), 5);
    assert_eq!(imin(-1, 0), -1);
  }
}
