use std::fmt;

/// Failure modes of the packet-iterator subsystem.
///
/// `Exhausted` is deliberately not a variant here: running out of packets
/// is ordinary iterator termination, signaled by `None`/`false`, not an
/// error (see SPEC_FULL.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PiError {
  /// A precondition on the caller-supplied `Image`/`CodingParameters` was
  /// violated (tile index out of range, resolution count over the codec
  /// limit, malformed precinct exponent, ...).
  InvalidParameters(String),
  /// The underlying allocation strategy could not provide storage for the
  /// iterator array or its shared `include` bitmap.
  AllocFailure(String),
}

impl fmt::Display for PiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PiError::InvalidParameters(msg) => write!(f, "invalid packet-iterator parameters: {msg}"),
      PiError::AllocFailure(msg) => write!(f, "packet-iterator allocation failure: {msg}"),
    }
  }
}

impl std::error::Error for PiError {}

pub type PiResult<T> = Result<T, PiError>;
