use thiserror::Error;

/// Failures raised by the normalization core.
///
/// The I/O boundary (`data`, `config`) uses `anyhow`; everything that
/// touches the numbers returns one of these so callers can tell bad input
/// apart from a fit that cannot be performed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// Array lengths disagree, a segment is empty or out of bounds, or the
    /// wavelength axis is not strictly monotonic.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A segment has no usable weight, so no continuum can be fit.
    #[error("ill-posed fit in segment [{start}, {stop}): {reason}")]
    IllPosedFit {
        start: usize,
        stop: usize,
        reason: String,
    },

    /// Too few stars for ensemble statistics to mean anything.
    #[error("degenerate ensemble: {stars} star(s), at least 2 required")]
    DegenerateEnsemble { stars: usize },
}

impl NormalizeError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        NormalizeError::MalformedInput(msg.into())
    }
}

/// A star whose normalization failed, kept so the run can report it.
#[derive(Debug, Clone, PartialEq)]
pub struct StarFailure {
    /// Position of the star in the input ensemble.
    pub index: usize,
    pub id: String,
    pub error: NormalizeError,
}
