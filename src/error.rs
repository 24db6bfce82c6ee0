use thiserror::Error;

/// Errors surfaced by the shape/buffer layer, the convolution operator, the
/// cost functions, and the optimizers. Construction-time errors are fatal;
/// per-iterate errors are returned alongside the last admitted iterate by
/// the driver (see [`crate::driver`]).
#[derive(Error, Debug)]
pub enum TipiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<i64>, got: Vec<i64> },

    #[error("offset {offset} out of range for axis {axis}: must satisfy 0 <= offset <= {max}")]
    BadOffset { axis: usize, offset: i64, max: i64 },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("data is non-finite at index {index} but its weight is positive ({weight})")]
    InconsistentMasking { index: usize, weight: f64 },

    #[error("{what} not configured")]
    NotConfigured { what: &'static str },

    #[error("numerical overflow: {0}")]
    NumericalOverflow(String),

    #[error("unsupported rank {rank} for {component}")]
    UnsupportedRank { rank: usize, component: &'static str },

    #[error("line search failed to satisfy the Wolfe conditions: {0}")]
    LineSearchFailed(String),

    #[error("search direction is not a descent direction")]
    NoDescent,

    #[error("optimization aborted by caller")]
    UserAborted,
}

pub type Result<T> = std::result::Result<T, TipiError>;
