/// Minimum element count to use Rayon parallelism in bulk array loops.
pub const PARALLEL_ELEMENT_THRESHOLD: usize = 65_536;

/// Primes the FFT backend factors efficiently; used by [`crate::shape::best_fft_dim`].
pub const FFT_FRIENDLY_PRIMES: [u64; 4] = [2, 3, 5, 7];

/// Default edge threshold used by the Moré-Thuente line search's curvature test
/// when the driver does not override it.
pub const DEFAULT_LINE_SEARCH_FTOL: f64 = 1e-3;
pub const DEFAULT_LINE_SEARCH_GTOL: f64 = 0.9;
pub const DEFAULT_LINE_SEARCH_XTOL: f64 = 1e-10;

/// Default L-BFGS memory size used by the driver when the caller passes `m <= 0`.
pub const DEFAULT_MEMORY_SIZE: usize = 5;

/// Default absolute gradient convergence threshold.
pub const DEFAULT_GATOL: f64 = 0.0;
/// Default relative gradient convergence threshold, measured against the
/// initial gradient's infinity norm.
pub const DEFAULT_GRTOL: f64 = 1e-6;

/// Default per-dimension regularizer scale when the caller does not supply one.
pub const DEFAULT_REGULARIZATION_SCALE: f64 = 1.0;

/// Relative curvature threshold `sᵀy > EPS_CURVATURE * ||s|| * ||y||` below
/// which an L-BFGS pair is rejected rather than admitted to the history ring.
pub const EPS_CURVATURE: f64 = 1e-10;
