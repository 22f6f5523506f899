use std::path::PathBuf;

/// Error returned from [crate::LightCurve] constructors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LightCurveError {
    #[error("{name} array has length {actual}, but time array has length {expected}")]
    LengthMismatch {
        name: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("breakpoints must be strictly increasing, got {previous} followed by {next}")]
    UnsortedBreakpoints { previous: usize, next: usize },

    #[error("the last breakpoint must be the last cadence index {expected}, got {actual:?}")]
    LastBreakpoint {
        actual: Option<usize>,
        expected: usize,
    },

    #[error("{mask} mask index {index} is out of range for {len} cadences")]
    MaskOutOfRange {
        mask: &'static str,
        index: usize,
        len: usize,
    },

    #[error("systematics basis of order {order} has {actual} rows, {expected} are expected")]
    BasisRows {
        order: usize,
        actual: usize,
        expected: usize,
    },

    #[error("systematics weights must have {chunks} rows of {orders} values each")]
    WeightsShape { chunks: usize, orders: usize },
}

/// Error returned from [crate::TabulatedShape] constructors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TabulatedShapeError {
    #[error("offsets and values have different lengths: {offsets} and {values}")]
    LengthMismatch { offsets: usize, values: usize },

    #[error("at least two points are required, got {0}")]
    TooShort(usize),

    #[error("offsets must be strictly increasing")]
    Unsorted,

    #[error("relative flux has no dip below unity")]
    NoDip,
}

/// Error returned from [crate::UniformGrid] construction
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GridError {
    #[error("observed times are not strictly increasing at index {0}")]
    NonMonotonic(usize),

    #[error("cadence spacing is not a positive finite number")]
    InvalidSpacing,

    #[error("observed time at index {index} does not fall onto any uniform grid slot")]
    OffGrid { index: usize },

    #[error("uniform grid of {slots} slots is too large for {observed} observed times")]
    TooManySlots { slots: usize, observed: usize },

    #[error("only {consumed} of {total} observed times were placed onto the uniform grid")]
    Unconsumed { consumed: usize, total: usize },
}

/// Error returned from the on-disk or in-memory search cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cannot access cache file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot (de)serialize cache file {path}: {source}")]
    Serde {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("target {0:?} cannot be a part of a cache file name")]
    InvalidTarget(String),

    #[error("cache lock is poisoned")]
    Poisoned,
}

/// Error returned from [crate::SearchResult] constructors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchResultError {
    #[error("{name} array has length {actual}, but time array has length {expected}")]
    LengthMismatch {
        name: &'static str,
        actual: usize,
        expected: usize,
    },
}

/// Error returned from the transit search
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("chunk {chunk} covariance matrix is not positive-definite")]
    SingularCovariance { chunk: usize },

    #[error("chunk {chunk} cannot be placed onto a uniform time grid: {source}")]
    MalformedGrid { chunk: usize, source: GridError },

    #[error("chunk index {chunk} is out of range, light curve has {chunks} chunks")]
    ChunkOutOfRange { chunk: usize, chunks: usize },

    #[error("joint fit requires systematics basis matrices, but the light curve has none")]
    MissingSystematics,
}

/// Error returned from [crate::PhaseFolder]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FoldError {
    #[error("trial period at index {index} is {period}, periods must be positive and finite")]
    InvalidPeriod { index: usize, period: f64 },
}
