#![doc = include_str!("../README.md")]

mod aggregate;
pub use aggregate::{Aggregator, SearchResult};

mod array_stats;

mod cache;
pub use cache::{CacheKey, JsonFileCache, MemoryCache, NoCache, SearchCache};

mod cholesky;
pub use cholesky::CholeskyFactor;

mod chunk;
pub use chunk::ChunkData;

mod covariance;
pub use covariance::{
    CovarianceProvider, Matern32Kernel, NoiseModel, SquaredExponentialKernel, WhiteNoise,
};

mod error;
pub use error::{
    CacheError, FoldError, GridError, LightCurveError, SearchError, SearchResultError,
    TabulatedShapeError,
};

mod float_trait;
pub use float_trait::Float;

mod fold;
pub use fold::{
    FoldCandidate, FoldGrid, FoldStatistic, NearestObservedIndex, NearestUniformIndex,
    PhaseFolder, TimeLookup, UndefinedPolicy,
};

mod grid;
pub use grid::{MAX_SLOTS_PER_CADENCE, UniformGrid};

mod light_curve;
pub use light_curve::{LightCurve, MaskKind, Systematics};

mod outliers;
pub use outliers::{OutlierFilter, savgol_quadratic};

mod scan;
pub use scan::{Baseline, ChunkScan, scan_chunk};

mod search;
pub use search::{SearchConfig, SearchOutcome, TransitSearch};

mod transit_shape;
pub use transit_shape::{BoxShape, TabulatedShape, TransitModel, TransitShape, TrapezoidShape};

pub use ndarray;
