//! Matched filter rolling the transit shape across every slot of a chunk
//!
//! For a candidate transit centered at $t_i$ with the model vector $s$ (the shape evaluated at the
//! observed cadences and scaled by the baseline flux), the flux $f$ and the noise covariance $K$:
//! $$
//! \sigma_d^2 = \left(s^T K^{-1} s\right)^{-1},\quad
//! d = \sigma_d^2\, s^T K^{-1} f,\quad
//! \Delta\chi^2 = -2 \left(\ln\mathcal{L}_0 - \ln\mathcal{L}\right),
//! $$
//! where $\ln\mathcal{L}_0 = -\frac12 f^T K^{-1} f$ is the no-transit log-likelihood and
//! $\ln\mathcal{L} = -\frac12 r^T K^{-1} r$ with $r = f - d\,s$.
//!
//! All quadratic forms are evaluated on whitened vectors $L^{-1}x$, $K = L L^T$, so every
//! candidate costs a single forward substitution against the shared factorization.

use crate::array_stats::nan_median;
use crate::chunk::ChunkData;
use crate::cholesky::CholeskyFactor;
use crate::float_trait::Float;
use crate::grid::UniformGrid;
use crate::transit_shape::TransitShape;

use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use unzip3::Unzip3;

/// Flux level the unit-depth transit shape is scaled by
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Baseline {
    /// Median flux of the chunk, depth is measured in the units of the relative flux
    #[default]
    Median,
    /// No scaling, depth is measured in the flux units
    Unity,
}

/// Matched-filter output of a single chunk, one value per uniform grid slot
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkScan<T> {
    pub time: Array1<T>,
    pub depth: Array1<T>,
    pub variance: Array1<T>,
    pub delta_chisq: Array1<T>,
    /// Gap slots of the grid, their values are not detections
    pub gaps: Vec<usize>,
    /// Number of candidates with undefined depth variance
    pub degenerate: usize,
}

impl<T> ChunkScan<T>
where
    T: Float,
{
    fn empty() -> Self {
        Self {
            time: Array1::zeros(0),
            depth: Array1::zeros(0),
            variance: Array1::zeros(0),
            delta_chisq: Array1::zeros(0),
            gaps: vec![],
            degenerate: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Depth, its variance and $\Delta\chi^2$ of a single candidate, NaN if the model is degenerate
fn fit_candidate<T>(white_model: &Array1<T>, white_flux: &Array1<T>, ln_l0: T) -> (T, T, T)
where
    T: Float,
{
    let variance = white_model.dot(white_model).recip();
    if !variance.is_finite() || variance <= T::zero() {
        return (T::nan(), T::nan(), T::nan());
    }
    let depth = variance * white_model.dot(white_flux);
    let white_residual = white_flux - &(white_model * depth);
    let ln_l = -T::half() * white_residual.dot(&white_residual);
    let delta_chisq = -T::two() * (ln_l0 - ln_l);
    (depth, variance, delta_chisq)
}

/// Scan every grid slot of a chunk with the transit shape
///
/// `flux` and `factor` correspond to the observed slots of `grid`. The shape is evaluated on the
/// full grid, the gap slots are dropped before the likelihood evaluation. Candidates are
/// independent and evaluated in parallel.
pub fn scan_chunk<T, S>(
    grid: &UniformGrid<T>,
    flux: ArrayView1<T>,
    factor: &CholeskyFactor<T>,
    shape: &S,
    baseline: Baseline,
) -> ChunkScan<T>
where
    T: Float,
    S: TransitShape<T> + ?Sized,
{
    assert_eq!(
        flux.len(),
        factor.size(),
        "flux and covariance should have the same size"
    );
    assert_eq!(
        flux.len(),
        grid.len() - grid.gaps().len(),
        "flux size should match the number of observed grid slots"
    );

    let baseline_flux = match baseline {
        Baseline::Median => match nan_median(&flux.to_vec()) {
            Some(median) => median,
            None => return ChunkScan::empty(),
        },
        Baseline::Unity => T::one(),
    };

    let white_flux = factor.whiten(flux);
    let ln_l0 = -T::half() * white_flux.dot(&white_flux);

    let grid_t = grid.time();
    let (depth, variance, delta_chisq): (Vec<_>, Vec<_>, Vec<_>) = (0..grid.len())
        .into_par_iter()
        .map(|i| {
            let model = grid.observed_values(shape.shape(grid_t, grid_t[i]).view()) * baseline_flux;
            let white_model = factor.whiten(model.view());
            fit_candidate(&white_model, &white_flux, ln_l0)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .unzip3();

    let degenerate = variance.iter().filter(|v| v.is_nan()).count();
    if degenerate > 0 {
        log::warn!(
            "{} of {} candidates have undefined depth variance",
            degenerate,
            grid.len()
        );
    }

    ChunkScan {
        time: grid_t.to_owned(),
        depth: depth.into(),
        variance: variance.into(),
        delta_chisq: delta_chisq.into(),
        gaps: grid.gaps().to_vec(),
        degenerate,
    }
}

impl<T> ChunkData<T>
where
    T: Float,
{
    /// Run the matched filter over this chunk
    pub fn scan<S>(&self, shape: &S, baseline: Baseline) -> ChunkScan<T>
    where
        S: TransitShape<T> + ?Sized,
    {
        scan_chunk(&self.grid, self.flux.view(), &self.factor, shape, baseline)
    }
}
