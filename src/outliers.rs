use crate::array_stats::{median_abs_deviation, nan_median};
use crate::cholesky::CholeskyFactor;
use crate::covariance::CovarianceProvider;
use crate::float_trait::Float;
use crate::light_curve::{LightCurve, MaskKind};

use conv::prelude::*;
use ndarray::{Array1, Array2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sigma-clipping of the high-pass filtered flux
///
/// The de-trended flux of the cadences outside of the [MaskKind::Nan] and [MaskKind::Bad] masks
/// is high-pass filtered by subtracting its quadratic Savitzky-Golay smoothing. A cadence is an
/// outlier if its filtered flux is more than `pos_tol` scaled median absolute deviations above
/// the median, or more than `neg_tol` below it. The negative tolerance is large by default to
/// keep transits.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct OutlierFilter {
    pos_tol: f64,
    neg_tol: f64,
    window: usize,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            pos_tol: 2.5,
            neg_tol: 50.0,
            window: 49,
        }
    }
}

impl OutlierFilter {
    pub fn new(pos_tol: f64, neg_tol: f64, window: usize) -> Self {
        Self::default()
            .with_pos_tol(pos_tol)
            .with_neg_tol(neg_tol)
            .with_window(window)
    }

    pub fn with_pos_tol(mut self, pos_tol: f64) -> Self {
        assert!(pos_tol > 0.0, "positive tolerance should be positive");
        self.pos_tol = pos_tol;
        self
    }

    pub fn with_neg_tol(mut self, neg_tol: f64) -> Self {
        assert!(neg_tol > 0.0, "negative tolerance should be positive");
        self.neg_tol = neg_tol;
        self
    }

    /// Savitzky-Golay window length, odd and at least three
    pub fn with_window(mut self, window: usize) -> Self {
        assert!(
            window >= 3 && window % 2 == 1,
            "window should be odd and not less than three"
        );
        self.window = window;
        self
    }

    pub fn pos_tol(&self) -> f64 {
        self.pos_tol
    }

    pub fn neg_tol(&self) -> f64 {
        self.neg_tol
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Indices of the outlier cadences
    pub fn outliers<T, C>(&self, lc: &LightCurve<T, C>) -> BTreeSet<usize>
    where
        T: Float,
        C: CovarianceProvider<T>,
    {
        let nan_mask = lc.mask(MaskKind::Nan);
        let bad_mask = lc.mask(MaskKind::Bad);
        let cadences: Vec<usize> = (0..lc.len())
            .filter(|i| !nan_mask.contains(i) && !bad_mask.contains(i))
            .collect();
        let flux: Vec<T> = cadences.iter().map(|&i| lc.flux()[i]).collect();

        let filtered = high_pass(&flux, self.window);
        let Some(median) = nan_median(&filtered) else {
            return BTreeSet::new();
        };
        let mad = match median_abs_deviation(&filtered, median) {
            Some(mad) if mad > T::zero() => mad,
            _ => {
                log::debug!("Flux has zero median absolute deviation, no outliers are masked");
                return BTreeSet::new();
            }
        };
        let pos_tol: T = self.pos_tol.approx().unwrap();
        let neg_tol: T = self.neg_tol.approx().unwrap();
        let upper = median + pos_tol * mad;
        let lower = median - neg_tol * mad;

        cadences
            .into_iter()
            .zip(filtered)
            .filter_map(|(i, f)| (f > upper || f < lower).then_some(i))
            .collect()
    }

    /// New light curve snapshot with the outlier mask replaced and the transit mask cleared
    pub fn apply<T, C>(&self, lc: &LightCurve<T, C>) -> LightCurve<T, C>
    where
        T: Float,
        C: CovarianceProvider<T>,
    {
        let outliers = self.outliers(lc);
        log::info!(
            "Masked {} outliers of {} cadences",
            outliers.len(),
            lc.len()
        );
        lc.clone().with_outliers(outliers)
    }
}

/// Quadratic Savitzky-Golay smoothing
///
/// Every point takes the value of the least-squares parabola fitted to the window centered on
/// it. Points closer to the edges than a half of the window use the parabola of the first or the
/// last full window. Series shorter than the window are returned as is.
pub fn savgol_quadratic<T>(y: &[T], window: usize) -> Vec<T>
where
    T: Float,
{
    assert!(
        window >= 3 && window % 2 == 1,
        "window should be odd and not less than three"
    );
    let n = y.len();
    if n < window {
        return y.to_vec();
    }
    let half = window / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            let x_i: T = i.approx().unwrap();
            let mut normal = Array2::zeros((3, 3));
            let mut rhs = Array1::zeros(3);
            for (j, &y_j) in y.iter().enumerate().skip(start).take(window) {
                let x_j: T = j.approx().unwrap();
                let x = x_j - x_i;
                let p = [T::one(), x, x * x];
                for r in 0..3 {
                    rhs[r] += p[r] * y_j;
                    for c in 0..3 {
                        normal[[r, c]] += p[r] * p[c];
                    }
                }
            }
            match CholeskyFactor::new(normal) {
                Some(factor) => factor.solve(rhs.view())[0],
                None => y[i],
            }
        })
        .collect()
}

/// Flux minus its smoothing, shifted back to the median level
///
/// Series shorter than the window are not filtered.
fn high_pass<T>(y: &[T], window: usize) -> Vec<T>
where
    T: Float,
{
    if y.len() < window {
        log::debug!(
            "{} cadences is less than the filter window {}, flux is clipped without filtering",
            y.len(),
            window
        );
        return y.to_vec();
    }
    let Some(median) = nan_median(y) else {
        return y.to_vec();
    };
    y.iter()
        .zip(savgol_quadratic(y, window))
        .map(|(&y, smooth)| y - smooth + median)
        .collect()
}
