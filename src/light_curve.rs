use crate::covariance::{CovarianceProvider, NoiseModel};
use crate::error::LightCurveError;
use crate::float_trait::Float;

use ndarray::{Array1, Array2, ArrayView1};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Kind of cadence exclusion mask
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Non-finite time or flux values
    Nan,
    /// Cadences flagged bad by the data quality pipeline
    Bad,
    /// Cadences rejected by the [OutlierFilter](crate::OutlierFilter)
    Outlier,
    /// Cadences inside known transits
    Transit,
}

impl MaskKind {
    fn name(self) -> &'static str {
        match self {
            Self::Nan => "nan",
            Self::Bad => "bad",
            Self::Outlier => "outlier",
            Self::Transit => "transit",
        }
    }
}

/// Instrumental systematics basis used by the joint fit
///
/// `basis[n]` is the design matrix of the systematics order `n`, it has a row per cadence of the
/// light curve. `weights[b][n]` is the regularization weight of the order `n` in the chunk `b`.
#[derive(Clone, Debug)]
pub struct Systematics<T> {
    pub basis: Vec<Array2<T>>,
    pub weights: Vec<Vec<T>>,
}

impl<T> Systematics<T>
where
    T: Float,
{
    pub fn new(basis: Vec<Array2<T>>, weights: Vec<Vec<T>>) -> Self {
        Self { basis, weights }
    }

    pub fn orders(&self) -> usize {
        self.basis.len()
    }

    /// $\sum_n \lambda_{bn} X_n X_n^T$ restricted to the given cadences
    pub(crate) fn covariance(&self, chunk: usize, cadences: &[usize]) -> Array2<T> {
        let n = cadences.len();
        let mut a = Array2::zeros((n, n));
        for (x, &lambda) in self.basis.iter().zip(self.weights[chunk].iter()) {
            let x_m = x.select(ndarray::Axis(0), cadences);
            a.scaled_add(lambda, &x_m.dot(&x_m.t()));
        }
        a
    }
}

/// Light curve snapshot searched for transits
///
/// The snapshot is immutable during the search: the chunk preparer borrows read-only views of it.
/// Breakpoints are the inclusive last cadence indices of the chunks, so the last breakpoint is
/// always the last cadence. The noise model is any [CovarianceProvider], [NoiseModel] by
/// default.
#[derive(Clone, Debug)]
pub struct LightCurve<T, C = NoiseModel<T>>
where
    T: Float,
{
    time: Array1<T>,
    flux: Array1<T>,
    flux_raw: Array1<T>,
    flux_err: Array1<T>,
    breakpoints: Vec<usize>,
    noise_model: C,
    nan_mask: BTreeSet<usize>,
    bad_mask: BTreeSet<usize>,
    outlier_mask: BTreeSet<usize>,
    transit_mask: BTreeSet<usize>,
    systematics: Option<Systematics<T>>,
}

impl<T, C> LightCurve<T, C>
where
    T: Float,
    C: CovarianceProvider<T>,
{
    /// Construct a light curve
    ///
    /// `flux` is the de-trended flux, `flux_raw` is the flux before de-trending, `flux_err` is
    /// the flux uncertainty. Cadences with any non-finite value are put into the
    /// [MaskKind::Nan] mask.
    pub fn new(
        time: impl Into<Array1<T>>,
        flux: impl Into<Array1<T>>,
        flux_raw: impl Into<Array1<T>>,
        flux_err: impl Into<Array1<T>>,
        breakpoints: Vec<usize>,
        noise_model: C,
    ) -> Result<Self, LightCurveError> {
        let time = time.into();
        let flux = flux.into();
        let flux_raw = flux_raw.into();
        let flux_err = flux_err.into();

        let len = time.len();
        for (name, a) in [("flux", &flux), ("flux_raw", &flux_raw), ("flux_err", &flux_err)] {
            if a.len() != len {
                return Err(LightCurveError::LengthMismatch {
                    name,
                    actual: a.len(),
                    expected: len,
                });
            }
        }

        for w in breakpoints.windows(2) {
            if w[0] >= w[1] {
                return Err(LightCurveError::UnsortedBreakpoints {
                    previous: w[0],
                    next: w[1],
                });
            }
        }
        if len > 0 && breakpoints.last() != Some(&(len - 1)) {
            return Err(LightCurveError::LastBreakpoint {
                actual: breakpoints.last().copied(),
                expected: len - 1,
            });
        }

        let nan_mask = (0..len)
            .filter(|&i| {
                !(time[i].is_finite()
                    && flux[i].is_finite()
                    && flux_raw[i].is_finite()
                    && flux_err[i].is_finite())
            })
            .collect();

        Ok(Self {
            time,
            flux,
            flux_raw,
            flux_err,
            breakpoints,
            noise_model,
            nan_mask,
            bad_mask: BTreeSet::new(),
            outlier_mask: BTreeSet::new(),
            transit_mask: BTreeSet::new(),
            systematics: None,
        })
    }

    /// Light curve without de-trending: the raw flux is used as the de-trended one
    pub fn from_raw(
        time: impl Into<Array1<T>>,
        flux: impl Into<Array1<T>>,
        flux_err: impl Into<Array1<T>>,
        breakpoints: Vec<usize>,
        noise_model: C,
    ) -> Result<Self, LightCurveError> {
        let flux = flux.into();
        Self::new(
            time,
            flux.clone(),
            flux,
            flux_err,
            breakpoints,
            noise_model,
        )
    }

    /// Replace one of the masks, [MaskKind::Nan] is extended rather than replaced
    pub fn with_mask(
        mut self,
        kind: MaskKind,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<Self, LightCurveError> {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        if let Some(&index) = indices.iter().next_back() {
            if index >= self.len() {
                return Err(LightCurveError::MaskOutOfRange {
                    mask: kind.name(),
                    index,
                    len: self.len(),
                });
            }
        }
        match kind {
            MaskKind::Nan => self.nan_mask.extend(indices),
            MaskKind::Bad => self.bad_mask = indices,
            MaskKind::Outlier => self.outlier_mask = indices,
            MaskKind::Transit => self.transit_mask = indices,
        }
        Ok(self)
    }

    /// Replace the outlier mask with cadences known to be in range and clear the transit mask
    pub(crate) fn with_outliers(mut self, outliers: BTreeSet<usize>) -> Self {
        self.outlier_mask = outliers;
        self.transit_mask.clear();
        self
    }

    /// Same light curve under another noise model
    pub fn with_noise_model<C2>(self, noise_model: C2) -> LightCurve<T, C2>
    where
        C2: CovarianceProvider<T>,
    {
        LightCurve {
            time: self.time,
            flux: self.flux,
            flux_raw: self.flux_raw,
            flux_err: self.flux_err,
            breakpoints: self.breakpoints,
            noise_model,
            nan_mask: self.nan_mask,
            bad_mask: self.bad_mask,
            outlier_mask: self.outlier_mask,
            transit_mask: self.transit_mask,
            systematics: self.systematics,
        }
    }

    /// Attach the systematics basis needed by the joint fit
    pub fn with_systematics(mut self, systematics: Systematics<T>) -> Result<Self, LightCurveError> {
        for (order, x) in systematics.basis.iter().enumerate() {
            if x.nrows() != self.len() {
                return Err(LightCurveError::BasisRows {
                    order,
                    actual: x.nrows(),
                    expected: self.len(),
                });
            }
        }
        let weights_ok = systematics.weights.len() == self.n_chunks()
            && systematics
                .weights
                .iter()
                .all(|w| w.len() == systematics.orders());
        if !weights_ok {
            return Err(LightCurveError::WeightsShape {
                chunks: self.n_chunks(),
                orders: systematics.orders(),
            });
        }
        self.systematics = Some(systematics);
        Ok(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn n_chunks(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn time(&self) -> ArrayView1<'_, T> {
        self.time.view()
    }

    pub fn flux(&self) -> ArrayView1<'_, T> {
        self.flux.view()
    }

    pub fn flux_raw(&self) -> ArrayView1<'_, T> {
        self.flux_raw.view()
    }

    pub fn flux_err(&self) -> ArrayView1<'_, T> {
        self.flux_err.view()
    }

    pub fn breakpoints(&self) -> &[usize] {
        &self.breakpoints
    }

    pub fn noise_model(&self) -> &C {
        &self.noise_model
    }

    pub fn systematics(&self) -> Option<&Systematics<T>> {
        self.systematics.as_ref()
    }

    pub fn mask(&self, kind: MaskKind) -> &BTreeSet<usize> {
        match kind {
            MaskKind::Nan => &self.nan_mask,
            MaskKind::Bad => &self.bad_mask,
            MaskKind::Outlier => &self.outlier_mask,
            MaskKind::Transit => &self.transit_mask,
        }
    }

    /// Is the cadence excluded by any of the masks?
    pub fn is_masked(&self, i: usize) -> bool {
        self.nan_mask.contains(&i)
            || self.bad_mask.contains(&i)
            || self.outlier_mask.contains(&i)
            || self.transit_mask.contains(&i)
    }

    /// Cadence range of the chunk, including masked cadences
    pub fn chunk_range(&self, chunk: usize) -> Option<RangeInclusive<usize>> {
        let end = *self.breakpoints.get(chunk)?;
        let start = match chunk {
            0 => 0,
            _ => self.breakpoints[chunk - 1] + 1,
        };
        Some(start..=end)
    }

    /// Indices of the unmasked cadences of the chunk, no padding into the neighbour chunks
    pub fn masked_chunk(&self, chunk: usize) -> Option<Vec<usize>> {
        let range = self.chunk_range(chunk)?;
        Some(range.filter(|&i| !self.is_masked(i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::Array2;

    fn light_curve(n: usize, breakpoints: Vec<usize>) -> Result<LightCurve<f64>, LightCurveError> {
        let t: Vec<_> = (0..n).map(|i| i as f64).collect();
        LightCurve::from_raw(
            t,
            vec![1.0; n],
            vec![0.1; n],
            breakpoints,
            NoiseModel::white(),
        )
    }

    #[test]
    fn chunks_split_at_breakpoints() {
        let lc = light_curve(10, vec![3, 6, 9]).unwrap();
        assert_eq!(lc.n_chunks(), 3);
        assert_eq!(lc.chunk_range(0), Some(0..=3));
        assert_eq!(lc.chunk_range(1), Some(4..=6));
        assert_eq!(lc.chunk_range(2), Some(7..=9));
        assert_eq!(lc.chunk_range(3), None);
    }

    #[test]
    fn masked_chunk_excludes_all_masks() {
        let lc = light_curve(10, vec![4, 9])
            .unwrap()
            .with_mask(MaskKind::Bad, [1])
            .unwrap()
            .with_mask(MaskKind::Outlier, [3, 5])
            .unwrap()
            .with_mask(MaskKind::Transit, [9])
            .unwrap();
        assert_eq!(lc.masked_chunk(0), Some(vec![0, 2, 4]));
        assert_eq!(lc.masked_chunk(1), Some(vec![6, 7, 8]));
    }

    #[test]
    fn non_finite_values_are_nan_masked() {
        let lc = LightCurve::from_raw(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![1.0, f64::NAN, 1.0, 1.0],
            vec![0.1, 0.1, f64::INFINITY, 0.1],
            vec![3],
            NoiseModel::white(),
        )
        .unwrap();
        assert_eq!(lc.mask(MaskKind::Nan), &BTreeSet::from([1, 2]));
        assert_eq!(lc.masked_chunk(0), Some(vec![0, 3]));
        let lc = lc.with_mask(MaskKind::Nan, [0]).unwrap();
        assert_eq!(lc.mask(MaskKind::Nan), &BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn length_mismatch() {
        let err = LightCurve::<f64>::new(
            vec![0.0, 1.0],
            vec![1.0, 1.0],
            vec![1.0],
            vec![0.1, 0.1],
            vec![1],
            NoiseModel::white(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            LightCurveError::LengthMismatch {
                name: "flux_raw",
                actual: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn invalid_breakpoints() {
        assert_eq!(
            light_curve(5, vec![2, 2, 4]).unwrap_err(),
            LightCurveError::UnsortedBreakpoints {
                previous: 2,
                next: 2
            }
        );
        assert_eq!(
            light_curve(5, vec![2]).unwrap_err(),
            LightCurveError::LastBreakpoint {
                actual: Some(2),
                expected: 4
            }
        );
        assert!(light_curve(0, vec![]).unwrap().is_empty());
    }

    #[test]
    fn mask_out_of_range() {
        let err = light_curve(5, vec![4])
            .unwrap()
            .with_mask(MaskKind::Outlier, [7])
            .unwrap_err();
        assert_eq!(
            err,
            LightCurveError::MaskOutOfRange {
                mask: "outlier",
                index: 7,
                len: 5
            }
        );
    }

    #[test]
    fn systematics_shape_is_checked() {
        let lc = light_curve(6, vec![2, 5]).unwrap();
        let basis = vec![Array2::ones((6, 2))];
        assert!(
            lc.clone()
                .with_systematics(Systematics::new(basis.clone(), vec![vec![1.0], vec![2.0]]))
                .is_ok()
        );
        assert_eq!(
            lc.clone()
                .with_systematics(Systematics::new(basis, vec![vec![1.0]]))
                .unwrap_err(),
            LightCurveError::WeightsShape {
                chunks: 2,
                orders: 1
            }
        );
        assert_eq!(
            lc.with_systematics(Systematics::new(
                vec![Array2::ones((5, 2))],
                vec![vec![1.0], vec![2.0]]
            ))
            .unwrap_err(),
            LightCurveError::BasisRows {
                order: 0,
                actual: 5,
                expected: 6
            }
        );
    }

    #[test]
    fn systematics_covariance() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let sys = Systematics::new(vec![x], vec![vec![2.0]]);
        let a = sys.covariance(0, &[0, 2]);
        assert_eq!(
            a,
            Array2::from_shape_vec((2, 2), vec![2.0, 6.0, 6.0, 18.0]).unwrap()
        );
    }
}
