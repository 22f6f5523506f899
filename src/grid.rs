use crate::array_stats::{diff, median_step};
use crate::error::GridError;
use crate::float_trait::Float;

use conv::prelude::*;
use conv::RoundToNearest;
use ndarray::{Array1, ArrayView1};

/// Evenly spaced time axis reconstructed from the observed times of a chunk
///
/// The grid starts at the first observed time and steps by the cadence `dt`. Every
/// observed time occupies exactly one slot (the slot takes the exact observed value), the other
/// slots are gaps holding the nominal uniform time.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformGrid<T> {
    time: Array1<T>,
    observed: Vec<bool>,
    gaps: Vec<usize>,
    dt: Option<T>,
}

impl<T> UniformGrid<T>
where
    T: Float,
{
    /// Place strictly increasing observed times onto a uniform grid
    ///
    /// The nominal cadence is the mean of the single-cadence intervals, which are the intervals
    /// within a fifth of the median interval from it. The mean is taken in double precision, so
    /// it stays accurate for single-precision times with a large offset, where every interval is
    /// rounded to the time resolution. The slot count is `round((t_last - t_first) / cadence) + 1`
    /// and must not exceed [MAX_SLOTS_PER_CADENCE] times the number of observed times. The step
    /// `dt` is then adjusted so the last slot falls onto the last observed time. An observed time
    /// matches a slot when it is closer than `dt / 5`. Zero or one observed times give a grid
    /// without gaps.
    pub fn from_observed(t: ArrayView1<T>) -> Result<Self, GridError> {
        if let Some(i) = (1..t.len()).find(|&i| !(t[i] > t[i - 1])) {
            return Err(GridError::NonMonotonic(i));
        }
        if t.len() < 2 {
            return Ok(Self {
                time: t.to_owned(),
                observed: vec![true; t.len()],
                gaps: vec![],
                dt: None,
            });
        }
        let observed_t = t.to_vec();
        let cadence = cadence_step(&observed_t).ok_or(GridError::InvalidSpacing)?;

        let t0 = observed_t[0];
        let duration = observed_t[observed_t.len() - 1] - t0;
        let span: usize = (duration / cadence)
            .approx_by::<RoundToNearest>()
            .map_err(|_| GridError::InvalidSpacing)?;
        let size = span + 1;
        if size > MAX_SLOTS_PER_CADENCE.saturating_mul(observed_t.len()) {
            return Err(GridError::TooManySlots {
                slots: size,
                observed: observed_t.len(),
            });
        }
        let dt = duration / span.approx().unwrap();
        let tol = dt / T::value_from(5.0_f32).unwrap();

        let mut time = Vec::with_capacity(size);
        let mut observed = Vec::with_capacity(size);
        let mut gaps = vec![];
        let mut j = 0;
        for i in 0..size {
            let offset: T = i.approx().unwrap();
            let t_uniform = t0 + dt * offset;
            match observed_t.get(j) {
                Some(&t_obs) if (t_obs - t_uniform).abs() < tol => {
                    time.push(t_obs);
                    observed.push(true);
                    j += 1;
                }
                Some(&t_obs) if t_obs < t_uniform => {
                    return Err(GridError::OffGrid { index: j });
                }
                _ => {
                    time.push(t_uniform);
                    observed.push(false);
                    gaps.push(i);
                }
            }
        }
        if j != observed_t.len() {
            return Err(GridError::Unconsumed {
                consumed: j,
                total: observed_t.len(),
            });
        }
        Ok(Self {
            time: time.into(),
            observed,
            gaps,
            dt: Some(dt),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Slot times, observed values at the observed slots and nominal values at the gaps
    pub fn time(&self) -> ArrayView1<'_, T> {
        self.time.view()
    }

    /// Sorted gap slot indices
    pub fn gaps(&self) -> &[usize] {
        &self.gaps
    }

    pub fn is_observed(&self, i: usize) -> bool {
        self.observed[i]
    }

    /// Grid step, `None` for less than two observed times
    pub fn dt(&self) -> Option<T> {
        self.dt
    }

    /// Drop the gap slots from a grid-sized array
    pub fn observed_values(&self, a: ArrayView1<T>) -> Array1<T> {
        assert_eq!(a.len(), self.len(), "array size should match grid size");
        a.iter()
            .zip(self.observed.iter())
            .filter_map(|(&x, &obs)| obs.then_some(x))
            .collect()
    }
}

/// Upper limit of the grid slots per observed time
pub const MAX_SLOTS_PER_CADENCE: usize = 1000;

/// Mean of the intervals closer than a fifth of the median interval to it
fn cadence_step<T>(t: &[T]) -> Option<T>
where
    T: Float,
{
    let median = median_step(t)?;
    if !(median > T::zero()) || !median.is_finite() {
        return None;
    }
    let median: f64 = median.value_into().unwrap();
    let (sum, count) = diff(t)
        .into_iter()
        .map(|step| -> f64 { step.value_into().unwrap() })
        .filter(|step| (step - median).abs() < 0.2 * median)
        .fold((0.0, 0_usize), |(sum, count), step| (sum + step, count + 1));
    // the median of an even number of intervals may be far from both middle ones
    let cadence = if count == 0 { median } else { sum / count as f64 };
    cadence.approx().ok()
}
