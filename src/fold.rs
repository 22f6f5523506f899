//! Folding of the single-transit statistic over trial periods and phases

use crate::aggregate::SearchResult;
use crate::array_stats::argmax_skip_nan;
use crate::error::FoldError;
use crate::float_trait::Float;

use conv::prelude::*;
use conv::RoundToNearest;
use enum_dispatch::enum_dispatch;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Map a fold time onto an index of the search result time axis
///
/// `dt` is the median spacing of `time`. `None` means the time is outside of the series.
#[enum_dispatch]
trait TimeLookupTrait: Send + Sync + Clone + Debug {
    fn index<T: Float>(&self, time: &[T], dt: T, t: T) -> Option<usize>;
}

/// Fold time to index mapping
#[enum_dispatch(TimeLookupTrait)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimeLookup {
    Uniform(NearestUniformIndex),
    Observed(NearestObservedIndex),
}

impl TimeLookup {
    pub fn uniform() -> Self {
        Self::Uniform(NearestUniformIndex)
    }

    pub fn observed() -> Self {
        Self::Observed(NearestObservedIndex)
    }
}

impl Default for TimeLookup {
    fn default() -> Self {
        Self::uniform()
    }
}

/// $\mathrm{round}((t - t_0) / \Delta t)$, assumes the whole time axis is uniform
///
/// Fast, but indices drift away from the right cadences after the gaps between chunks.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename = "Uniform")]
pub struct NearestUniformIndex;

impl TimeLookupTrait for NearestUniformIndex {
    fn index<T: Float>(&self, time: &[T], dt: T, t: T) -> Option<usize> {
        let i: usize = ((t - time[0]) / dt).approx_by::<RoundToNearest>().ok()?;
        (i < time.len()).then_some(i)
    }
}

/// Entry of the time axis closest to the fold time, found by binary search
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename = "Observed")]
pub struct NearestObservedIndex;

impl TimeLookupTrait for NearestObservedIndex {
    fn index<T: Float>(&self, time: &[T], dt: T, t: T) -> Option<usize> {
        let n = time.len();
        if t < time[0] - T::half() * dt || t > time[n - 1] + T::half() * dt {
            return None;
        }
        let right = time.partition_point(|&x| x < t);
        if right == 0 {
            return Some(0);
        }
        if right == n {
            return Some(n - 1);
        }
        if t - time[right - 1] <= time[right] - t {
            Some(right - 1)
        } else {
            Some(right)
        }
    }
}

/// What to do with the undefined (NaN) samples of the folded statistic
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum UndefinedPolicy {
    /// The cell becomes undefined
    #[default]
    Propagate,
    /// The sample is ignored
    Skip,
}

/// Statistic summed over the folded transit times
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FoldStatistic<T> {
    DeltaChiSq,
    /// $\Delta\chi^2$ conditioned on the given transit depth
    Conditional { depth: T },
}

/// Periodogram-like grid of the folded statistic
///
/// `values[[i, j]]` corresponds to `periods[i]` and `phases[j]`.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldGrid<T> {
    pub periods: Array1<T>,
    pub phases: Array1<T>,
    pub values: Array2<T>,
}

/// The best cell of the [FoldGrid]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FoldCandidate<T> {
    pub period: T,
    pub phase: T,
    pub value: T,
    /// Time of the first folded transit
    pub epoch: T,
}

impl<T> FoldGrid<T>
where
    T: Float,
{
    /// Cell with the largest defined value, `None` if all cells are undefined
    pub fn best(&self, time: ArrayView1<T>) -> Option<FoldCandidate<T>> {
        let (i, j) = argmax_skip_nan(self.values.view())?;
        let period = self.periods[i];
        let phase = self.phases[j];
        let epoch = time.first().map_or(T::nan(), |&t0| t0 + phase * period);
        Some(FoldCandidate {
            period,
            phase,
            value: self.values[[i, j]],
            epoch,
        })
    }
}

/// Sums the single-transit statistic at the transit times of every trial period and phase
///
/// For the period $P$ and the phase $\phi$ the transit times are $t_0 + kP$,
/// $t_0 = t_\mathrm{first} + \phi P$, $k = 0, 1, \ldots$ while $t_0 + kP < t_\mathrm{last}$.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PhaseFolder {
    lookup: TimeLookup,
    undefined: UndefinedPolicy,
}

impl PhaseFolder {
    pub fn new(lookup: TimeLookup, undefined: UndefinedPolicy) -> Self {
        Self { lookup, undefined }
    }

    pub fn with_lookup(mut self, lookup: TimeLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_undefined(mut self, undefined: UndefinedPolicy) -> Self {
        self.undefined = undefined;
        self
    }

    pub fn lookup(&self) -> TimeLookup {
        self.lookup
    }

    pub fn undefined(&self) -> UndefinedPolicy {
        self.undefined
    }

    pub fn fold<T>(
        &self,
        result: &SearchResult<T>,
        periods: &[T],
        phases: &[T],
        statistic: FoldStatistic<T>,
    ) -> Result<FoldGrid<T>, FoldError>
    where
        T: Float,
    {
        if let Some((index, &period)) = periods
            .iter()
            .enumerate()
            .find(|(_, p)| !(p.is_finite() && **p > T::zero()))
        {
            return Err(FoldError::InvalidPeriod {
                index,
                period: period.to_f64().unwrap_or(f64::NAN),
            });
        }

        let mut values = Array2::zeros((periods.len(), phases.len()));
        let time = result.time().to_vec();
        let Some(dt) = result.median_dt() else {
            return Ok(FoldGrid {
                periods: periods.to_vec().into(),
                phases: phases.to_vec().into(),
                values,
            });
        };
        let statistic = match statistic {
            FoldStatistic::DeltaChiSq => result.delta_chisq().to_owned(),
            FoldStatistic::Conditional { depth } => result.conditional_delta_chisq(depth),
        };

        let rows: Vec<Vec<T>> = periods
            .par_iter()
            .map(|&period| {
                phases
                    .iter()
                    .map(|&phase| self.fold_cell(&time, dt, statistic.view(), period, phase))
                    .collect()
            })
            .collect();
        for (mut row, cells) in values.rows_mut().into_iter().zip(rows) {
            row.assign(&Array1::from(cells));
        }

        Ok(FoldGrid {
            periods: periods.to_vec().into(),
            phases: phases.to_vec().into(),
            values,
        })
    }

    fn fold_cell<T>(&self, time: &[T], dt: T, statistic: ArrayView1<T>, period: T, phase: T) -> T
    where
        T: Float,
    {
        let t_last = time[time.len() - 1];
        let t0 = time[0] + phase * period;
        let mut sum = T::zero();
        for k in 0_usize.. {
            let k: T = k.approx().unwrap();
            let t = t0 + k * period;
            if !(t < t_last) {
                break;
            }
            let Some(i) = self.lookup.index(time, dt, t) else {
                continue;
            };
            let x = statistic[i];
            if x.is_nan() && self.undefined == UndefinedPolicy::Skip {
                continue;
            }
            sum += x;
        }
        sum
    }
}
