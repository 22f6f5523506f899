use crate::error::SearchResultError;
use crate::float_trait::Float;
use crate::scan::ChunkScan;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Single-transit search output of the whole light curve
///
/// Four equal-length arrays in chunk order, one entry per uniform grid slot. Gap slots keep their
/// nominal time and have NaN depth, variance and $\Delta\chi^2$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    bound = "T: Float",
    try_from = "SearchResultRecord<T>",
    into = "SearchResultRecord<T>"
)]
pub struct SearchResult<T> {
    time: Array1<T>,
    depth: Array1<T>,
    variance: Array1<T>,
    delta_chisq: Array1<T>,
}

impl<T> SearchResult<T>
where
    T: Float,
{
    pub fn from_arrays(
        time: impl Into<Array1<T>>,
        depth: impl Into<Array1<T>>,
        variance: impl Into<Array1<T>>,
        delta_chisq: impl Into<Array1<T>>,
    ) -> Result<Self, SearchResultError> {
        let time = time.into();
        let depth = depth.into();
        let variance = variance.into();
        let delta_chisq = delta_chisq.into();
        for (name, a) in [
            ("depth", &depth),
            ("variance", &variance),
            ("delta_chisq", &delta_chisq),
        ] {
            if a.len() != time.len() {
                return Err(SearchResultError::LengthMismatch {
                    name,
                    actual: a.len(),
                    expected: time.len(),
                });
            }
        }
        Ok(Self {
            time,
            depth,
            variance,
            delta_chisq,
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

    pub fn time(&self) -> ArrayView1<'_, T> {
        self.time.view()
    }

    /// Maximum-likelihood transit depth
    pub fn depth(&self) -> ArrayView1<'_, T> {
        self.depth.view()
    }

    /// Variance of the depth estimate
    pub fn variance(&self) -> ArrayView1<'_, T> {
        self.variance.view()
    }

    /// Improvement of $\chi^2$ of the transit model over the no-transit model
    pub fn delta_chisq(&self) -> ArrayView1<'_, T> {
        self.delta_chisq.view()
    }

    /// $\Delta\chi^2$ conditioned on a known transit depth
    ///
    /// $$
    /// \Delta\chi^2_\mathrm{cond} = \Delta\chi^2 - \frac{(d - d_0)^2}{\sigma_d^2}
    /// $$
    pub fn conditional_delta_chisq(&self, depth: T) -> Array1<T> {
        ndarray::Zip::from(&self.delta_chisq)
            .and(&self.depth)
            .and(&self.variance)
            .map_collect(|&dchisq, &d, &var| dchisq - (d - depth).powi(2) / var)
    }

    /// Median spacing of the time axis, `None` for less than two entries
    pub fn median_dt(&self) -> Option<T> {
        crate::array_stats::median_step(&self.time.to_vec())
    }
}

impl<T> FromIterator<ChunkScan<T>> for SearchResult<T>
where
    T: Float,
{
    fn from_iter<I: IntoIterator<Item = ChunkScan<T>>>(iter: I) -> Self {
        let mut aggregator = Aggregator::default();
        for scan in iter {
            aggregator.push(scan);
        }
        aggregator.finish()
    }
}

/// Concatenates per-chunk scans in the order they are pushed
#[derive(Clone, Debug)]
pub struct Aggregator<T> {
    time: Vec<T>,
    depth: Vec<T>,
    variance: Vec<T>,
    delta_chisq: Vec<T>,
}

impl<T> Default for Aggregator<T> {
    fn default() -> Self {
        Self {
            time: vec![],
            depth: vec![],
            variance: vec![],
            delta_chisq: vec![],
        }
    }
}

impl<T> Aggregator<T>
where
    T: Float,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, gap slots get NaN statistics
    pub fn push(&mut self, scan: ChunkScan<T>) {
        let ChunkScan {
            time,
            mut depth,
            mut variance,
            mut delta_chisq,
            gaps,
            ..
        } = scan;
        for &i in gaps.iter() {
            depth[i] = T::nan();
            variance[i] = T::nan();
            delta_chisq[i] = T::nan();
        }
        self.time.extend(time);
        self.depth.extend(depth);
        self.variance.extend(variance);
        self.delta_chisq.extend(delta_chisq);
    }

    pub fn finish(self) -> SearchResult<T> {
        SearchResult {
            time: self.time.into(),
            depth: self.depth.into(),
            variance: self.variance.into(),
            delta_chisq: self.delta_chisq.into(),
        }
    }
}

/// Serialized form of [SearchResult], NaN is stored as `null`
/// Serialized form: `NaN` is `null`, infinities are `"inf"` and `"-inf"` strings
#[derive(Serialize, Deserialize)]
#[serde(bound = "T: Float")]
struct SearchResultRecord<T> {
    time: Vec<Option<StoredValue<T>>>,
    depth: Vec<Option<StoredValue<T>>>,
    variance: Vec<Option<StoredValue<T>>>,
    delta_chisq: Vec<Option<StoredValue<T>>>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged, bound = "T: Float")]
enum StoredValue<T> {
    Number(T),
    Infinity(Infinity),
}

#[derive(Serialize, Deserialize)]
enum Infinity {
    #[serde(rename = "inf")]
    Positive,
    #[serde(rename = "-inf")]
    Negative,
}

fn to_record<T: Float>(a: Array1<T>) -> Vec<Option<StoredValue<T>>> {
    a.into_iter()
        .map(|x| {
            if x.is_nan() {
                None
            } else if x == T::infinity() {
                Some(StoredValue::Infinity(Infinity::Positive))
            } else if x == T::neg_infinity() {
                Some(StoredValue::Infinity(Infinity::Negative))
            } else {
                Some(StoredValue::Number(x))
            }
        })
        .collect()
}

fn from_record<T: Float>(v: Vec<Option<StoredValue<T>>>) -> Array1<T> {
    v.into_iter()
        .map(|x| match x {
            None => T::nan(),
            Some(StoredValue::Number(x)) => x,
            Some(StoredValue::Infinity(Infinity::Positive)) => T::infinity(),
            Some(StoredValue::Infinity(Infinity::Negative)) => T::neg_infinity(),
        })
        .collect()
}

impl<T> From<SearchResult<T>> for SearchResultRecord<T>
where
    T: Float,
{
    fn from(result: SearchResult<T>) -> Self {
        Self {
            time: to_record(result.time),
            depth: to_record(result.depth),
            variance: to_record(result.variance),
            delta_chisq: to_record(result.delta_chisq),
        }
    }
}

impl<T> TryFrom<SearchResultRecord<T>> for SearchResult<T>
where
    T: Float,
{
    type Error = SearchResultError;

    fn try_from(record: SearchResultRecord<T>) -> Result<Self, Self::Error> {
        Self::from_arrays(
            from_record(record.time),
            from_record(record.depth),
            from_record(record.variance),
            from_record(record.delta_chisq),
        )
    }
}
