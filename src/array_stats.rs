//! Small order statistics used by the chunk preparer, the scanner and the folder

use crate::float_trait::Float;

use itertools::Itertools;
use ndarray::ArrayView2;

/// Median of the finite values, `None` if there are none
pub fn nan_median<T>(x: &[T]) -> Option<T>
where
    T: Float,
{
    let mut v: Vec<T> = x.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    let i = (v.len() - 1) / 2;
    if v.len() % 2 == 0 {
        Some(T::half() * (v[i] + v[i + 1]))
    } else {
        Some(v[i])
    }
}

/// Differences of the consequent elements
pub fn diff<T>(x: &[T]) -> Vec<T>
where
    T: Float,
{
    x.iter().tuple_windows().map(|(&a, &b)| b - a).collect()
}

/// Median interval between consequent values, `None` for less than two values
pub fn median_step<T>(x: &[T]) -> Option<T>
where
    T: Float,
{
    nan_median(&diff(x))
}

/// Scaled median absolute deviation around `median`
pub fn median_abs_deviation<T>(x: &[T], median: T) -> Option<T>
where
    T: Float,
{
    let deviations: Vec<_> = x.iter().map(|&x| (x - median).abs()).collect();
    nan_median(&deviations).map(|mad| T::mad_scale() * mad)
}

/// Position of the largest non-NaN element of a 2-D array
pub fn argmax_skip_nan<T>(a: ArrayView2<T>) -> Option<(usize, usize)>
where
    T: Float,
{
    a.indexed_iter()
        .filter(|(_, x)| !x.is_nan())
        .fold(None, |acc: Option<((usize, usize), T)>, (idx, &x)| match acc {
            Some((_, max)) if max >= x => acc,
            _ => Some((idx, x)),
        })
        .map(|(idx, _)| idx)
}
