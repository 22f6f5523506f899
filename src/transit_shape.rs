//! Transit dip profiles rolled across the light curve by the matched filter
//!
//! All profiles are zero out of transit and reach $-1$ at full unit depth, so that a
//! maximum-likelihood depth $d > 0$ corresponds to a dimming of the star by $d$ times the
//! baseline flux.

use crate::error::TabulatedShapeError;
use crate::float_trait::Float;

use enum_dispatch::enum_dispatch;
use ndarray::{Array1, ArrayView1};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Transit shape provider
///
/// Evaluates the dip profile centered at `t0` on the time grid `t`. Implementations must be
/// deterministic and free of side effects, they are called concurrently for different centers.
/// Any `Fn(ArrayView1<T>, T) -> Array1<T>` function or closure is a provider too.
#[enum_dispatch]
pub trait TransitShape<T>: Send + Sync
where
    T: Float,
{
    fn shape(&self, t: ArrayView1<T>, t0: T) -> Array1<T>;
}

impl<T, F> TransitShape<T> for F
where
    T: Float,
    F: Fn(ArrayView1<T>, T) -> Array1<T> + Send + Sync,
{
    fn shape(&self, t: ArrayView1<T>, t0: T) -> Array1<T> {
        self(t, t0)
    }
}

/// Built-in transit profiles
#[enum_dispatch(TransitShape<T>)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
#[non_exhaustive]
pub enum TransitModel<T: Float> {
    Box(BoxShape<T>),
    Trapezoid(TrapezoidShape<T>),
    Tabulated(TabulatedShape<T>),
}

/// Rectangular dip of the given full duration
///
/// A duration shorter than the cadence makes a single-cadence impulse.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct BoxShape<T> {
    pub duration: T,
}

impl<T> BoxShape<T>
where
    T: Float,
{
    pub fn new(duration: T) -> Self {
        assert!(
            duration.is_finite() && duration > T::zero(),
            "duration should be positive finite"
        );
        Self { duration }
    }
}

impl<T> TransitShape<T> for BoxShape<T>
where
    T: Float,
{
    fn shape(&self, t: ArrayView1<T>, t0: T) -> Array1<T> {
        let half_duration = T::half() * self.duration;
        t.mapv(|t| {
            if (t - t0).abs() < half_duration {
                -T::one()
            } else {
                T::zero()
            }
        })
    }
}

/// Symmetric trapezoid: linear ingress and egress of `ingress` length, flat bottom between them
///
/// `duration` is the full length from the first to the last contact.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct TrapezoidShape<T> {
    pub duration: T,
    pub ingress: T,
}

impl<T> TrapezoidShape<T>
where
    T: Float,
{
    pub fn new(duration: T, ingress: T) -> Self {
        assert!(
            duration.is_finite() && duration > T::zero(),
            "duration should be positive finite"
        );
        assert!(
            ingress > T::zero() && ingress <= T::half() * duration,
            "ingress should be positive and not longer than a half of the duration"
        );
        Self { duration, ingress }
    }
}

impl<T> TransitShape<T> for TrapezoidShape<T>
where
    T: Float,
{
    fn shape(&self, t: ArrayView1<T>, t0: T) -> Array1<T> {
        let half_duration = T::half() * self.duration;
        t.mapv(|t| {
            let x = (t - t0).abs();
            if x >= half_duration {
                T::zero()
            } else if x <= half_duration - self.ingress {
                -T::one()
            } else {
                -(half_duration - x) / self.ingress
            }
        })
    }
}

/// Tabulated profile linearly interpolated in time offset from the center
///
/// The profile is zero outside of the table.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct TabulatedShape<T> {
    offsets: Vec<T>,
    values: Vec<T>,
}

impl<T> TabulatedShape<T>
where
    T: Float,
{
    /// Construct from time offsets relative to the transit center and profile values
    pub fn new(offsets: Vec<T>, values: Vec<T>) -> Result<Self, TabulatedShapeError> {
        if offsets.len() != values.len() {
            return Err(TabulatedShapeError::LengthMismatch {
                offsets: offsets.len(),
                values: values.len(),
            });
        }
        if offsets.len() < 2 {
            return Err(TabulatedShapeError::TooShort(offsets.len()));
        }
        if !offsets.windows(2).all(|w| w[0] < w[1]) {
            return Err(TabulatedShapeError::Unsorted);
        }
        Ok(Self { offsets, values })
    }

    /// Construct from a relative flux model which is unity out of transit
    ///
    /// The model is shifted to zero baseline and rescaled so that its deepest point is $-1$.
    pub fn from_unit_baseline(
        offsets: Vec<T>,
        relative_flux: Vec<T>,
    ) -> Result<Self, TabulatedShapeError> {
        let min = relative_flux
            .iter()
            .copied()
            .fold(T::infinity(), |acc, x| acc.min(x));
        let depth = T::one() - min;
        if !(depth > T::zero()) || !depth.is_finite() {
            return Err(TabulatedShapeError::NoDip);
        }
        let values = relative_flux
            .into_iter()
            .map(|f| (f - T::one()) / depth)
            .collect();
        Self::new(offsets, values)
    }

    fn interpolate(&self, x: T) -> T {
        let n = self.offsets.len();
        if x < self.offsets[0] || x > self.offsets[n - 1] {
            return T::zero();
        }
        // first index with offset > x, clamped to keep a valid segment
        let i = self.offsets.partition_point(|&o| o <= x).clamp(1, n - 1);
        let (x0, x1) = (self.offsets[i - 1], self.offsets[i]);
        let (y0, y1) = (self.values[i - 1], self.values[i]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

impl<T> TransitShape<T> for TabulatedShape<T>
where
    T: Float,
{
    fn shape(&self, t: ArrayView1<T>, t0: T) -> Array1<T> {
        t.mapv(|t| self.interpolate(t - t0))
    }
}
