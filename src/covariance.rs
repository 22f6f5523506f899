//! Gaussian-process noise models producing chunk covariance matrices

use crate::float_trait::Float;

use enum_dispatch::enum_dispatch;
use ndarray::{Array2, ArrayView1};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Covariance matrix provider
///
/// Implementations must return a symmetric positive-definite `N x N` matrix for `N` strictly
/// increasing times with positive uncertainties. The matrix includes the white measurement noise
/// given by `flux_err`.
#[enum_dispatch]
pub trait CovarianceProvider<T>: Debug + Clone + Send + Sync
where
    T: Float,
{
    fn covariance(&self, t: ArrayView1<T>, flux_err: ArrayView1<T>) -> Array2<T>;
}

/// Noise model of a light curve
#[enum_dispatch(CovarianceProvider<T>)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
#[non_exhaustive]
pub enum NoiseModel<T: Float> {
    White(WhiteNoise<T>),
    Matern32(Matern32Kernel<T>),
    SquaredExponential(SquaredExponentialKernel<T>),
}

impl<T> NoiseModel<T>
where
    T: Float,
{
    /// Measurement errors only
    pub fn white() -> Self {
        Self::White(WhiteNoise::new(T::zero()))
    }

    pub fn matern32(amplitude: T, tau: T) -> Self {
        Self::Matern32(Matern32Kernel::new(amplitude, tau))
    }

    pub fn squared_exponential(amplitude: T, tau: T) -> Self {
        Self::SquaredExponential(SquaredExponentialKernel::new(amplitude, tau))
    }
}

impl<T> Default for NoiseModel<T>
where
    T: Float,
{
    fn default() -> Self {
        Self::white()
    }
}

fn stationary_covariance<T, F>(t: ArrayView1<T>, flux_err: ArrayView1<T>, kernel: F) -> Array2<T>
where
    T: Float,
    F: Fn(T) -> T,
{
    assert_eq!(
        t.len(),
        flux_err.len(),
        "t and flux_err should have the same size"
    );
    let n = t.len();
    let mut k = Array2::from_shape_fn((n, n), |(i, j)| kernel((t[i] - t[j]).abs()));
    for (kii, &err) in k.diag_mut().iter_mut().zip(flux_err.iter()) {
        *kii += err.powi(2);
    }
    k
}

/// Uncorrelated noise: $K_{ij} = \delta_{ij} (\sigma_i^2 + s^2)$
///
/// $s$ is an additional jitter term added in quadrature to the measurement errors $\sigma_i$.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct WhiteNoise<T> {
    pub jitter: T,
}

impl<T> WhiteNoise<T>
where
    T: Float,
{
    pub fn new(jitter: T) -> Self {
        Self { jitter }
    }
}

impl<T> CovarianceProvider<T> for WhiteNoise<T>
where
    T: Float,
{
    fn covariance(&self, t: ArrayView1<T>, flux_err: ArrayView1<T>) -> Array2<T> {
        let jitter2 = self.jitter.powi(2);
        stationary_covariance(t, flux_err, |r| {
            if r.is_zero() { jitter2 } else { T::zero() }
        })
    }
}

/// Matérn-3/2 kernel on top of the measurement errors
///
/// $$
/// K_{ij} = \delta_{ij}\sigma_i^2 + a^2 \left(1 + \frac{\sqrt{3} r}{\tau}\right)
///     \exp\left(-\frac{\sqrt{3} r}{\tau}\right),\quad r = |t_i - t_j|.
/// $$
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct Matern32Kernel<T> {
    pub amplitude: T,
    pub tau: T,
}

impl<T> Matern32Kernel<T>
where
    T: Float,
{
    pub fn new(amplitude: T, tau: T) -> Self {
        assert!(tau > T::zero(), "tau should be positive");
        Self { amplitude, tau }
    }
}

impl<T> CovarianceProvider<T> for Matern32Kernel<T>
where
    T: Float,
{
    fn covariance(&self, t: ArrayView1<T>, flux_err: ArrayView1<T>) -> Array2<T> {
        let a2 = self.amplitude.powi(2);
        let scale = T::three().sqrt() / self.tau;
        stationary_covariance(t, flux_err, |r| {
            let x = scale * r;
            a2 * (T::one() + x) * (-x).exp()
        })
    }
}

/// Squared exponential kernel on top of the measurement errors
///
/// $$
/// K_{ij} = \delta_{ij}\sigma_i^2 + a^2 \exp\left(-\frac{r^2}{2\tau^2}\right),
///     \quad r = |t_i - t_j|.
/// $$
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct SquaredExponentialKernel<T> {
    pub amplitude: T,
    pub tau: T,
}

impl<T> SquaredExponentialKernel<T>
where
    T: Float,
{
    pub fn new(amplitude: T, tau: T) -> Self {
        assert!(tau > T::zero(), "tau should be positive");
        Self { amplitude, tau }
    }
}

impl<T> CovarianceProvider<T> for SquaredExponentialKernel<T>
where
    T: Float,
{
    fn covariance(&self, t: ArrayView1<T>, flux_err: ArrayView1<T>) -> Array2<T> {
        let a2 = self.amplitude.powi(2);
        let inv_two_tau2 = (T::two() * self.tau.powi(2)).recip();
        stationary_covariance(t, flux_err, |r| a2 * (-r.powi(2) * inv_two_tau2).exp())
    }
}
