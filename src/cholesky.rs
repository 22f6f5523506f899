use crate::float_trait::Float;

use conv::prelude::*;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, ArrayView1};

/// Cholesky factorization $K = L L^T$ of a symmetric positive-definite matrix
///
/// The decomposition and the triangular solves are done by [nalgebra] in double precision for
/// both [f32] and [f64] inputs. The factor is read-only after construction, so a single instance
/// may be shared between threads solving against it.
#[derive(Clone, Debug)]
pub struct CholeskyFactor<T> {
    factor: Cholesky<f64, Dyn>,
    phantom: std::marker::PhantomData<T>,
}

impl<T> CholeskyFactor<T>
where
    T: Float,
{
    /// Factorize a square matrix, only its lower triangle is read
    ///
    /// Returns `None` if the matrix is not square or not positive-definite.
    pub fn new(a: Array2<T>) -> Option<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return None;
        }
        let matrix = DMatrix::from_fn(n, n, |i, j| to_f64(a[[i, j]]));
        if matrix.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let factor = matrix.cholesky()?;
        Some(Self {
            factor,
            phantom: std::marker::PhantomData,
        })
    }

    pub fn size(&self) -> usize {
        self.factor.l_dirty().nrows()
    }

    /// Lower triangular factor $L$
    pub fn lower(&self) -> Array2<T> {
        let l = self.factor.l();
        Array2::from_shape_fn((l.nrows(), l.ncols()), |(i, j)| from_f64(l[(i, j)]))
    }

    /// Forward substitution: $y = L^{-1} b$
    pub fn whiten(&self, b: ArrayView1<T>) -> Array1<T> {
        let mut y = self.to_dvector(b);
        // the diagonal of a successful factorization is positive
        let solved = self.factor.l_dirty().solve_lower_triangular_mut(&mut y);
        debug_assert!(solved);
        y.iter().map(|&x| from_f64(x)).collect()
    }

    /// $x = K^{-1} b$
    pub fn solve(&self, b: ArrayView1<T>) -> Array1<T> {
        let mut x = self.to_dvector(b);
        self.factor.solve_mut(&mut x);
        x.iter().map(|&x| from_f64(x)).collect()
    }

    /// $a^T K^{-1} b$
    pub fn inv_dot(&self, a: ArrayView1<T>, b: ArrayView1<T>) -> T {
        self.whiten(a).dot(&self.whiten(b))
    }

    /// $\ln\det K$
    pub fn ln_det(&self) -> T {
        let ln_det: f64 = self.factor.l_dirty().diagonal().iter().map(|x| x.ln()).sum();
        from_f64(2.0 * ln_det)
    }

    fn to_dvector(&self, b: ArrayView1<T>) -> DVector<f64> {
        assert_eq!(b.len(), self.size(), "vector size should match matrix size");
        DVector::from_iterator(b.len(), b.iter().map(|&x| to_f64(x)))
    }
}

fn to_f64<T: Float>(x: T) -> f64 {
    x.value_into().unwrap()
}

/// Values out of the range of `T` become infinities, `NaN` stays `NaN`
fn from_f64<T: Float>(x: f64) -> T {
    x.approx().unwrap_or_else(|_| {
        if x.is_nan() {
            T::nan()
        } else if x > 0.0 {
            T::infinity()
        } else {
            T::neg_infinity()
        }
    })
}

#[cfg(test)]
#[allow(clippy::unreadable_literal)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use light_curve_common::all_close;
    use ndarray::{arr1, arr2};

    fn spd() -> Array2<f64> {
        arr2(&[[4.0, 12.0, -16.0], [12.0, 37.0, -43.0], [-16.0, -43.0, 98.0]])
    }

    #[test]
    fn factor_known_matrix() {
        let chol = CholeskyFactor::new(spd()).unwrap();
        let desired = arr2(&[[2.0, 0.0, 0.0], [6.0, 1.0, 0.0], [-8.0, 5.0, 3.0]]);
        all_close(
            chol.lower().as_slice().unwrap(),
            desired.as_slice().unwrap(),
            1e-12,
        );
        assert_relative_eq!(chol.ln_det(), 36.0_f64.ln(), max_relative = 1e-12);
    }

    #[test]
    fn solve_recovers_rhs() {
        let a = spd();
        let chol = CholeskyFactor::new(a.clone()).unwrap();
        let b = arr1(&[1.0, -2.0, 0.5]);
        let x = chol.solve(b.view());
        let b_back = a.dot(&x);
        all_close(b_back.as_slice().unwrap(), b.as_slice().unwrap(), 1e-10);
    }

    #[test]
    fn inv_dot_matches_solve() {
        let chol = CholeskyFactor::new(spd()).unwrap();
        let a = arr1(&[0.3, 1.0, -1.0]);
        let b = arr1(&[1.0, -2.0, 0.5]);
        assert_relative_eq!(
            chol.inv_dot(a.view(), b.view()),
            a.dot(&chol.solve(b.view())),
            max_relative = 1e-10
        );
    }

    #[test]
    fn not_positive_definite() {
        let a = arr2(&[[1.0_f64, 2.0], [2.0, 1.0]]);
        assert!(CholeskyFactor::new(a).is_none());
        let a = arr2(&[[0.0_f64, 0.0], [0.0, 1.0]]);
        assert!(CholeskyFactor::new(a).is_none());
        let a = arr2(&[[f64::NAN]]);
        assert!(CholeskyFactor::new(a).is_none());
    }

    #[test]
    fn upper_triangle_is_ignored() {
        let mut a = spd();
        a[[0, 2]] = 100.0;
        let chol = CholeskyFactor::new(a).unwrap();
        let desired = CholeskyFactor::new(spd()).unwrap();
        assert_eq!(chol.lower(), desired.lower());
    }

    #[test]
    fn single_precision_whitening() {
        let a = spd().mapv(|x| x as f32);
        let chol = CholeskyFactor::new(a).unwrap();
        let b = arr1(&[2.0_f32, 11.0, 7.0]);
        // L = [[2, 0, 0], [6, 1, 0], [-8, 5, 3]]
        let desired = [1.0_f32, 5.0, -3.0];
        all_close(chol.whiten(b.view()).as_slice().unwrap(), &desired, 1e-5);
    }

    #[test]
    fn not_square() {
        assert!(CholeskyFactor::new(Array2::<f64>::zeros((2, 3))).is_none());
    }

    #[test]
    fn empty_matrix() {
        let chol = CholeskyFactor::new(Array2::<f64>::zeros((0, 0))).unwrap();
        assert_eq!(chol.size(), 0);
        assert_eq!(chol.solve(Array1::<f64>::zeros(0).view()).len(), 0);
    }
}
