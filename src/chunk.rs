use crate::cholesky::CholeskyFactor;
use crate::covariance::CovarianceProvider;
use crate::error::SearchError;
use crate::float_trait::Float;
use crate::grid::UniformGrid;
use crate::light_curve::LightCurve;

use ndarray::Array1;

/// Everything the matched filter needs to scan one chunk
///
/// The factorization is private to the chunk and read-only while it is scanned.
#[derive(Clone, Debug)]
pub struct ChunkData<T> {
    pub index: usize,
    pub grid: UniformGrid<T>,
    pub flux: Array1<T>,
    pub factor: CholeskyFactor<T>,
}

impl<T> ChunkData<T>
where
    T: Float,
{
    /// Select the unmasked cadences of a chunk, build and factorize their covariance and place
    /// them onto a uniform time grid
    ///
    /// In the joint-fit mode the systematics covariance $\sum_n \lambda_n X_n X_n^T$ is added to
    /// the noise covariance and the raw flux is searched, otherwise the de-trended flux is
    /// searched under the noise covariance only.
    pub fn prepare<C>(
        lc: &LightCurve<T, C>,
        chunk: usize,
        joint_fit: bool,
    ) -> Result<Self, SearchError>
    where
        C: CovarianceProvider<T>,
    {
        let cadences = lc
            .masked_chunk(chunk)
            .ok_or(SearchError::ChunkOutOfRange {
                chunk,
                chunks: lc.n_chunks(),
            })?;

        let t = lc.time().select(ndarray::Axis(0), &cadences);
        let flux_err = lc.flux_err().select(ndarray::Axis(0), &cadences);
        let mut k = lc.noise_model().covariance(t.view(), flux_err.view());

        let flux = if joint_fit {
            let systematics = lc.systematics().ok_or(SearchError::MissingSystematics)?;
            k += &systematics.covariance(chunk, &cadences);
            lc.flux_raw().select(ndarray::Axis(0), &cadences)
        } else {
            lc.flux().select(ndarray::Axis(0), &cadences)
        };

        let factor = CholeskyFactor::new(k).ok_or(SearchError::SingularCovariance { chunk })?;

        let grid = UniformGrid::from_observed(t.view())
            .map_err(|source| SearchError::MalformedGrid { chunk, source })?;
        log::debug!(
            "Chunk {}: {} cadences on {} grid slots, {} gaps",
            chunk,
            cadences.len(),
            grid.len(),
            grid.gaps().len(),
        );

        Ok(Self {
            index: chunk,
            grid,
            flux,
            factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::covariance::NoiseModel;
    use crate::error::GridError;
    use crate::light_curve::{MaskKind, Systematics};

    use approx::assert_relative_eq;
    use ndarray::{Array2, arr1};

    fn light_curve() -> LightCurve<f64> {
        let t: Vec<_> = (0..12).map(|i| i as f64).collect();
        let flux: Vec<_> = (0..12).map(|i| 100.0 + i as f64).collect();
        let flux_raw: Vec<_> = (0..12).map(|i| 200.0 + i as f64).collect();
        LightCurve::new(
            t,
            flux,
            flux_raw,
            vec![1.0; 12],
            vec![5, 11],
            NoiseModel::white(),
        )
        .unwrap()
    }

    #[test]
    fn detrended_chunk() {
        let lc = light_curve().with_mask(MaskKind::Bad, [2, 7]).unwrap();
        let chunk = ChunkData::prepare(&lc, 1, false).unwrap();
        assert_eq!(chunk.index, 1);
        assert_eq!(chunk.flux, arr1(&[106.0, 108.0, 109.0, 110.0, 111.0]));
        assert_eq!(chunk.grid.len(), 6);
        assert_eq!(chunk.grid.gaps(), &[1]);
        assert_eq!(chunk.factor.size(), 5);
        assert_eq!(chunk.factor.lower(), Array2::<f64>::eye(5));
    }

    #[test]
    fn joint_fit_uses_raw_flux_and_systematics() {
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let lc = light_curve()
            .with_systematics(Systematics::new(vec![x], vec![vec![0.0], vec![3.0]]))
            .unwrap();

        let chunk = ChunkData::prepare(&lc, 0, true).unwrap();
        assert_eq!(chunk.flux[0], 200.0);
        // zero weight leaves the white noise covariance
        assert_eq!(chunk.factor.lower(), Array2::<f64>::eye(6));

        let chunk = ChunkData::prepare(&lc, 1, true).unwrap();
        let k = chunk.factor.lower().dot(&chunk.factor.lower().t());
        // 1 + 3 * 6 * 6
        assert_relative_eq!(k[[0, 0]], 109.0, max_relative = 1e-12);
        // 3 * 6 * 7
        assert_relative_eq!(k[[0, 1]], 126.0, max_relative = 1e-12);
    }

    #[test]
    fn joint_fit_without_systematics() {
        assert!(matches!(
            ChunkData::prepare(&light_curve(), 0, true),
            Err(SearchError::MissingSystematics)
        ));
    }

    #[test]
    fn chunk_out_of_range() {
        assert!(matches!(
            ChunkData::prepare(&light_curve(), 2, false),
            Err(SearchError::ChunkOutOfRange {
                chunk: 2,
                chunks: 2
            })
        ));
    }

    #[test]
    fn singular_covariance() {
        let lc = LightCurve::from_raw(
            vec![0.0, 1.0, 2.0],
            vec![1.0, 1.0, 1.0],
            vec![0.0, 0.0, 0.0],
            vec![2],
            NoiseModel::white(),
        )
        .unwrap();
        assert!(matches!(
            ChunkData::prepare(&lc, 0, false),
            Err(SearchError::SingularCovariance { chunk: 0 })
        ));
    }

    #[test]
    fn malformed_grid() {
        let lc = LightCurve::from_raw(
            vec![0.0, 1.0, 2.0, 2.5, 3.0, 4.0],
            vec![1.0; 6],
            vec![1.0; 6],
            vec![5],
            NoiseModel::white(),
        )
        .unwrap();
        assert!(matches!(
            ChunkData::prepare(&lc, 0, false),
            Err(SearchError::MalformedGrid {
                chunk: 0,
                source: GridError::OffGrid { index: 3 }
            })
        ));
    }

    #[test]
    fn fully_masked_chunk_is_empty() {
        let lc = light_curve().with_mask(MaskKind::Outlier, 0..=5).unwrap();
        let chunk = ChunkData::prepare(&lc, 0, false).unwrap();
        assert!(chunk.grid.is_empty());
        assert!(chunk.flux.is_empty());
    }
}
