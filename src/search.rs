use crate::aggregate::SearchResult;
use crate::cache::{CacheKey, SearchCache};
use crate::chunk::ChunkData;
use crate::covariance::CovarianceProvider;
use crate::error::{CacheError, SearchError};
use crate::float_trait::Float;
use crate::light_curve::LightCurve;
use crate::outliers::OutlierFilter;
use crate::scan::{Baseline, ChunkScan};
use crate::transit_shape::TransitShape;

use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters of [TransitSearch]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SearchConfig {
    /// Search the raw flux marginalizing over the systematics instead of the de-trended flux
    pub joint_fit: bool,
    /// Ignore a cached result and overwrite it
    pub recompute: bool,
    /// Outlier masking applied before chunking, `None` keeps the masks of the light curve
    pub outlier_filter: Option<OutlierFilter>,
    pub baseline: Baseline,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            joint_fit: false,
            recompute: false,
            outlier_filter: Some(OutlierFilter::default()),
            baseline: Baseline::default(),
        }
    }
}

impl SearchConfig {
    pub fn with_joint_fit(mut self, joint_fit: bool) -> Self {
        self.joint_fit = joint_fit;
        self
    }

    pub fn with_recompute(mut self, recompute: bool) -> Self {
        self.recompute = recompute;
        self
    }

    pub fn with_outlier_filter(mut self, outlier_filter: Option<OutlierFilter>) -> Self {
        self.outlier_filter = outlier_filter;
        self
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }
}

/// Search result together with the way it was obtained
#[derive(Debug)]
pub struct SearchOutcome<T> {
    pub result: SearchResult<T>,
    /// The result was read from the cache
    pub cached: bool,
    /// Failure to store the freshly computed result, the result itself is valid
    pub cache_error: Option<CacheError>,
}

/// Single-transit search of a light curve
///
/// Every chunk of the light curve is prepared, scanned with the matched filter and the chunk
/// results are concatenated in chunk order. Chunks are searched in parallel.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TransitSearch {
    config: SearchConfig,
}

impl TransitSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search without caching
    pub fn run<T, C, S>(
        &self,
        lc: &LightCurve<T, C>,
        shape: &S,
    ) -> Result<SearchResult<T>, SearchError>
    where
        T: Float,
        C: CovarianceProvider<T>,
        S: TransitShape<T> + ?Sized,
    {
        let filtered;
        let lc = match &self.config.outlier_filter {
            Some(filter) => {
                filtered = filter.apply(lc);
                &filtered
            }
            None => lc,
        };

        let scans = (0..lc.n_chunks())
            .into_par_iter()
            .map(|chunk| {
                log::info!("Searching chunk {}/{}", chunk + 1, lc.n_chunks());
                let data = ChunkData::prepare(lc, chunk, self.config.joint_fit)?;
                Ok(data.scan(shape, self.config.baseline))
            })
            .collect::<Result<Vec<ChunkScan<T>>, SearchError>>()?;

        Ok(scans.into_iter().collect())
    }

    /// Search the light curve of `target`, reusing and storing the result in `cache`
    ///
    /// An unreadable cache entry is treated as absent.
    pub fn search<T, C, S, SC>(
        &self,
        lc: &LightCurve<T, C>,
        target: &str,
        shape: &S,
        cache: &SC,
    ) -> Result<SearchOutcome<T>, SearchError>
    where
        T: Float,
        C: CovarianceProvider<T>,
        S: TransitShape<T> + ?Sized,
        SC: SearchCache<T> + ?Sized,
    {
        let key = CacheKey::new(target, self.config.joint_fit);
        if !self.config.recompute {
            match cache.get(&key) {
                Ok(Some(result)) => {
                    log::info!("Using cached search result for target {}", target);
                    return Ok(SearchOutcome {
                        result,
                        cached: true,
                        cache_error: None,
                    });
                }
                Ok(None) => {}
                Err(err) => log::warn!("Cannot read cached result for target {}: {}", target, err),
            }
        }

        let result = self.run(lc, shape)?;
        let cache_error = cache.put(&key, &result).err();
        if let Some(err) = &cache_error {
            log::warn!("Cannot cache search result for target {}: {}", target, err);
        }
        Ok(SearchOutcome {
            result,
            cached: false,
            cache_error,
        })
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    use crate::cache::{JsonFileCache, MemoryCache, NoCache};
    use crate::covariance::NoiseModel;
    use crate::light_curve::MaskKind;
    use crate::transit_shape::BoxShape;

    use ndarray::{Array1, Array2, ArrayView1};
    use std::fs;

    fn impulse(t: ArrayView1<f64>, t0: f64) -> Array1<f64> {
        t.mapv(|t| if t == t0 { 1.0 } else { 0.0 })
    }

    fn unity_search() -> TransitSearch {
        TransitSearch::new(
            SearchConfig::default()
                .with_outlier_filter(None)
                .with_baseline(Baseline::Unity),
        )
    }

    fn spike_light_curve() -> LightCurve<f64> {
        LightCurve::from_raw(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            vec![0.0, 0.0, 0.0, -1.0, 0.0, 0.0],
            vec![1.0; 6],
            vec![5],
            NoiseModel::white(),
        )
        .unwrap()
    }

    #[test]
    fn single_spike_end_to_end() {
        let result = unity_search().run(&spike_light_curve(), &impulse).unwrap();
        assert_eq!(result.len(), 6);
        assert_eq!(result.delta_chisq()[3], 1.0);
        assert_eq!(result.depth()[3], -1.0);
        assert!(result.variance().iter().all(|&v| v == 1.0));
        for i in [0, 1, 2, 4, 5] {
            assert_eq!(result.delta_chisq()[i], 0.0);
        }
    }

    /// Measurement errors inflated by a constant factor
    #[derive(Clone, Debug)]
    struct InflatedErrors(f64);

    impl CovarianceProvider<f64> for InflatedErrors {
        fn covariance(&self, _t: ArrayView1<f64>, flux_err: ArrayView1<f64>) -> Array2<f64> {
            Array2::from_diag(&flux_err.mapv(|err| (self.0 * err).powi(2)))
        }
    }

    #[test]
    fn custom_noise_model() {
        let lc = spike_light_curve().with_noise_model(InflatedErrors(2.0));
        let result = unity_search().run(&lc, &impulse).unwrap();
        assert_eq!(result.depth()[3], -1.0);
        assert_eq!(result.variance()[3], 4.0);
        assert_eq!(result.delta_chisq()[3], 0.25);
        assert_eq!(result.delta_chisq()[0], 0.0);
    }

    #[test]
    fn chunks_with_gaps() {
        let t: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let flux: Vec<f64> = (0..20).map(|i| if i == 14 { -2.0 } else { 0.0 }).collect();
        let lc = LightCurve::from_raw(t, flux, vec![1.0; 20], vec![9, 19], NoiseModel::white())
            .unwrap()
            .with_mask(MaskKind::Bad, [4, 12])
            .unwrap();
        let result = unity_search().run(&lc, &impulse).unwrap();
        // masked cadences come back as gap slots
        assert_eq!(result.len(), 20);
        assert!(result.delta_chisq()[4].is_nan());
        assert!(result.delta_chisq()[12].is_nan());
        assert_eq!(result.time()[12], 12.0);
        assert_eq!(result.delta_chisq()[14], 4.0);
        assert_eq!(result.depth()[14], -2.0);
    }

    #[test]
    fn errors_abort_the_search() {
        let lc = LightCurve::from_raw(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![1.0; 4],
            vec![1.0, 1.0, 0.0, 0.0],
            vec![1, 3],
            NoiseModel::white(),
        )
        .unwrap();
        assert!(matches!(
            unity_search().run(&lc, &impulse),
            Err(SearchError::SingularCovariance { chunk: 1 })
        ));
        let joint = TransitSearch::new(unity_search().config().clone().with_joint_fit(true));
        assert!(matches!(
            joint.run(&spike_light_curve(), &impulse),
            Err(SearchError::MissingSystematics)
        ));
    }

    #[test]
    fn cached_result_is_reused() {
        let cache = MemoryCache::<f64>::new();
        let search = unity_search();
        let lc = spike_light_curve();
        let first = search.search(&lc, "1", &impulse, &cache).unwrap();
        assert!(!first.cached);
        assert!(first.cache_error.is_none());

        // a different light curve is not searched again
        let other = LightCurve::from_raw(
            vec![0.0, 1.0],
            vec![5.0, 5.0],
            vec![1.0; 2],
            vec![1],
            NoiseModel::white(),
        )
        .unwrap();
        let second = search.search(&other, "1", &impulse, &cache).unwrap();
        assert!(second.cached);
        assert_eq!(second.result, first.result);

        let recomputed = TransitSearch::new(search.config().clone().with_recompute(true))
            .search(&other, "1", &impulse, &cache)
            .unwrap();
        assert!(!recomputed.cached);
        assert_eq!(recomputed.result.len(), 2);

        let joint = TransitSearch::new(search.config().clone().with_joint_fit(true));
        assert!(matches!(
            joint.search(&lc, "1", &impulse, &cache),
            Err(SearchError::MissingSystematics)
        ));
    }

    #[test]
    fn unreadable_cache_falls_back_to_search() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path());
        fs::write(cache.path(&CacheKey::new("5", false)).unwrap(), "[]").unwrap();
        let outcome = unity_search()
            .search(&spike_light_curve(), "5", &impulse, &cache)
            .unwrap();
        assert!(!outcome.cached);
        assert!(outcome.cache_error.is_none());
        assert_eq!(outcome.result.delta_chisq()[3], 1.0);
    }

    #[test]
    fn cache_write_failure_keeps_result() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "").unwrap();
        // a regular file cannot be a cache directory
        let cache = JsonFileCache::new(&file);
        let outcome = unity_search()
            .search(&spike_light_curve(), "6", &impulse, &cache)
            .unwrap();
        assert!(outcome.cache_error.is_some());
        assert_eq!(outcome.result.depth()[3], -1.0);
    }

    #[test]
    fn default_config_filters_outliers() {
        let n = 200;
        let t: Vec<f64> = (0..n).map(|i| 0.02 * i as f64).collect();
        let mut flux: Vec<f64> = (0..n)
            .map(|i| 100.0 + 0.1 * (0.7 * i as f64).sin())
            .collect();
        flux[50] += 20.0;
        let lc = LightCurve::from_raw(t, flux, vec![0.1; n], vec![99, 199], NoiseModel::white())
            .unwrap();
        let result = TransitSearch::default()
            .run(&lc, &BoxShape::new(0.01))
            .unwrap();
        assert_eq!(result.len(), n);
        assert!(result.delta_chisq()[50].is_nan());
        assert_eq!(
            TransitSearch::default()
                .search(&lc, "7", &BoxShape::new(0.01), &NoCache)
                .unwrap()
                .result
                .len(),
            n
        );
    }
}
