use conv::ConvAsUtil;
use lazy_static::lazy_static;
use light_curve_transit_search::ndarray::{Array1, Array2};
use light_curve_transit_search::{Float, LightCurve, NoiseModel, Systematics};
use rand::prelude::*;
use rand_distr::Normal;

/// Box-shaped periodic transit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transit {
    pub period: f64,
    pub epoch: f64,
    pub duration: f64,
    pub depth: f64,
}

impl Transit {
    pub fn contains(&self, t: f64) -> bool {
        let phase = (t - self.epoch).rem_euclid(self.period);
        phase.min(self.period - phase) < 0.5 * self.duration
    }

    /// Transit centers up to `t_max`
    pub fn centers(&self, t_max: f64) -> impl Iterator<Item = f64> + '_ {
        (0..)
            .map(move |k| self.epoch + k as f64 * self.period)
            .take_while(move |&t| t <= t_max)
    }
}

#[derive(Clone, Debug)]
pub struct SyntheticParams {
    pub size: usize,
    pub dt: f64,
    pub chunks: usize,
    /// White noise level of the relative flux
    pub sigma: f64,
    /// Probability to drop a cadence, the first and the last cadences of a chunk are never dropped
    pub gap_fraction: f64,
    /// Amplitude of the linear per-chunk systematics added to the raw flux
    pub trend: f64,
    pub transit: Option<Transit>,
    pub seed: u64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            size: 800,
            dt: 0.05,
            chunks: 4,
            sigma: 2e-3,
            gap_fraction: 0.02,
            trend: 5e-3,
            transit: None,
            seed: 0,
        }
    }
}

pub struct SyntheticLightCurve<T>
where
    T: Float,
{
    pub name: String,
    pub params: SyntheticParams,
    pub light_curve: LightCurve<T>,
}

/// Relative flux light curve: zero out of transit, `-depth` in transit, plus white noise
///
/// The raw flux has an additional linear ramp in every chunk, the ramp is the only systematics
/// basis vector and its weight is the squared trend amplitude.
pub fn synthetic_light_curve<T>(
    name: impl Into<String>,
    params: SyntheticParams,
) -> SyntheticLightCurve<T>
where
    T: Float,
{
    assert!(params.chunks > 0, "at least one chunk is required");
    assert!(
        params.size >= 2 * params.chunks,
        "every chunk should have at least two cadences"
    );

    let mut rng = StdRng::seed_from_u64(params.seed);
    let noise = Normal::new(0.0, params.sigma).unwrap();
    let chunk_size = params.size / params.chunks;

    let mut time = vec![];
    let mut flux = vec![];
    let mut flux_raw = vec![];
    let mut ramp = vec![];
    let mut breakpoints = vec![];
    for i in 0..params.size {
        let chunk = (i / chunk_size).min(params.chunks - 1);
        let chunk_start = chunk * chunk_size;
        let chunk_end = if chunk == params.chunks - 1 {
            params.size - 1
        } else {
            chunk_start + chunk_size - 1
        };
        let edge = i == chunk_start || i == chunk_end;
        if !edge && rng.random::<f64>() < params.gap_fraction {
            continue;
        }

        let t = i as f64 * params.dt;
        let signal = match params.transit {
            Some(transit) if transit.contains(t) => -transit.depth,
            _ => 0.0,
        };
        let f = signal + rng.sample(noise);
        let x = 2.0 * (i - chunk_start) as f64 / (chunk_end - chunk_start) as f64 - 1.0;
        time.push(t);
        flux.push(f);
        flux_raw.push(f + params.trend * x);
        ramp.push(x);
        if i == chunk_end {
            breakpoints.push(time.len() - 1);
        }
    }

    let to_array = |v: Vec<f64>| -> Array1<T> {
        v.into_iter().map(|x| x.approx().unwrap()).collect()
    };
    let n = time.len();
    let flux_err = vec![params.sigma; n];
    let trend_weight: T = params.trend.powi(2).approx().unwrap();
    let basis: Array2<T> = to_array(ramp).into_shape_with_order((n, 1)).unwrap();
    let systematics = Systematics::new(vec![basis], vec![vec![trend_weight]; params.chunks]);

    let light_curve = LightCurve::new(
        to_array(time),
        to_array(flux),
        to_array(flux_raw),
        to_array(flux_err),
        breakpoints,
        NoiseModel::white(),
    )
    .unwrap()
    .with_systematics(systematics)
    .unwrap();

    SyntheticLightCurve {
        name: name.into(),
        params,
        light_curve,
    }
}

lazy_static! {
    pub static ref TRANSITING_LIGHT_CURVES_F64: Vec<SyntheticLightCurve<f64>> = vec![
        synthetic_light_curve(
            "quiet",
            SyntheticParams {
                seed: 1,
                ..Default::default()
            }
        ),
        synthetic_light_curve(
            "single",
            SyntheticParams {
                transit: Some(Transit {
                    period: 100.0,
                    epoch: 13.0,
                    duration: 0.25,
                    depth: 0.01,
                }),
                seed: 2,
                ..Default::default()
            }
        ),
        synthetic_light_curve(
            "periodic",
            SyntheticParams {
                transit: Some(Transit {
                    period: 7.3,
                    epoch: 2.1,
                    duration: 0.25,
                    depth: 0.01,
                }),
                seed: 3,
                ..Default::default()
            }
        ),
        synthetic_light_curve(
            "shallow",
            SyntheticParams {
                transit: Some(Transit {
                    period: 5.15,
                    epoch: 1.0,
                    duration: 0.35,
                    depth: 0.004,
                }),
                seed: 4,
                ..Default::default()
            }
        ),
    ];
}
