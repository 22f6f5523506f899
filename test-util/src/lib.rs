pub use synthetic::{
    SyntheticLightCurve, SyntheticParams, Transit, TRANSITING_LIGHT_CURVES_F64,
    synthetic_light_curve,
};

mod synthetic;
