use conv::prelude::*;
use conv::RoundToNearest;
use ndarray::NdFloat;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::iter::Sum;

/// Floating point trait used by every search component, implemented for [`f32`] and [`f64`]
pub trait Float:
    'static
    + NdFloat
    + num_traits::FloatConst
    + num_traits::NumAssignOps
    + Sum
    + Default
    + ValueFrom<f32>
    + ValueInto<f64>
    + ApproxFrom<usize>
    + ApproxFrom<f64>
    + ApproxInto<usize, RoundToNearest>
    + JsonSchema
    + Serialize
    + DeserializeOwned
{
    fn half() -> Self;

    fn two() -> Self;

    fn three() -> Self;

    /// Normal-consistent scale of the median absolute deviation
    fn mad_scale() -> Self;
}

impl Float for f32 {
    #[inline]
    fn half() -> Self {
        0.5
    }

    #[inline]
    fn two() -> Self {
        2.0
    }

    #[inline]
    fn three() -> Self {
        3.0
    }

    #[inline]
    fn mad_scale() -> Self {
        1.4826
    }
}

impl Float for f64 {
    #[inline]
    fn half() -> Self {
        0.5
    }

    #[inline]
    fn two() -> Self {
        2.0
    }

    #[inline]
    fn three() -> Self {
        3.0
    }

    #[inline]
    fn mad_scale() -> Self {
        1.4826
    }
}
