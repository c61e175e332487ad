//! Floating-point element types accepted by the kernels.
//!
//! Every kernel is generic over [`Element`], which is implemented for `f32`
//! and `f64`. The precision is picked per call by the caller's array type.

use ndarray::NdFloat;

/// Scalar type of weights, inputs, outputs and path values.
///
/// Builds on [`NdFloat`] (so `exp`, `ln`, `dot` and `scaled_add` are available)
/// and adds the lossy `f64` conversions needed for scalars that come in as
/// configuration, such as the gradient `scale` or the score clamp.
pub trait Element: NdFloat {
    /// Convert from `f64`, rounding when `Self` is narrower.
    fn from_f64(value: f64) -> Self;

    /// Widen to `f64`.
    fn into_f64(self) -> f64;
}

impl Element for f32 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_conversions() {
        assert_eq!(<f32 as Element>::from_f64(0.5), 0.5f32);
        assert_eq!(0.25f32.into_f64(), 0.25f64);
    }

    #[test]
    fn test_f64_conversions_are_identity() {
        let x = 1.0f64 / 3.0;
        assert_eq!(<f64 as Element>::from_f64(x), x);
        assert_eq!(x.into_f64(), x);
    }
}
