//! Lossy scalar codec: one signed byte per component.
//!
//! Components are clamped to `[-1, 1]`, scaled by 127 and truncated toward zero, so
//! for inputs already inside that range the per-component reconstruction error is
//! at most `1 / 127`.

use crate::metric::euclidean;
use serde::{Deserialize, Serialize};

pub const QUANT_SCALE: f32 = 127.0;

/// Upper bound on the per-component error for inputs within `[-1, 1]`.
pub const MAX_COMPONENT_ERROR: f32 = 1.0 / QUANT_SCALE;

#[must_use]
pub fn quantize(vector: &[f32]) -> Vec<i8> {
    vector
        .iter()
        // `as` truncates toward zero and saturates; NaN becomes 0.
        .map(|v| (v.clamp(-1.0, 1.0) * QUANT_SCALE) as i8)
        .collect()
}

#[must_use]
pub fn dequantize(codes: &[i8]) -> Vec<f32> {
    codes.iter().map(|c| f32::from(*c) / QUANT_SCALE).collect()
}

/// Euclidean distance between `original` and the reconstruction of `codes`.
/// Diagnostic only.
#[must_use]
pub fn quantization_error(original: &[f32], codes: &[i8]) -> f32 {
    euclidean(original, &dequantize(codes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantizedVector(Vec<i8>);

impl QuantizedVector {
    #[must_use]
    pub fn encode(vector: &[f32]) -> Self {
        Self(quantize(vector))
    }

    #[must_use]
    pub fn codes(&self) -> &[i8] {
        &self.0
    }

    #[must_use]
    pub fn dequantize(&self) -> Vec<f32> {
        dequantize(&self.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn error_against(&self, original: &[f32]) -> f32 {
        quantization_error(original, &self.0)
    }
}

impl From<Vec<i8>> for QuantizedVector {
    fn from(codes: Vec<i8>) -> Self {
        Self(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_toward_zero() {
        assert_eq!(quantize(&[0.5, -0.5, 1.0, -1.0, 0.0]), vec![63, -63, 127, -127, 0]);
    }

    #[test]
    fn clamps_out_of_range_components() {
        assert_eq!(quantize(&[4.2, -17.0]), vec![127, -127]);
    }

    #[test]
    fn dequantize_scales_back() {
        let restored = dequantize(&[63, -127]);
        assert!((restored[0] - 0.496_063).abs() < 1e-5);
        assert_eq!(restored[1], -1.0);
    }

    #[test]
    fn quantized_vector_reports_error() {
        let original = vec![0.25, -0.75, 0.999];
        let encoded = QuantizedVector::encode(&original);
        assert_eq!(encoded.len(), 3);
        let err = encoded.error_against(&original);
        assert!(err > 0.0);
        assert!(err <= MAX_COMPONENT_ERROR * (original.len() as f32).sqrt());
    }

    #[test]
    fn empty_input_yields_empty_codes() {
        assert!(quantize(&[]).is_empty());
        assert!(QuantizedVector::encode(&[]).is_empty());
    }
}
