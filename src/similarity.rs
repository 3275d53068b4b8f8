// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cosine similarity between embedding vectors.

use crate::errors::{Error, Result};

/// Computes cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`. A zero-magnitude vector on either side
/// yields `0.0`. Vectors of different length are rejected.
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot_product = 0.0f64;
    let mut magnitude_a = 0.0f64;
    let mut magnitude_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::InvalidInput(
                "vector contains a non-finite component".to_string(),
            ));
        }
        let (x, y) = (x as f64, y as f64);
        dot_product += x * y;
        magnitude_a += x * x;
        magnitude_b += y * y;
    }

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    let cosine = dot_product / (magnitude_a.sqrt() * magnitude_b.sqrt());
    Ok(cosine.clamp(-1.0, 1.0) as f32)
}

/// Returns true when every component is zero (or the vector is empty).
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

/// Scales a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
