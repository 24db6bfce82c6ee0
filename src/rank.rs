//! Shared rank dispatch for the convolution operator and the hyperbolic TV
//! regularizer. Both need a specialized inner loop per rank 1/2/3; this
//! enum is the single place that decides which loop a given shape maps to,
//! so push/pull indexing and block-iteration indexing agree on the same
//! column-major, first-index-fastest convention.

use crate::error::{Result, TipiError};
use crate::shape::Shape;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rank {
    One,
    Two,
    Three,
}

impl Rank {
    pub fn from_shape(shape: &Shape, component: &'static str) -> Result<Self> {
        match shape.rank() {
            1 => Ok(Rank::One),
            2 => Ok(Rank::Two),
            3 => Ok(Rank::Three),
            r => Err(TipiError::UnsupportedRank { rank: r, component }),
        }
    }

    pub fn as_usize(self) -> usize {
        match self {
            Rank::One => 1,
            Rank::Two => 2,
            Rank::Three => 3,
        }
    }
}

/// Converts a flat, column-major (first index fastest) index into per-axis
/// multi-indices for `dims`.
pub fn unflatten(mut idx: i64, dims: &[i64]) -> Vec<i64> {
    let mut out = vec![0i64; dims.len()];
    for k in 0..dims.len() {
        out[k] = idx % dims[k];
        idx /= dims[k];
    }
    out
}

/// Converts per-axis multi-indices back into a flat, column-major index.
pub fn flatten(idx: &[i64], dims: &[i64]) -> i64 {
    let mut flat = 0i64;
    let mut stride = 1i64;
    for k in 0..dims.len() {
        flat += idx[k] * stride;
        stride *= dims[k];
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_unflatten_roundtrip() {
        let dims = [3i64, 4, 5];
        for flat in 0..(3 * 4 * 5) {
            let idx = unflatten(flat, &dims);
            assert_eq!(flatten(&idx, &dims), flat);
        }
    }
}
