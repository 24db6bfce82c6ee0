//! Shapes and shaped vectors (component A).
//!
//! A [`Shape`] is an immutable ordered list of positive dimensions with a
//! precomputed element count. A [`ShapedVector`] pairs a `Shape` with a
//! heap-owned contiguous buffer whose length equals the shape's count.
//! Neither type exposes strides: the multi-dimensional view is implicit,
//! first index varying fastest, except where the regularizer
//! ([`crate::regularization`]) explicitly indexes 2x2(x2) blocks.

use crate::error::{Result, TipiError};

/// Immutable ordered sequence of positive dimensions with a precomputed
/// element count. Equality is structural.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape {
    dims: Vec<i64>,
    count: i64,
}

impl Shape {
    /// Builds a shape from a dimension list. Rejects any `dims[k] < 1` and
    /// any product overflowing `i64`.
    pub fn new(dims: &[i64]) -> Result<Self> {
        let mut count: i64 = 1;
        for &d in dims {
            if d < 1 {
                return Err(TipiError::InvalidArgument(format!(
                    "dimension must be >= 1, got {d}"
                )));
            }
            count = count.checked_mul(d).ok_or_else(|| {
                TipiError::NumericalOverflow(format!(
                    "element count overflows i64 for dims {dims:?}"
                ))
            })?;
        }
        Ok(Self {
            dims: dims.to_vec(),
            count,
        })
    }

    /// The scalar shape (rank 0, one element).
    pub fn scalar() -> Self {
        Self {
            dims: Vec::new(),
            count: 1,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn dim(&self, k: usize) -> i64 {
        self.dims[k]
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }
}

/// A contiguous buffer of `T` paired with the [`Shape`] it belongs to.
/// `data.len() == shape.count()` is an invariant enforced at construction.
/// Two shaped vectors belong to the same vector space iff their shapes are
/// equal; arithmetic across spaces is a caller error, not modeled here
/// (the cost functions validate this explicitly at their own boundaries).
#[derive(Clone, Debug)]
pub struct ShapedVector<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: Clone + Default> ShapedVector<T> {
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.count() as usize;
        Self {
            shape,
            data: vec![T::default(); n],
        }
    }
}

impl<T> ShapedVector<T> {
    pub fn from_data(shape: Shape, data: Vec<T>) -> Result<Self> {
        if data.len() as i64 != shape.count() {
            return Err(TipiError::InvalidArgument(format!(
                "buffer length {} does not match shape count {}",
                data.len(),
                shape.count()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn same_space(&self, other: &ShapedVector<T>) -> bool {
        self.shape == other.shape
    }
}

/// Smallest `m >= n` whose prime factorization uses only the primes the FFT
/// backend factors efficiently (`{2,3,5,7}` per [`crate::consts::FFT_FRIENDLY_PRIMES`]).
/// Used by the convolution operator builder and the driver's automatic
/// object-shape selection whenever a work dimension is not pinned
/// explicitly.
pub fn best_fft_dim(n: i64) -> i64 {
    if n <= 1 {
        return 1;
    }
    let mut m = n;
    loop {
        if is_fft_friendly(m) {
            return m;
        }
        m += 1;
    }
}

fn is_fft_friendly(mut m: i64) -> bool {
    for &p in crate::consts::FFT_FRIENDLY_PRIMES.iter() {
        let p = p as i64;
        while m % p == 0 {
            m /= p;
        }
    }
    m == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_dims() {
        assert!(Shape::new(&[4, 0, 2]).is_err());
        assert!(Shape::new(&[4, -1]).is_err());
    }

    #[test]
    fn counts_product() {
        let s = Shape::new(&[4, 5, 6]).unwrap();
        assert_eq!(s.count(), 120);
        assert_eq!(s.rank(), 3);
    }

    #[test]
    fn best_fft_dim_picks_smooth_numbers() {
        assert_eq!(best_fft_dim(1), 1);
        assert_eq!(best_fft_dim(8), 8);
        assert_eq!(best_fft_dim(9), 9);
        assert_eq!(best_fft_dim(11), 12);
        assert_eq!(best_fft_dim(13), 14);
    }
}
