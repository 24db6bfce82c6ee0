//! The element type a vector space is built over. The convolution operator,
//! the cost functions and the regularizer are each a single implementation
//! generic over `Scalar` rather than a family of hand-duplicated
//! `f32`/`f64` classes; rank and precision are both resolved at
//! construction, not via inheritance.

use num_traits::Float;

pub trait Scalar: Float + Copy + Default + Send + Sync + std::fmt::Debug + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl Scalar for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Scalar for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}
