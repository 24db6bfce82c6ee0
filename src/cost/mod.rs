//! Differentiable cost functions sharing one contract: given a scale
//! `alpha`, an input, a gradient accumulator and a clear flag, each
//! implementation returns `alpha * f(x)` and either overwrites or adds
//! `alpha * grad f(x)` into the accumulator.

pub mod composite;
pub mod data_fidelity;
pub mod weighted_data;

pub use composite::CompositeCost;
pub use data_fidelity::WeightedConvolutionCost;
pub use weighted_data::WeightedData;

use crate::error::Result;
use crate::scalar::Scalar;
use crate::shape::{Shape, ShapedVector};

/// A pure function from a vector space to `R ∪ {+∞}` that, given a scaling
/// `alpha >= 0`, an input `x`, a gradient accumulator `g`, and a clear
/// flag, returns `alpha * f(x)` and either overwrites or adds `alpha *
/// grad f(x)` to `g`.
pub trait DifferentiableCost<T: Scalar> {
    fn input_space(&self) -> &Shape;

    fn evaluate(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64>;

    fn compute_cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        g: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64>;
}

pub(crate) fn clear_or_noop<T: Scalar>(g: &mut ShapedVector<T>, clear: bool) {
    if clear {
        for v in g.as_mut_slice() {
            *v = T::zero();
        }
    }
}
