//! Weighted sum of differentiable costs sharing one variable space
//! (component G).

use super::{clear_or_noop, DifferentiableCost};
use crate::error::{Result, TipiError};
use crate::scalar::Scalar;
use crate::shape::{Shape, ShapedVector};

pub struct CompositeCost<T: Scalar> {
    input_space: Shape,
    terms: Vec<(f64, Box<dyn DifferentiableCost<T>>)>,
}

impl<T: Scalar> CompositeCost<T> {
    pub fn new(input_space: Shape) -> Self {
        Self {
            input_space,
            terms: Vec::new(),
        }
    }

    /// Adds `weight * cost` to the sum. `cost` must share this composite's
    /// input space and `weight` must be finite and nonnegative.
    pub fn add_term(&mut self, weight: f64, cost: Box<dyn DifferentiableCost<T>>) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(TipiError::InvalidArgument(format!(
                "composite term weight must be finite and nonnegative, got {weight}"
            )));
        }
        if cost.input_space() != &self.input_space {
            return Err(TipiError::ShapeMismatch {
                expected: self.input_space.dims().to_vec(),
                got: cost.input_space().dims().to_vec(),
            });
        }
        self.terms.push((weight, cost));
        Ok(())
    }
}

impl<T: Scalar> DifferentiableCost<T> for CompositeCost<T> {
    fn input_space(&self) -> &Shape {
        &self.input_space
    }

    fn evaluate(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        let mut total = 0.0;
        for (weight, cost) in self.terms.iter_mut() {
            total += *weight * cost.evaluate(alpha, x)?;
        }
        Ok(total)
    }

    fn compute_cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        g: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64> {
        let mut total = 0.0;
        let mut cleared = false;
        for (weight, cost) in self.terms.iter_mut() {
            if *weight <= 0.0 {
                continue;
            }
            let term_clear = clear && !cleared;
            total += cost.compute_cost_and_gradient(alpha * *weight, x, g, term_clear)?;
            cleared = true;
        }
        if clear && !cleared {
            // no term carried a positive weight; the contract still
            // requires the accumulator to be cleared exactly once.
            clear_or_noop(g, true);
        }
        Ok(total)
    }
}
