//! Weighted convolution data-fidelity cost (component E):
//! `f(x) = 1/2 (H x - y)^T diag(w) (H x - y)` on the input space of `H`.

use super::{clear_or_noop, DifferentiableCost, WeightedData};
use crate::conv::{Convolution, Job};
use crate::error::Result;
use crate::scalar::Scalar;
use crate::shape::{Shape, ShapedVector};

pub struct WeightedConvolutionCost<T: Scalar> {
    conv: Convolution<T>,
    data: WeightedData<T>,
    residual: ShapedVector<T>,
    weighted_residual: ShapedVector<T>,
    grad_scratch: ShapedVector<T>,
}

impl<T: Scalar> WeightedConvolutionCost<T> {
    pub fn new(conv: Convolution<T>, data: WeightedData<T>) -> Self {
        let output_shape = conv.output_shape().clone();
        let input_shape = conv.input_shape().clone();
        Self {
            residual: ShapedVector::zeros(output_shape.clone()),
            weighted_residual: ShapedVector::zeros(output_shape),
            grad_scratch: ShapedVector::zeros(input_shape),
            conv,
            data,
        }
    }

    pub fn convolution(&self) -> &Convolution<T> {
        &self.conv
    }

    pub fn convolution_mut(&mut self) -> &mut Convolution<T> {
        &mut self.conv
    }
}

impl<T: Scalar> DifferentiableCost<T> for WeightedConvolutionCost<T> {
    fn input_space(&self) -> &Shape {
        self.conv.input_shape()
    }

    fn evaluate(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        let mut dummy = ShapedVector::zeros(self.conv.input_shape().clone());
        // evaluate-only path still needs the residual; reuse the full
        // compute path and discard the gradient rather than duplicate the
        // residual arithmetic.
        self.compute_cost_and_gradient(alpha, x, &mut dummy, true)
    }

    fn compute_cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        g: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64> {
        if alpha == 0.0 {
            clear_or_noop(g, clear);
            return Ok(0.0);
        }

        self.conv.apply(&mut self.residual, x, Job::Direct)?;

        let (y, w) = self.data.data_and_weights()?;

        let mut sum = 0.0f64;
        for i in 0..self.residual.as_slice().len() {
            let r = self.residual.as_slice()[i].to_f64() - y[i].to_f64();
            let wr = w[i].to_f64() * r;
            sum += r * wr;
            self.weighted_residual.as_mut_slice()[i] = T::from_f64(wr);
        }

        self.conv
            .apply(&mut self.grad_scratch, &self.weighted_residual, Job::Adjoint)?;

        if clear {
            for i in 0..g.as_slice().len() {
                g.as_mut_slice()[i] = T::from_f64(alpha * self.grad_scratch.as_slice()[i].to_f64());
            }
        } else {
            for i in 0..g.as_slice().len() {
                let add = T::from_f64(alpha * self.grad_scratch.as_slice()[i].to_f64());
                g.as_mut_slice()[i] = g.as_slice()[i] + add;
            }
        }

        Ok(alpha * 0.5 * sum)
    }
}
