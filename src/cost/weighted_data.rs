//! Weighted data container (component D): pairs a data vector with
//! nonnegative weights and enforces their invariants on first use. Also
//! acts as a differentiable quadratic cost in its own right,
//! `f(x) = 1/2 sum_i w_i (x_i - y_i)^2`.

use tracing::warn;

use super::{clear_or_noop, DifferentiableCost};
use crate::error::{Result, TipiError};
use crate::scalar::Scalar;
use crate::shape::{Shape, ShapedVector};

pub struct WeightedData<T: Scalar> {
    shape: Shape,
    data: Vec<T>,
    weights: Option<Vec<T>>,
    weights_from_data: bool,
    finalized: bool,
    n_valid: usize,
}

impl<T: Scalar> WeightedData<T> {
    /// Records `data`; weights are unset until [`Self::set_weights`] or
    /// [`Self::compute_weights_from_data`] is called.
    pub fn new_with_data(data: ShapedVector<T>) -> Self {
        let shape = data.shape().clone();
        Self {
            shape,
            data: data.into_data(),
            weights: None,
            weights_from_data: false,
            finalized: false,
            n_valid: 0,
        }
    }

    /// Sets explicit weights. Mutually exclusive with
    /// [`Self::compute_weights_from_data`] and rejected once weights have
    /// already been set, or the container has already been finalized.
    pub fn set_weights(&mut self, w: ShapedVector<T>) -> Result<()> {
        if self.finalized || self.weights.is_some() {
            return Err(TipiError::InvalidArgument(
                "weights already set; WeightedData weights may be set at most once".into(),
            ));
        }
        if w.shape() != &self.shape {
            return Err(TipiError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: w.shape().dims().to_vec(),
            });
        }
        self.weights = Some(w.into_data());
        Ok(())
    }

    /// `w[i] = 1 / (alpha * max(0, y[i]) + beta)` where `w[i] = 0` unless
    /// `beta > 0` or `alpha * y[i] > 0`. Mutually exclusive with
    /// [`Self::set_weights`].
    pub fn compute_weights_from_data(&mut self, alpha: f64, beta: f64) -> Result<()> {
        if self.finalized || self.weights.is_some() {
            return Err(TipiError::InvalidArgument(
                "weights already set; cannot derive weights from data".into(),
            ));
        }
        if alpha < 0.0 || beta < 0.0 {
            return Err(TipiError::InvalidArgument(
                "alpha and beta must be nonnegative".into(),
            ));
        }
        let mut w = vec![T::zero(); self.data.len()];
        for (i, &y) in self.data.iter().enumerate() {
            let yf = y.to_f64();
            let positive_part = yf.max(0.0);
            let valid = beta > 0.0 || alpha * yf > 0.0;
            w[i] = if valid {
                T::from_f64(1.0 / (alpha * positive_part + beta))
            } else {
                T::zero()
            };
        }
        self.weights = Some(w);
        self.weights_from_data = true;
        Ok(())
    }

    /// Zeroes weights wherever `mask[i]` is truthy. Idempotent and
    /// monotonic: may zero more weights, never raises them. Creates a
    /// weights vector of `1`/`0` if none exists yet.
    pub fn mark_bad_data(&mut self, mask: &[bool]) -> Result<()> {
        if mask.len() != self.data.len() {
            return Err(TipiError::ShapeMismatch {
                expected: vec![self.data.len() as i64],
                got: vec![mask.len() as i64],
            });
        }
        let w = self.weights.get_or_insert_with(|| {
            mask.iter()
                .map(|&bad| if bad { T::zero() } else { T::one() })
                .collect()
        });
        for (wi, &bad) in w.iter_mut().zip(mask.iter()) {
            if bad {
                *wi = T::zero();
            }
        }
        Ok(())
    }

    /// Walks the data/weights buffers once, enforcing their invariants.
    /// Idempotent: later calls are no-ops. Implicit on first access via
    /// [`Self::data`], [`Self::weights`], or [`Self::n_valid`].
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let weights = self
            .weights
            .get_or_insert_with(|| vec![T::one(); self.data.len()]);

        let mut n_valid = 0usize;
        for i in 0..self.data.len() {
            let y = self.data[i].to_f64();
            let w = weights[i].to_f64();

            if !w.is_finite() || w < 0.0 {
                return Err(TipiError::InvalidWeights(format!(
                    "weight at index {i} is {w}, must be finite and nonnegative"
                )));
            }

            if !y.is_finite() {
                if w > 0.0 {
                    return Err(TipiError::InconsistentMasking { index: i, weight: w });
                }
                self.data[i] = T::zero();
            } else if w > 0.0 {
                n_valid += 1;
            }
        }
        self.n_valid = n_valid;
        self.finalized = true;
        if n_valid == 0 {
            warn!("WeightedData finalized with zero valid entries");
        }
        Ok(())
    }

    pub fn data(&mut self) -> Result<&[T]> {
        self.finalize()?;
        Ok(&self.data)
    }

    pub fn weights(&mut self) -> Result<&[T]> {
        self.finalize()?;
        Ok(self.weights.as_ref().unwrap())
    }

    pub fn data_and_weights(&mut self) -> Result<(&[T], &[T])> {
        self.finalize()?;
        Ok((&self.data, self.weights.as_ref().unwrap()))
    }

    pub fn n_valid(&mut self) -> Result<usize> {
        self.finalize()?;
        Ok(self.n_valid)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl<T: Scalar> DifferentiableCost<T> for WeightedData<T> {
    fn input_space(&self) -> &Shape {
        &self.shape
    }

    fn evaluate(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        if x.shape() != &self.shape {
            return Err(TipiError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: x.shape().dims().to_vec(),
            });
        }
        if alpha == 0.0 {
            return Ok(0.0);
        }
        self.finalize()?;
        let w = self.weights.as_ref().unwrap();
        let mut sum = 0.0f64;
        for i in 0..self.data.len() {
            let d = x.as_slice()[i].to_f64() - self.data[i].to_f64();
            sum += w[i].to_f64() * d * d;
        }
        Ok(alpha * 0.5 * sum)
    }

    fn compute_cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        g: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64> {
        if x.shape() != &self.shape || g.shape() != &self.shape {
            return Err(TipiError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: x.shape().dims().to_vec(),
            });
        }
        if alpha == 0.0 {
            clear_or_noop(g, clear);
            return Ok(0.0);
        }
        self.finalize()?;
        let w = self.weights.as_ref().unwrap();
        let mut sum = 0.0f64;
        for i in 0..self.data.len() {
            let d_f64 = x.as_slice()[i].to_f64() - self.data[i].to_f64();
            let w_f64 = w[i].to_f64();
            sum += w_f64 * d_f64 * d_f64;
            let grad_i = T::from_f64(alpha * w_f64 * d_f64);
            if clear {
                g.as_mut_slice()[i] = grad_i;
            } else {
                g.as_mut_slice()[i] = g.as_slice()[i] + grad_i;
            }
        }
        Ok(alpha * 0.5 * sum)
    }
}
