//! Bound-constrained limited-memory variable metric method (component J):
//! BLMVM restricts the L-BFGS two-loop recursion to the free set (components
//! not pinned at an active bound) and takes steps through the gradient
//! projection onto the box `[lower, upper]`, so curvature pairs are only ever
//! built from the free subspace (Benson & Moré).

use tracing::info;

use super::line_search::more_thuente;
use super::{convergence_threshold, dot, inf_norm, History, OptimizerParams, OptimizerResult, OptimizerStatus};
use crate::cost::DifferentiableCost;
use crate::error::{Result, TipiError};
use crate::scalar::Scalar;
use crate::shape::ShapedVector;

/// A per-component box constraint; either bound may be absent.
#[derive(Clone, Debug)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> crate::error::Result<Self> {
        if lower.len() != upper.len() {
            return Err(crate::error::TipiError::InvalidArgument(
                "lower and upper bound vectors must have the same length".into(),
            ));
        }
        for (&lo, &hi) in lower.iter().zip(upper.iter()) {
            if lo > hi {
                return Err(crate::error::TipiError::InvalidArgument(format!(
                    "lower bound {lo} exceeds upper bound {hi}"
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    fn project(&self, x: &mut [f64]) {
        for i in 0..x.len() {
            x[i] = x[i].clamp(self.lower[i], self.upper[i]);
        }
    }

    fn is_free(&self, i: usize, x: f64, grad: f64) -> bool {
        let at_lower = x <= self.lower[i];
        let at_upper = x >= self.upper[i];
        !((at_lower && grad > 0.0) || (at_upper && grad < 0.0))
    }
}

pub struct Blmvm {
    params: OptimizerParams,
    bounds: Bounds,
}

impl Blmvm {
    pub fn new(params: OptimizerParams, bounds: Bounds) -> Self {
        Self { params, bounds }
    }

    pub fn minimize<T: Scalar>(
        &self,
        cost: &mut dyn DifferentiableCost<T>,
        x: &mut ShapedVector<T>,
    ) -> Result<OptimizerResult> {
        self.minimize_cooperative(cost, x, &mut || false)
    }

    /// Like [`Self::minimize`], but checks `should_abort` once per iteration
    /// and stops with [`TipiError::UserAborted`] the first time it returns
    /// `true`, preserving `x` at the last admitted iterate.
    pub fn minimize_cooperative<T: Scalar>(
        &self,
        cost: &mut dyn DifferentiableCost<T>,
        x: &mut ShapedVector<T>,
        should_abort: &mut dyn FnMut() -> bool,
    ) -> Result<OptimizerResult> {
        let n = x.shape().count() as usize;
        if self.bounds.lower.len() != n {
            return Err(crate::error::TipiError::ShapeMismatch {
                expected: vec![n as i64],
                got: vec![self.bounds.lower.len() as i64],
            });
        }

        let mut x0: Vec<f64> = x.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
        self.bounds.project(&mut x0);
        for i in 0..n {
            x.as_mut_slice()[i] = T::from_f64(x0[i]);
        }

        let mut history = History::new(self.params.memory_size);
        let mut g = ShapedVector::<T>::zeros(x.shape().clone());
        let mut f = cost.compute_cost_and_gradient(1.0, x, &mut g, true)?;
        let mut g_f64: Vec<f64> = g.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
        let mut evaluations = 1usize;
        let mut trial_x = x.clone();
        let mut trial_g = ShapedVector::<T>::zeros(x.shape().clone());

        let initial_free_grad: Vec<f64> = (0..n)
            .map(|i| if self.bounds.is_free(i, x0[i], g_f64[i]) { g_f64[i] } else { 0.0 })
            .collect();
        let grad_tol = convergence_threshold(self.params.gatol, self.params.grtol, inf_norm(&initial_free_grad));

        for iteration in 0..self.params.max_iterations {
            if should_abort() {
                return Err(TipiError::UserAborted);
            }

            let mut free_grad = g_f64.clone();
            for i in 0..n {
                if !self.bounds.is_free(i, x0[i], g_f64[i]) {
                    free_grad[i] = 0.0;
                }
            }
            let grad_inf = inf_norm(&free_grad);
            if grad_inf <= grad_tol {
                info!(iteration, grad_inf, "blmvm converged");
                return Ok(OptimizerResult {
                    status: OptimizerStatus::Converged,
                    iterations: iteration,
                    evaluations,
                    final_cost: f,
                    final_grad_inf_norm: grad_inf,
                });
            }

            let mut direction = history.two_loop_direction(&free_grad);
            for i in 0..n {
                if !self.bounds.is_free(i, x0[i], g_f64[i]) {
                    direction[i] = 0.0;
                }
            }
            let directional_derivative = dot(&free_grad, &direction);
            if !(directional_derivative < 0.0) {
                history.clear();
                direction = free_grad.iter().map(|&v| -v).collect();
            }

            let f0 = f;
            let g0 = dot(&free_grad, &direction).min(-f64::EPSILON);

            let outcome = {
                let mut eval = |step: f64| -> Result<(f64, f64)> {
                    let mut trial = vec![0.0; n];
                    for i in 0..n {
                        trial[i] = x0[i] + step * direction[i];
                    }
                    self.bounds.project(&mut trial);
                    for i in 0..n {
                        trial_x.as_mut_slice()[i] = T::from_f64(trial[i]);
                    }
                    let fv = cost.compute_cost_and_gradient(1.0, &trial_x, &mut trial_g, true)?;
                    evaluations += 1;
                    let tg: f64 = trial_g
                        .as_slice()
                        .iter()
                        .zip(direction.iter())
                        .map(|(&gi, &di)| gi.to_f64() * di)
                        .sum();
                    Ok((fv, tg))
                };
                more_thuente(&mut eval, f0, g0, 1.0, &self.params.line_search)
            };

            let step = match outcome {
                Ok(o) => o.step,
                Err(_) => {
                    // projection can make the line search's Wolfe model
                    // imprecise near a bound; fall back to a short
                    // projected gradient step rather than aborting.
                    1e-4
                }
            };

            let mut new_x = vec![0.0; n];
            for i in 0..n {
                new_x[i] = x0[i] + step * direction[i];
            }
            self.bounds.project(&mut new_x);
            let s: Vec<f64> = new_x.iter().zip(x0.iter()).map(|(&a, &b)| a - b).collect();
            for i in 0..n {
                x.as_mut_slice()[i] = T::from_f64(new_x[i]);
            }
            let new_f = cost.compute_cost_and_gradient(1.0, x, &mut g, true)?;
            evaluations += 1;
            let new_g_f64: Vec<f64> = g.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
            let y: Vec<f64> = new_g_f64.iter().zip(g_f64.iter()).map(|(&a, &b)| a - b).collect();
            history.push(s, y);

            let relative_decrease = (f0 - new_f).abs() / f0.abs().max(1.0);
            f = new_f;
            g_f64 = new_g_f64;
            x0 = new_x;

            if relative_decrease < self.params.cost_tol {
                let grad_inf = inf_norm(&g_f64);
                return Ok(OptimizerResult {
                    status: OptimizerStatus::NoProgress,
                    iterations: iteration + 1,
                    evaluations,
                    final_cost: f,
                    final_grad_inf_norm: grad_inf,
                });
            }
        }

        Ok(OptimizerResult {
            status: OptimizerStatus::MaxIterationsReached,
            iterations: self.params.max_iterations,
            evaluations,
            final_cost: f,
            final_grad_inf_norm: inf_norm(&g_f64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    struct Quadratic {
        shape: Shape,
        target: Vec<f64>,
    }

    impl DifferentiableCost<f64> for Quadratic {
        fn input_space(&self) -> &Shape {
            &self.shape
        }
        fn evaluate(&mut self, alpha: f64, x: &ShapedVector<f64>) -> Result<f64> {
            let mut sum = 0.0;
            for (xi, ti) in x.as_slice().iter().zip(self.target.iter()) {
                sum += (xi - ti).powi(2);
            }
            Ok(alpha * sum)
        }
        fn compute_cost_and_gradient(
            &mut self,
            alpha: f64,
            x: &ShapedVector<f64>,
            g: &mut ShapedVector<f64>,
            _clear: bool,
        ) -> Result<f64> {
            let mut sum = 0.0;
            for i in 0..x.as_slice().len() {
                let d = x.as_slice()[i] - self.target[i];
                sum += d * d;
                g.as_mut_slice()[i] = alpha * 2.0 * d;
            }
            Ok(alpha * sum)
        }
    }

    #[test]
    fn clamps_the_minimizer_to_the_box() {
        // unconstrained minimizer is (5, -5); box keeps both components in [0, 1].
        let shape = Shape::new(&[2]).unwrap();
        let mut cost = Quadratic {
            shape: shape.clone(),
            target: vec![5.0, -5.0],
        };
        let mut x = ShapedVector::from_data(shape, vec![0.5, 0.5]).unwrap();
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let blmvm = Blmvm::new(OptimizerParams::default(), bounds);
        let result = blmvm.minimize(&mut cost, &mut x).unwrap();
        assert_eq!(result.status, OptimizerStatus::Converged);
        assert!((x.as_slice()[0] - 1.0).abs() < 1e-3);
        assert!((x.as_slice()[1] - 0.0).abs() < 1e-3);
    }
}
