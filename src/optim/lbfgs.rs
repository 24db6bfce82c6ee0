//! Unconstrained limited-memory BFGS (component I): quasi-Newton descent
//! directions from [`super::History`]'s two-loop recursion, stepped with
//! [`super::line_search::more_thuente`].

use tracing::{debug, info};

use super::line_search::more_thuente;
use super::{convergence_threshold, dot, inf_norm, History, OptimizerParams, OptimizerResult, OptimizerStatus};
use crate::cost::DifferentiableCost;
use crate::error::{Result, TipiError};
use crate::scalar::Scalar;
use crate::shape::ShapedVector;

pub struct Lbfgs {
    params: OptimizerParams,
}

impl Lbfgs {
    pub fn new(params: OptimizerParams) -> Self {
        Self { params }
    }

    /// Minimizes `cost` starting from `x`, overwriting `x` in place with the
    /// last admitted iterate: on early return the caller still gets the
    /// best point found rather than having it discarded.
    pub fn minimize<T: Scalar>(
        &self,
        cost: &mut dyn DifferentiableCost<T>,
        x: &mut ShapedVector<T>,
    ) -> Result<OptimizerResult> {
        self.minimize_cooperative(cost, x, &mut || false)
    }

    /// Like [`Self::minimize`], but checks `should_abort` once per iteration
    /// and stops with [`TipiError::UserAborted`] the first time it returns
    /// `true`, preserving `x` at the last admitted iterate. Cancellation is
    /// cooperative and coarse-grained: the closure is polled between
    /// iterations, never mid-line-search.
    pub fn minimize_cooperative<T: Scalar>(
        &self,
        cost: &mut dyn DifferentiableCost<T>,
        x: &mut ShapedVector<T>,
        should_abort: &mut dyn FnMut() -> bool,
    ) -> Result<OptimizerResult> {
        let n = x.shape().count() as usize;
        let mut history = History::new(self.params.memory_size);

        let mut g = ShapedVector::<T>::zeros(x.shape().clone());
        let mut f = cost.compute_cost_and_gradient(1.0, x, &mut g, true)?;
        let mut g_f64: Vec<f64> = g.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
        let mut evaluations = 1usize;
        let grad_tol = convergence_threshold(self.params.gatol, self.params.grtol, inf_norm(&g_f64));

        let mut trial_x = x.clone();
        let mut trial_g = ShapedVector::<T>::zeros(x.shape().clone());

        for iteration in 0..self.params.max_iterations {
            if should_abort() {
                return Err(TipiError::UserAborted);
            }

            let grad_inf = inf_norm(&g_f64);
            if grad_inf <= grad_tol {
                info!(iteration, grad_inf, "l-bfgs converged");
                return Ok(OptimizerResult {
                    status: OptimizerStatus::Converged,
                    iterations: iteration,
                    evaluations,
                    final_cost: f,
                    final_grad_inf_norm: grad_inf,
                });
            }

            let direction = history.two_loop_direction(&g_f64);
            let directional_derivative = dot(&g_f64, &direction);
            if !(directional_derivative < 0.0) {
                debug!("two-loop direction was not a descent direction, resetting history");
                history.clear();
                let steepest: Vec<f64> = g_f64.iter().map(|&v| -v).collect();
                return self.steepest_descent_fallback(
                    cost,
                    x,
                    &mut g,
                    &mut g_f64,
                    &steepest,
                    f,
                    iteration,
                    evaluations,
                );
            }

            let x0: Vec<f64> = x.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
            let f0 = f;
            let g0 = directional_derivative;

            let outcome = {
                let mut eval = |step: f64| -> Result<(f64, f64)> {
                    for i in 0..n {
                        trial_x.as_mut_slice()[i] = T::from_f64(x0[i] + step * direction[i]);
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
            }?;

            let step = outcome.step;
            let mut s = vec![0.0; n];
            let mut y = vec![0.0; n];
            for i in 0..n {
                let new_xi = x0[i] + step * direction[i];
                s[i] = new_xi - x0[i];
                x.as_mut_slice()[i] = T::from_f64(new_xi);
            }
            let new_f = cost.compute_cost_and_gradient(1.0, x, &mut g, true)?;
            evaluations += 1;
            let new_g_f64: Vec<f64> = g.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
            for i in 0..n {
                y[i] = new_g_f64[i] - g_f64[i];
            }
            history.push(s, y);

            let relative_decrease = (f0 - new_f).abs() / f0.abs().max(1.0);
            f = new_f;
            g_f64 = new_g_f64;

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

    /// A plain steepest-descent step with a backtracking line search, used
    /// when the two-loop recursion produces a non-descent direction (can
    /// happen right after a history reset on an ill-conditioned problem).
    #[allow(clippy::too_many_arguments)]
    fn steepest_descent_fallback<T: Scalar>(
        &self,
        cost: &mut dyn DifferentiableCost<T>,
        x: &mut ShapedVector<T>,
        g: &mut ShapedVector<T>,
        g_f64: &mut Vec<f64>,
        direction: &[f64],
        f0: f64,
        iteration: usize,
        mut evaluations: usize,
    ) -> Result<OptimizerResult> {
        let n = x.shape().count() as usize;
        let x0: Vec<f64> = x.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
        let g0 = dot(g_f64, direction);
        let mut step = 1.0 / inf_norm(direction).max(1.0);
        let mut trial = x.clone();
        loop {
            for i in 0..n {
                trial.as_mut_slice()[i] = T::from_f64(x0[i] + step * direction[i]);
            }
            let fv = cost.compute_cost_and_gradient(1.0, &trial, g, true)?;
            evaluations += 1;
            if fv <= f0 + self.params.line_search.ftol * step * g0 || step < self.params.line_search.step_min {
                for i in 0..n {
                    x.as_mut_slice()[i] = trial.as_slice()[i];
                }
                *g_f64 = g.as_slice().iter().map(|v| crate::scalar::Scalar::to_f64(*v)).collect();
                let grad_inf = inf_norm(g_f64);
                return Ok(OptimizerResult {
                    status: OptimizerStatus::Warning(
                        "two-loop recursion produced a non-descent direction; fell back to steepest descent".into(),
                    ),
                    iterations: iteration + 1,
                    evaluations,
                    final_cost: fv,
                    final_grad_inf_norm: grad_inf,
                });
            }
            step *= 0.5;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TipiError;
    use crate::shape::Shape;

    /// f(x) = sum (x_i - target_i)^2, a convex quadratic with a unique
    /// minimizer, enough to exercise convergence end to end.
    struct Quadratic {
        shape: Shape,
        target: Vec<f64>,
    }

    impl DifferentiableCost<f64> for Quadratic {
        fn input_space(&self) -> &crate::shape::Shape {
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
    fn converges_on_a_quadratic_bowl() {
        let shape = Shape::new(&[4]).unwrap();
        let mut cost = Quadratic {
            shape: shape.clone(),
            target: vec![1.0, -2.0, 3.0, 0.5],
        };
        let mut x = ShapedVector::from_data(shape, vec![0.0; 4]).unwrap();
        let lbfgs = Lbfgs::new(OptimizerParams::default());
        let result = lbfgs.minimize(&mut cost, &mut x).unwrap();
        assert_eq!(result.status, OptimizerStatus::Converged);
        for (xi, ti) in x.as_slice().iter().zip(cost.target.iter()) {
            assert!((xi - ti).abs() < 1e-4, "xi={xi} ti={ti}");
        }
    }

    #[test]
    fn rejects_incoherent_line_search_bounds() {
        // guards that OptimizerParams plumbing surfaces line-search errors
        // rather than panicking.
        let mut params = OptimizerParams::default();
        params.line_search.ftol = 0.9;
        params.line_search.gtol = 0.1;
        let shape = Shape::new(&[2]).unwrap();
        let mut cost = Quadratic {
            shape: shape.clone(),
            target: vec![1.0, 1.0],
        };
        let mut x = ShapedVector::from_data(shape, vec![5.0, 5.0]).unwrap();
        let lbfgs = Lbfgs::new(params);
        let err = lbfgs.minimize(&mut cost, &mut x).unwrap_err();
        assert!(matches!(err, TipiError::InvalidArgument(_)));
    }
}
