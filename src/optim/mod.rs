//! Limited-memory quasi-Newton optimizers (components H, I, J): a Moré-Thuente
//! line search, unconstrained L-BFGS, and a bound-constrained BLMVM variant
//! built on the same two-loop recursion.

pub mod bound;
pub mod lbfgs;
pub mod line_search;

pub use bound::Blmvm;
pub use lbfgs::Lbfgs;
pub use line_search::{LineSearchOutcome, LineSearchParams};

/// Why an optimizer run stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizerStatus {
    /// `||projected grad||_inf <= max(gatol, grtol * ||g0||_inf)`.
    Converged,
    /// The relative decrease in cost fell below `cost_tol` for one step.
    NoProgress,
    /// The run completed but degraded to a fallback strategy along the way
    /// (e.g. the two-loop recursion produced a non-descent direction and
    /// steepest descent was substituted for one step).
    Warning(String),
    MaxIterationsReached,
}

#[derive(Clone, Debug)]
pub struct OptimizerResult {
    pub status: OptimizerStatus,
    pub iterations: usize,
    pub evaluations: usize,
    pub final_cost: f64,
    pub final_grad_inf_norm: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct OptimizerParams {
    pub memory_size: usize,
    pub max_iterations: usize,
    /// Absolute gradient convergence threshold, `gatol >= 0`.
    pub gatol: f64,
    /// Gradient convergence threshold relative to the initial gradient's
    /// infinity norm, `grtol >= 0`. Convergence is declared when
    /// `||g||_inf <= max(gatol, grtol * ||g0||_inf)`, `g0` being the
    /// gradient at the optimizer's own starting point.
    pub grtol: f64,
    pub cost_tol: f64,
    pub line_search: LineSearchParams,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            memory_size: crate::consts::DEFAULT_MEMORY_SIZE,
            max_iterations: 500,
            gatol: crate::consts::DEFAULT_GATOL,
            grtol: crate::consts::DEFAULT_GRTOL,
            cost_tol: 1e-12,
            line_search: LineSearchParams::default(),
        }
    }
}

/// `max(gatol, grtol * g0_inf)`, the gradient-norm threshold below which an
/// optimizer declares convergence.
pub(crate) fn convergence_threshold(gatol: f64, grtol: f64, g0_inf: f64) -> f64 {
    gatol.max(grtol * g0_inf)
}

/// Ring buffer of the last `m` curvature pairs `(s_k, y_k, rho_k)` shared by
/// [`lbfgs`] and [`bound`]. Pairs failing the curvature test
/// `s^T y > EPS_CURVATURE * ||s|| ||y||` are silently dropped rather than
/// admitted, since admitting them can make the recursion produce a
/// non-descent direction.
pub(crate) struct History {
    m: usize,
    s: std::collections::VecDeque<Vec<f64>>,
    y: std::collections::VecDeque<Vec<f64>>,
    rho: std::collections::VecDeque<f64>,
}

impl History {
    pub(crate) fn new(m: usize) -> Self {
        Self {
            m: m.max(1),
            s: std::collections::VecDeque::new(),
            y: std::collections::VecDeque::new(),
            rho: std::collections::VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.s.len()
    }

    pub(crate) fn clear(&mut self) {
        self.s.clear();
        self.y.clear();
        self.rho.clear();
    }

    /// Admits `(s, y)` if it passes the curvature test. Returns whether it
    /// was admitted.
    pub(crate) fn push(&mut self, s: Vec<f64>, y: Vec<f64>) -> bool {
        let sy: f64 = dot(&s, &y);
        let ns = norm(&s);
        let ny = norm(&y);
        if !(sy > crate::consts::EPS_CURVATURE * ns * ny) {
            return false;
        }
        if self.s.len() == self.m {
            self.s.pop_front();
            self.y.pop_front();
            self.rho.pop_front();
        }
        self.rho.push_back(1.0 / sy);
        self.s.push_back(s);
        self.y.push_back(y);
        true
    }

    /// The standard L-BFGS two-loop recursion (Nocedal & Wright, Algorithm
    /// 7.4): returns `-H_k grad`, the quasi-Newton descent direction.
    pub(crate) fn two_loop_direction(&self, grad: &[f64]) -> Vec<f64> {
        let n = grad.len();
        if self.s.is_empty() {
            return grad.iter().map(|&g| -g).collect();
        }
        let mut q = grad.to_vec();
        let k = self.s.len();
        let mut alpha = vec![0.0; k];
        for i in (0..k).rev() {
            let a = self.rho[i] * dot(&self.s[i], &q);
            alpha[i] = a;
            axpy(-a, &self.y[i], &mut q);
        }
        let (s_last, y_last) = (&self.s[k - 1], &self.y[k - 1]);
        let gamma = dot(s_last, y_last) / dot(y_last, y_last).max(f64::EPSILON);
        let mut r = vec![0.0; n];
        for i in 0..n {
            r[i] = gamma * q[i];
        }
        for i in 0..k {
            let beta = self.rho[i] * dot(&self.y[i], &r);
            axpy(alpha[i] - beta, &self.s[i], &mut r);
        }
        r.iter_mut().for_each(|v| *v = -*v);
        r
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `y += alpha * x`
pub(crate) fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

pub(crate) fn inf_norm(a: &[f64]) -> f64 {
    a.iter().fold(0.0f64, |m, &v| m.max(v.abs()))
}
