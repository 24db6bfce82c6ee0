//! Hyperbolic total-variation regularizer (component F): a smooth, convex,
//! edge-preserving prior evaluated on 2x2(x2) sliding blocks (rank 2/3) or
//! consecutive pairs (rank 1).

use crate::cost::{clear_or_noop, DifferentiableCost};
use crate::error::{Result, TipiError};
use crate::rank::Rank;
use crate::scalar::Scalar;
use crate::shape::{Shape, ShapedVector};

pub struct HyperbolicTotalVariation<T: Scalar> {
    shape: Shape,
    rank: Rank,
    eps: f64,
    delta: Vec<f64>,
    weights: Vec<f64>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> HyperbolicTotalVariation<T> {
    /// `eps` must be strictly positive; `delta` defaults to all-ones and
    /// must otherwise be strictly positive per axis.
    pub fn new(shape: Shape, eps: f64, delta: Option<Vec<f64>>) -> Result<Self> {
        if !(eps > 0.0) || !eps.is_finite() {
            return Err(TipiError::InvalidArgument(format!(
                "edge threshold eps must be finite and positive, got {eps}"
            )));
        }
        let rank = Rank::from_shape(&shape, "HyperbolicTotalVariation")?;
        let delta = delta.unwrap_or_else(|| vec![crate::consts::DEFAULT_REGULARIZATION_SCALE; shape.rank()]);
        if delta.len() != shape.rank() {
            return Err(TipiError::InvalidArgument(format!(
                "delta has {} entries, expected {}",
                delta.len(),
                shape.rank()
            )));
        }
        for &d in &delta {
            if !(d > 0.0) || !d.is_finite() {
                return Err(TipiError::InvalidArgument(format!(
                    "scale delta must be finite and positive, got {d}"
                )));
            }
        }

        let divisor = match rank {
            Rank::One | Rank::Two => 2.0,
            Rank::Three => 4.0,
        };
        let weights = delta.iter().map(|&d| 1.0 / (divisor * d * d)).collect();

        Ok(Self {
            shape,
            rank,
            eps,
            delta,
            weights,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn delta(&self) -> &[f64] {
        &self.delta
    }

    /// Evaluates `alpha * f(x)`, optionally accumulating `alpha * grad f(x)`
    /// into `grad` (caller-owned f64 scratch, zeroed by the caller first).
    fn run(&self, alpha: f64, x: &[T], grad: Option<&mut [f64]>) -> f64 {
        let dims = self.shape.dims();
        let cost = match self.rank {
            Rank::One => eval_rank1(dims[0], self.eps, self.weights[0], alpha, x, grad),
            Rank::Two => eval_rank2(dims, self.eps, &self.weights, alpha, x, grad),
            Rank::Three => eval_rank3(dims, self.eps, &self.weights, alpha, x, grad),
        };
        alpha * cost
    }
}

impl<T: Scalar> DifferentiableCost<T> for HyperbolicTotalVariation<T> {
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
        Ok(self.run(alpha, x.as_slice(), None))
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
        let mut accum = vec![0.0f64; g.as_slice().len()];
        let cost = self.run(alpha, x.as_slice(), Some(&mut accum));
        if clear {
            for (gi, &a) in g.as_mut_slice().iter_mut().zip(accum.iter()) {
                *gi = T::from_f64(a);
            }
        } else {
            for (gi, &a) in g.as_mut_slice().iter_mut().zip(accum.iter()) {
                *gi = *gi + T::from_f64(a);
            }
        }
        Ok(cost)
    }
}

fn eval_rank1<T: Scalar>(d0: i64, eps: f64, w: f64, alpha: f64, x: &[T], grad: Option<&mut [f64]>) -> f64 {
    let mut sum_r = 0.0f64;
    let mut grad = grad;
    for i in 0..(d0 - 1) as usize {
        let x1 = x[i].to_f64();
        let x2 = x[i + 1].to_f64();
        let y = x2 - x1;
        let r = (w * y * y + eps * eps).sqrt();
        sum_r += r;
        if let Some(g) = grad.as_deref_mut() {
            let p = alpha / r;
            let contrib = w * p * y;
            g[i] -= contrib;
            g[i + 1] += contrib;
        }
    }
    let bias = (d0 - 1) as f64 * eps;
    (sum_r - bias).max(0.0)
}

fn eval_rank2<T: Scalar>(
    dims: &[i64],
    eps: f64,
    w: &[f64],
    alpha: f64,
    x: &[T],
    grad: Option<&mut [f64]>,
) -> f64 {
    let (d1, d2) = (dims[0], dims[1]);
    let idx = |i: i64, j: i64| (i + j * d1) as usize;
    let mut sum_r = 0.0f64;
    let mut grad = grad;
    for j in 0..(d2 - 1) {
        for i in 0..(d1 - 1) {
            let j1 = idx(i, j);
            let j2 = idx(i + 1, j);
            let j3 = idx(i, j + 1);
            let j4 = idx(i + 1, j + 1);
            let (x1, x2, x3, x4) = (x[j1].to_f64(), x[j2].to_f64(), x[j3].to_f64(), x[j4].to_f64());
            let y21 = x2 - x1;
            let y43 = x4 - x3;
            let y31 = x3 - x1;
            let y42 = x4 - x2;
            let r = (w[0] * (y21 * y21 + y43 * y43) + w[1] * (y31 * y31 + y42 * y42) + eps * eps).sqrt();
            sum_r += r;
            if let Some(g) = grad.as_deref_mut() {
                let p = alpha / r;
                let p1 = w[0] * p;
                let p2 = w[1] * p;
                g[j1] -= p1 * y21 + p2 * y31;
                g[j2] += p1 * y21 - p2 * y42;
                g[j3] -= p1 * y43 - p2 * y31;
                g[j4] += p1 * y43 + p2 * y42;
            }
        }
    }
    let bias = (d1 - 1) as f64 * (d2 - 1) as f64 * eps;
    (sum_r - bias).max(0.0)
}

fn eval_rank3<T: Scalar>(
    dims: &[i64],
    eps: f64,
    w: &[f64],
    alpha: f64,
    x: &[T],
    grad: Option<&mut [f64]>,
) -> f64 {
    let (d1, d2, d3) = (dims[0], dims[1], dims[2]);
    let idx = |i: i64, j: i64, k: i64| (i + j * d1 + k * d1 * d2) as usize;
    let mut sum_r = 0.0f64;
    let mut grad = grad;
    for k in 0..(d3 - 1) {
        for j in 0..(d2 - 1) {
            for i in 0..(d1 - 1) {
                // Corners c[a][b][c] at (i+a, j+b, k+c).
                let c000 = idx(i, j, k);
                let c100 = idx(i + 1, j, k);
                let c010 = idx(i, j + 1, k);
                let c110 = idx(i + 1, j + 1, k);
                let c001 = idx(i, j, k + 1);
                let c101 = idx(i + 1, j, k + 1);
                let c011 = idx(i, j + 1, k + 1);
                let c111 = idx(i + 1, j + 1, k + 1);
                let v = |idx: usize| x[idx].to_f64();

                let e0 = [(c000, c100), (c010, c110), (c001, c101), (c011, c111)];
                let e1 = [(c000, c010), (c100, c110), (c001, c011), (c101, c111)];
                let e2 = [(c000, c001), (c100, c101), (c010, c011), (c110, c111)];

                let diffs_of = |edges: &[(usize, usize); 4]| -> [f64; 4] {
                    let mut d = [0.0; 4];
                    for (n, &(lo, hi)) in edges.iter().enumerate() {
                        d[n] = v(hi) - v(lo);
                    }
                    d
                };
                let d0 = diffs_of(&e0);
                let d1v = diffs_of(&e1);
                let d2v = diffs_of(&e2);
                let sq0: f64 = d0.iter().map(|v| v * v).sum();
                let sq1: f64 = d1v.iter().map(|v| v * v).sum();
                let sq2: f64 = d2v.iter().map(|v| v * v).sum();

                let r = (w[0] * sq0 + w[1] * sq1 + w[2] * sq2 + eps * eps).sqrt();
                sum_r += r;

                if let Some(g) = grad.as_deref_mut() {
                    let p = alpha / r;
                    let mut apply = |edges: &[(usize, usize); 4], diffs: &[f64; 4], wk: f64, g: &mut [f64]| {
                        for (n, &(lo, hi)) in edges.iter().enumerate() {
                            let contrib = wk * p * diffs[n];
                            g[lo] -= contrib;
                            g[hi] += contrib;
                        }
                    };
                    apply(&e0, &d0, w[0], g);
                    apply(&e1, &d1v, w[1], g);
                    apply(&e2, &d2v, w[2], g);
                }
            }
        }
    }
    let bias = (d1 - 1) as f64 * (d2 - 1) as f64 * (d3 - 1) as f64 * eps;
    (sum_r - bias).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_image_has_zero_cost_rank2() {
        let shape = Shape::new(&[5, 5]).unwrap();
        let mut htv = HyperbolicTotalVariation::<f64>::new(shape.clone(), 0.01, None).unwrap();
        let x = ShapedVector::from_data(shape, vec![7.0; 25]).unwrap();
        let cost = htv.evaluate(1.0, &x).unwrap();
        assert!(cost.abs() < 1e-12, "cost = {cost}");
    }
}
