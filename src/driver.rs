//! The deconvolution driver: binds the convolution operator, the
//! data-fidelity and regularization costs, and an optimizer into one `run`
//! call.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conv::Convolution;
use crate::cost::{CompositeCost, DifferentiableCost, WeightedConvolutionCost, WeightedData};
use crate::error::{Result, TipiError};
use crate::optim::bound::Bounds;
use crate::optim::{Blmvm, Lbfgs, OptimizerParams, OptimizerStatus};
use crate::regularization::HyperbolicTotalVariation;
use crate::scalar::Scalar;
use crate::shape::{best_fft_dim, Shape, ShapedVector};

/// Box constraints for the driver's configuration surface: plain finite
/// bounds, serialized as `[lower..]`/`[upper..]` rather than the
/// `Option<f64>`-per-side generality [`Bounds`] allows internally, since a
/// config file's box constraints are always fully specified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoxConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Driver configuration: groups every input a deconvolution run needs
/// behind one serializable struct so a caller can load a run from
/// JSON/TOML. The crate performs no file I/O itself; deserialize with
/// whatever format crate the caller prefers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeconvolutionConfig {
    /// Hyperbolic TV edge threshold; must be positive.
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// Regularization level `mu >= 0`; `0` disables the prior entirely.
    #[serde(default)]
    pub regularization: f64,
    /// Per-axis finite-difference scale for the prior; defaults to all-ones.
    #[serde(default)]
    pub delta: Option<Vec<f64>>,
    /// Object-space shape override; defaults to
    /// `best_fft_dim(data_dim + psf_dim - 1)` per axis.
    #[serde(default)]
    pub object_shape: Option<Vec<i64>>,
    /// Use `f32` internally when `true` and every input is representable;
    /// otherwise `f64`.
    #[serde(default)]
    pub single_precision: bool,
    #[serde(default)]
    pub bounds: Option<BoxConstraints>,
    /// L-BFGS/BLMVM memory size; `<= 0` maps to
    /// [`crate::consts::DEFAULT_MEMORY_SIZE`].
    #[serde(default)]
    pub memory_size: i64,
    #[serde(default)]
    pub gatol: f64,
    #[serde(default = "default_grtol")]
    pub grtol: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_eps() -> f64 {
    1e-3
}

fn default_grtol() -> f64 {
    1e-6
}

fn default_max_iterations() -> usize {
    500
}

impl Default for DeconvolutionConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            regularization: 0.0,
            delta: None,
            object_shape: None,
            single_precision: false,
            bounds: None,
            memory_size: 0,
            gatol: 0.0,
            grtol: default_grtol(),
            max_iterations: default_max_iterations(),
        }
    }
}

pub struct DeconvolutionOutcome {
    pub object: ShapedVector<f64>,
    pub status: OptimizerStatus,
    pub iterations: usize,
    pub evaluations: usize,
    pub final_cost: f64,
}

/// Binds data, PSF and configuration into a running optimization: selects
/// an element type and object shape, builds the operator and costs, picks
/// L-BFGS or BLMVM depending on whether box bounds are present, and runs it
/// to convergence.
pub struct SmoothInverseProblem;

impl SmoothInverseProblem {
    pub fn run(
        data: ShapedVector<f64>,
        psf: ShapedVector<f64>,
        weights: Option<ShapedVector<f64>>,
        config: &DeconvolutionConfig,
    ) -> Result<DeconvolutionOutcome> {
        if config.single_precision {
            Self::solve::<f32>(data, psf, weights, config)
        } else {
            Self::solve::<f64>(data, psf, weights, config)
        }
    }

    fn solve<T: Scalar>(
        data: ShapedVector<f64>,
        psf: ShapedVector<f64>,
        weights: Option<ShapedVector<f64>>,
        config: &DeconvolutionConfig,
    ) -> Result<DeconvolutionOutcome> {
        if data.shape().rank() != psf.shape().rank() {
            return Err(TipiError::ShapeMismatch {
                expected: data.shape().dims().to_vec(),
                got: psf.shape().dims().to_vec(),
            });
        }
        let rank = data.shape().rank();

        let object_shape = match &config.object_shape {
            Some(dims) => Shape::new(dims)?,
            None => {
                let dims: Vec<i64> = (0..rank)
                    .map(|k| best_fft_dim(data.shape().dim(k) + psf.shape().dim(k) - 1))
                    .collect();
                Shape::new(&dims)?
            }
        };

        debug!(?object_shape, "driver selected object shape");

        let mut conv = Convolution::<T>::build(None, object_shape.clone(), None, data.shape().clone(), None)?;
        conv.set_psf_array(&cast_into::<T>(&psf), None, false)?;

        let mut weighted_data = WeightedData::<T>::new_with_data(cast_into::<T>(&data));
        if let Some(w) = weights {
            weighted_data.set_weights(cast_into::<T>(&w))?;
        }

        let f_data = WeightedConvolutionCost::new(conv, weighted_data);

        let mut cost: Box<dyn DifferentiableCost<T>> = if config.regularization > 0.0 {
            let f_prior = HyperbolicTotalVariation::<T>::new(object_shape.clone(), config.eps, config.delta.clone())?;
            let mut composite = CompositeCost::new(object_shape.clone());
            composite.add_term(1.0, Box::new(f_data))?;
            composite.add_term(config.regularization, Box::new(f_prior))?;
            Box::new(composite)
        } else {
            Box::new(f_data)
        };

        let mut x = ShapedVector::<T>::zeros(object_shape.clone());

        let memory_size = if config.memory_size > 0 {
            config.memory_size as usize
        } else {
            crate::consts::DEFAULT_MEMORY_SIZE
        };
        let params = OptimizerParams {
            memory_size,
            max_iterations: config.max_iterations,
            gatol: config.gatol,
            grtol: config.grtol,
            ..OptimizerParams::default()
        };

        let result = match &config.bounds {
            Some(b) => {
                let bounds = Bounds::new(b.lower.clone(), b.upper.clone())?;
                info!(m = memory_size, "driver selected BLMVM for bound-constrained run");
                let blmvm = Blmvm::new(params, bounds);
                blmvm.minimize(cost.as_mut(), &mut x)?
            }
            None => {
                info!(m = memory_size, "driver selected unbounded L-BFGS");
                let lbfgs = Lbfgs::new(params);
                lbfgs.minimize(cost.as_mut(), &mut x)?
            }
        };

        Ok(DeconvolutionOutcome {
            object: cast_into::<f64>(&x),
            status: result.status,
            iterations: result.iterations,
            evaluations: result.evaluations,
            final_cost: result.final_cost,
        })
    }
}

fn cast_into<T: Scalar>(v: &ShapedVector<impl Scalar>) -> ShapedVector<T> {
    let data: Vec<T> = v
        .as_slice()
        .iter()
        .map(|x| T::from_f64(crate::scalar::Scalar::to_f64(*x)))
        .collect();
    ShapedVector::from_data(v.shape().clone(), data).expect("same length as source buffer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_data_through_an_identity_kernel_without_regularization() {
        let data_shape = Shape::new(&[8]).unwrap();
        let psf_shape = Shape::new(&[1]).unwrap();
        let psf = ShapedVector::from_data(psf_shape, vec![1.0]).unwrap();

        let mut truth = vec![0.2; 8];
        truth[3] = 5.0;
        let data = ShapedVector::from_data(data_shape, truth.clone()).unwrap();

        let config = DeconvolutionConfig {
            object_shape: Some(vec![8]),
            max_iterations: 200,
            grtol: 1e-10,
            ..DeconvolutionConfig::default()
        };
        let outcome = SmoothInverseProblem::run(data, psf, None, &config).unwrap();
        for (got, want) in outcome.object.as_slice().iter().zip(truth.iter()) {
            assert!((got - want).abs() < 1e-3, "got={got} want={want}");
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = DeconvolutionConfig {
            regularization: 0.1,
            ..DeconvolutionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DeconvolutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.regularization, 0.1);
    }
}
