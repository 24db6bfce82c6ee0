//! Cyclic zero-padded convolution operator (component C): `H = R F* D F S`,
//! and its adjoint `S* F* D* F R*`.
//!
//! The operator owns a work-shape-sized interleaved complex workspace and
//! the MTF derived from the PSF, both reused across [`Convolution::apply`]
//! calls. Instances are not thread-safe: the workspace is mutated by
//! `push`, `convolve` and `pull`, so concurrent applies on one instance
//! would race. Distinct instances in distinct threads are fine.

use tracing::debug;

use crate::error::{Result, TipiError};
use crate::fft;
use crate::rank::{flatten, unflatten, Rank};
use crate::scalar::Scalar;
use crate::shape::{best_fft_dim, Shape, ShapedVector};

/// Which direction [`Convolution::apply`] (and its constituent push/convolve/pull
/// calls) should run: the forward model or its adjoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Job {
    Direct,
    Adjoint,
}

pub struct Convolution<T: Scalar> {
    input_shape: Shape,
    output_shape: Shape,
    work_shape: Vec<i64>,
    inp_off: Vec<i64>,
    out_off: Vec<i64>,
    input_is_full: bool,
    output_is_full: bool,
    #[allow(dead_code)]
    rank: Rank,
    /// Interleaved complex, length `2 * Nw`, `1/Nw`-scaled. `None` until
    /// [`Convolution::set_psf`]/[`Convolution::set_psf_array`] is called.
    mtf: Option<Vec<f64>>,
    /// Interleaved complex, length `2 * Nw`, reused across applies.
    workspace: Vec<f64>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> Convolution<T> {
    /// Builds an operator binding `input_space` and `output_space` into a
    /// common `work_shape` (auto-chosen via [`best_fft_dim`] when absent),
    /// with each region centered in the work domain by default.
    pub fn build(
        work_shape: Option<Vec<i64>>,
        input_space: Shape,
        inp_off: Option<Vec<i64>>,
        output_space: Shape,
        out_off: Option<Vec<i64>>,
    ) -> Result<Self> {
        if input_space.rank() != output_space.rank() {
            return Err(TipiError::ShapeMismatch {
                expected: input_space.dims().to_vec(),
                got: output_space.dims().to_vec(),
            });
        }
        let rank = Rank::from_shape(&input_space, "Convolution")?;
        let r = input_space.rank();

        let work_shape = match work_shape {
            Some(w) => {
                if w.len() != r {
                    return Err(TipiError::ShapeMismatch {
                        expected: input_space.dims().to_vec(),
                        got: w,
                    });
                }
                w
            }
            None => (0..r)
                .map(|k| best_fft_dim(input_space.dim(k).max(output_space.dim(k))))
                .collect(),
        };

        for k in 0..r {
            let need = input_space.dim(k).max(output_space.dim(k));
            if work_shape[k] < need {
                return Err(TipiError::InvalidArgument(format!(
                    "work_shape[{k}]={} is smaller than max(input,output)={need}",
                    work_shape[k]
                )));
            }
        }

        let inp_off = resolve_offset(inp_off, &work_shape, input_space.dims())?;
        let out_off = resolve_offset(out_off, &work_shape, output_space.dims())?;

        let nw: i64 = work_shape.iter().product();
        let nw_usize = usize::try_from(nw)
            .ok()
            .filter(|&n| n.checked_mul(2).is_some())
            .ok_or_else(|| {
                TipiError::NumericalOverflow(format!("work shape {work_shape:?} is too large"))
            })?;

        let input_is_full = input_space.dims() == work_shape.as_slice();
        let output_is_full = output_space.dims() == work_shape.as_slice();

        debug!(?work_shape, nw, "built convolution operator");

        Ok(Self {
            input_shape: input_space,
            output_shape: output_space,
            work_shape,
            inp_off,
            out_off,
            input_is_full,
            output_is_full,
            rank,
            mtf: None,
            workspace: vec![0.0; 2 * nw_usize],
            _marker: std::marker::PhantomData,
        })
    }

    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    pub fn work_shape(&self) -> &[i64] {
        &self.work_shape
    }

    fn nw(&self) -> usize {
        self.workspace.len() / 2
    }

    /// Sets the PSF from a vector already living in the input space and
    /// already in FFT-centered layout (index 0 of every axis holds the
    /// PSF's designated center).
    pub fn set_psf(&mut self, psf: &ShapedVector<T>) -> Result<()> {
        require_same_shape(psf.shape(), &self.input_shape)?;
        let values: Vec<f64> = psf.as_slice().iter().map(|&v| v.to_f64()).collect();
        self.compute_mtf(&values, self.input_shape.dims().to_vec(), &vec![0i64; self.work_shape.len()])
    }

    /// Sets the PSF from an arbitrary-shape array, zero-padding to
    /// `work_shape` and circularly shifting the logical center
    /// (`center_off`, default `dim/2` per axis) to index 0. If `normalize`,
    /// divides by the sum of PSF values first.
    pub fn set_psf_array(
        &mut self,
        psf: &ShapedVector<T>,
        center_off: Option<Vec<i64>>,
        normalize: bool,
    ) -> Result<()> {
        if psf.shape().rank() != self.work_shape.len() {
            return Err(TipiError::ShapeMismatch {
                expected: self.work_shape.clone(),
                got: psf.shape().dims().to_vec(),
            });
        }
        let mut values: Vec<f64> = psf.as_slice().iter().map(|&v| v.to_f64()).collect();
        if normalize {
            let sum: f64 = values.iter().sum();
            if sum != 0.0 {
                for v in values.iter_mut() {
                    *v /= sum;
                }
            }
        }
        let center = match center_off {
            Some(c) => c,
            None => psf.shape().dims().iter().map(|&d| d / 2).collect(),
        };
        self.compute_mtf(&values, psf.shape().dims().to_vec(), &center)
    }

    fn compute_mtf(&mut self, values: &[f64], src_dims: Vec<i64>, center: &[i64]) -> Result<()> {
        for k in 0..src_dims.len() {
            if src_dims[k] > self.work_shape[k] {
                return Err(TipiError::InvalidArgument(format!(
                    "PSF dimension {k}={} exceeds work_shape[{k}]={}",
                    src_dims[k], self.work_shape[k]
                )));
            }
        }
        let nw = self.nw();
        let mut buf = vec![0.0f64; 2 * nw];
        for flat in 0..values.len() as i64 {
            let idx = unflatten(flat, &src_dims);
            let mut dest_idx = vec![0i64; idx.len()];
            for k in 0..idx.len() {
                dest_idx[k] = (idx[k] - center[k]).rem_euclid(self.work_shape[k]);
            }
            let dest = flatten(&dest_idx, &self.work_shape) as usize;
            buf[2 * dest] = values[flat as usize];
        }
        fft::forward_inplace(&mut buf, &self.work_shape);
        let scale = 1.0 / nw as f64;
        for v in buf.iter_mut() {
            *v *= scale;
        }
        debug!("computed MTF");
        self.mtf = Some(buf);
        Ok(())
    }

    fn ensure_mtf(&self) -> Result<()> {
        if self.mtf.is_none() {
            return Err(TipiError::NotConfigured { what: "PSF/MTF" });
        }
        Ok(())
    }

    /// Copies `src` into the work buffer's real parts, zeroing the
    /// imaginary parts and any padding cells. `adjoint=false` places the
    /// input-space source at `inp_off`; `adjoint=true` places the
    /// output-space source at `out_off`.
    pub fn push(&mut self, src: &ShapedVector<T>, adjoint: bool) -> Result<()> {
        self.ensure_mtf()?;
        let (region_dims, off, expected, is_full) = if adjoint {
            (
                self.output_shape.dims().to_vec(),
                self.out_off.clone(),
                &self.output_shape,
                self.output_is_full,
            )
        } else {
            (
                self.input_shape.dims().to_vec(),
                self.inp_off.clone(),
                &self.input_shape,
                self.input_is_full,
            )
        };
        require_same_shape(src.shape(), expected)?;

        if is_full {
            for (i, &v) in src.as_slice().iter().enumerate() {
                self.workspace[2 * i] = v.to_f64();
                self.workspace[2 * i + 1] = 0.0;
            }
        } else {
            self.workspace.iter_mut().for_each(|v| *v = 0.0);
            for (flat, &v) in src.as_slice().iter().enumerate() {
                let idx = unflatten(flat as i64, &region_dims);
                let mut dest_idx = vec![0i64; idx.len()];
                for k in 0..idx.len() {
                    dest_idx[k] = idx[k] + off[k];
                }
                let dest = flatten(&dest_idx, &self.work_shape) as usize;
                self.workspace[2 * dest] = v.to_f64();
            }
        }
        Ok(())
    }

    /// Forward FFT, pointwise multiply by the MTF (conjugated if
    /// `adjoint`), inverse FFT. The `1/Nw` scaling baked into the MTF means
    /// no extra scaling step is needed here.
    pub fn convolve(&mut self, adjoint: bool) -> Result<()> {
        self.ensure_mtf()?;
        fft::forward_inplace(&mut self.workspace, &self.work_shape);

        let mtf = self.mtf.as_ref().unwrap();
        let nw = self.nw();
        for i in 0..nw {
            let (wr, wi) = (self.workspace[2 * i], self.workspace[2 * i + 1]);
            let (mr, mi) = if adjoint {
                (mtf[2 * i], -mtf[2 * i + 1])
            } else {
                (mtf[2 * i], mtf[2 * i + 1])
            };
            self.workspace[2 * i] = wr * mr - wi * mi;
            self.workspace[2 * i + 1] = wr * mi + wi * mr;
        }

        fft::backward_inplace(&mut self.workspace, &self.work_shape);
        Ok(())
    }

    /// Copies the real parts from the work buffer's selected region into
    /// `dst`. `adjoint=false` reads from `out_off`; `adjoint=true` reads
    /// from `inp_off`.
    pub fn pull(&mut self, dst: &mut ShapedVector<T>, adjoint: bool) -> Result<()> {
        self.ensure_mtf()?;
        let (region_dims, off, expected) = if adjoint {
            (self.input_shape.dims().to_vec(), self.inp_off.clone(), &self.input_shape)
        } else {
            (self.output_shape.dims().to_vec(), self.out_off.clone(), &self.output_shape)
        };
        require_same_shape(dst.shape(), expected)?;

        let region_count = region_dims.iter().product::<i64>() as usize;
        let out = dst.as_mut_slice();
        for flat in 0..region_count {
            let idx = unflatten(flat as i64, &region_dims);
            let mut src_idx = vec![0i64; idx.len()];
            for k in 0..idx.len() {
                src_idx[k] = idx[k] + off[k];
            }
            let src = flatten(&src_idx, &self.work_shape) as usize;
            out[flat] = T::from_f64(self.workspace[2 * src]);
        }
        Ok(())
    }

    /// `push -> convolve -> pull` with the matching adjoint flag for `job`.
    pub fn apply(&mut self, dst: &mut ShapedVector<T>, src: &ShapedVector<T>, job: Job) -> Result<()> {
        let adjoint = job == Job::Adjoint;
        self.push(src, adjoint)?;
        self.convolve(adjoint)?;
        self.pull(dst, adjoint)
    }
}

fn resolve_offset(off: Option<Vec<i64>>, work_shape: &[i64], region_dims: &[i64]) -> Result<Vec<i64>> {
    let off = match off {
        Some(o) => o,
        None => (0..work_shape.len())
            .map(|k| (work_shape[k] - region_dims[k]) / 2)
            .collect(),
    };
    for k in 0..work_shape.len() {
        let max = work_shape[k] - region_dims[k];
        if off[k] < 0 || off[k] > max {
            return Err(TipiError::BadOffset {
                axis: k,
                offset: off[k],
                max,
            });
        }
    }
    Ok(off)
}

fn require_same_shape(got: &Shape, expected: &Shape) -> Result<()> {
    if got != expected {
        return Err(TipiError::ShapeMismatch {
            expected: expected.dims().to_vec(),
            got: got.dims().to_vec(),
        });
    }
    Ok(())
}
