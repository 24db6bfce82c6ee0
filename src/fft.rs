//! In-place complex forward/backward DFT over an interleaved real/imaginary
//! buffer (component B). The primitive itself is treated as a black box per
//! spec: it performs unscaled transforms and leaves scaling to the caller
//! (the convolution operator bakes `1/Nw` into the MTF, see [`crate::conv`]).
//!
//! Multi-dimensional transforms are separable: a 1D DFT is applied along
//! each axis in turn, matching the column-major (first index fastest)
//! layout used throughout this crate (see [`crate::shape`]).

use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_ELEMENT_THRESHOLD;

/// Runs a 1D FFT plan along every line of `buf` parallel to axis `axis`,
/// where `buf` holds `dims.iter().product()` complex values in column-major
/// order.
fn transform_axis(buf: &mut [Complex<f64>], dims: &[i64], axis: usize, plan: &Arc<dyn Fft<f64>>) {
    let len = dims[axis] as usize;
    let mut stride = 1usize;
    for k in 0..axis {
        stride *= dims[k] as usize;
    }
    let block = stride * len;
    let total = buf.len();
    let n_lines = total / block * stride;

    fn gather(
        buf: &[Complex<f64>],
        stride: usize,
        block: usize,
        len: usize,
        line: usize,
    ) -> (usize, Vec<Complex<f64>>) {
        let block_idx = line / stride;
        let within = line % stride;
        let base = block_idx * block + within;
        let mut v = Vec::with_capacity(len);
        for i in 0..len {
            v.push(buf[base + i * stride]);
        }
        (base, v)
    }

    if n_lines >= PARALLEL_ELEMENT_THRESHOLD / len.max(1) {
        let results: Vec<(usize, Vec<Complex<f64>>)> = (0..n_lines)
            .into_par_iter()
            .map(|line| {
                let (base, mut v) = gather(buf, stride, block, len, line);
                plan.process(&mut v);
                (base, v)
            })
            .collect();
        for (base, v) in results {
            for (i, val) in v.into_iter().enumerate() {
                buf[base + i * stride] = val;
            }
        }
    } else {
        for line in 0..n_lines {
            let (base, mut v) = gather(buf, stride, block, len, line);
            plan.process(&mut v);
            for (i, val) in v.into_iter().enumerate() {
                buf[base + i * stride] = val;
            }
        }
    }
}

/// Forward complex DFT, in place, over every axis of `work_shape`. `buf` has
/// length `2 * product(work_shape)`, interleaved real/imaginary.
pub fn forward_inplace(buf: &mut [f64], work_shape: &[i64]) {
    transform_interleaved(buf, work_shape, true);
}

/// Backward (unscaled) complex DFT, in place, over every axis of `work_shape`.
pub fn backward_inplace(buf: &mut [f64], work_shape: &[i64]) {
    transform_interleaved(buf, work_shape, false);
}

fn transform_interleaved(buf: &mut [f64], work_shape: &[i64], forward: bool) {
    let nw: usize = work_shape.iter().map(|&d| d as usize).product();
    debug_assert_eq!(buf.len(), 2 * nw);

    let mut complex: Vec<Complex<f64>> = (0..nw)
        .map(|i| Complex::new(buf[2 * i], buf[2 * i + 1]))
        .collect();

    let mut planner = FftPlanner::new();
    for (axis, &dim) in work_shape.iter().enumerate() {
        let len = dim as usize;
        if len <= 1 {
            continue;
        }
        let plan = if forward {
            planner.plan_fft_forward(len)
        } else {
            planner.plan_fft_inverse(len)
        };
        transform_axis(&mut complex, work_shape, axis, &plan);
    }

    for (i, c) in complex.into_iter().enumerate() {
        buf[2 * i] = c.re;
        buf[2 * i + 1] = c.im;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_then_backward_is_identity_up_to_scale() {
        let shape = [4i64, 5];
        let nw: usize = shape.iter().map(|&d| d as usize).product();
        let mut buf: Vec<f64> = (0..nw).flat_map(|i| vec![(i as f64).sin(), 0.0]).collect();
        let original = buf.clone();

        forward_inplace(&mut buf, &shape);
        backward_inplace(&mut buf, &shape);

        let scale = nw as f64;
        for i in 0..buf.len() {
            assert!(
                (buf[i] / scale - original[i]).abs() < 1e-9,
                "mismatch at {i}: {} vs {}",
                buf[i] / scale,
                original[i]
            );
        }
    }

    #[test]
    fn dc_component_is_sum_of_inputs() {
        let shape = [8i64];
        let mut buf = vec![0.0f64; 16];
        for i in 0..8 {
            buf[2 * i] = 1.0;
        }
        forward_inplace(&mut buf, &shape);
        assert!((buf[0] - 8.0).abs() < 1e-9);
        assert!(buf[1].abs() < 1e-9);
    }
}
