use tipi_core::conv::{Convolution, Job};
use tipi_core::cost::{DifferentiableCost, WeightedConvolutionCost, WeightedData};
use tipi_core::optim::{Lbfgs, OptimizerParams, OptimizerStatus};
use tipi_core::shape::{Shape, ShapedVector};

fn gaussian_stamp(sigma: f64) -> ShapedVector<f64> {
    // 3x3 Gaussian PSF centered at (1,1), summing to 1.
    let mut v = vec![0.0; 9];
    let mut sum = 0.0;
    for j in 0..3i64 {
        for i in 0..3i64 {
            let di = (i - 1) as f64;
            let dj = (j - 1) as f64;
            let w = (-(di * di + dj * dj) / (2.0 * sigma * sigma)).exp();
            v[(i + j * 3) as usize] = w;
            sum += w;
        }
    }
    for w in v.iter_mut() {
        *w /= sum;
    }
    ShapedVector::from_data(Shape::new(&[3, 3]).unwrap(), v).unwrap()
}

#[test]
fn lbfgs_recovers_the_true_object_from_noiseless_blurred_data() {
    let shape = Shape::new(&[4, 4]).unwrap();
    let mut conv = Convolution::<f64>::build(None, shape.clone(), None, shape.clone(), None).unwrap();
    conv.set_psf_array(&gaussian_stamp(0.8), None, false).unwrap();

    let x_true = ShapedVector::from_data(
        shape.clone(),
        vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ],
    )
    .unwrap();

    let mut data = ShapedVector::zeros(shape.clone());
    conv.apply(&mut data, &x_true, Job::Direct).unwrap();

    let weighted_data = WeightedData::new_with_data(data);
    let mut cost = WeightedConvolutionCost::new(conv, weighted_data);

    let mut x = ShapedVector::zeros(shape);
    let params = OptimizerParams {
        max_iterations: 50,
        gatol: 1e-9,
        grtol: 0.0,
        ..OptimizerParams::default()
    };
    let lbfgs = Lbfgs::new(params);
    let result = lbfgs.minimize(&mut cost, &mut x).unwrap();

    assert_eq!(result.status, OptimizerStatus::Converged, "iterations={}", result.iterations);
    assert!(result.iterations <= 50, "took {} iterations", result.iterations);

    let mut max_err = 0.0f64;
    for (got, want) in x.as_slice().iter().zip(x_true.as_slice().iter()) {
        max_err = max_err.max((got - want).abs());
    }
    assert!(max_err < 1e-4, "max component error = {max_err}");
}
