use tipi_core::conv::{Convolution, Job};
use tipi_core::shape::{Shape, ShapedVector};

fn delta_at(len: usize, center: usize) -> ShapedVector<f64> {
    let mut v = vec![0.0; len];
    v[center] = 1.0;
    ShapedVector::from_data(Shape::new(&[len as i64]).unwrap(), v).unwrap()
}

#[test]
fn identity_psf_leaves_the_signal_unchanged() {
    let shape = Shape::new(&[8]).unwrap();
    let mut conv = Convolution::<f64>::build(None, shape.clone(), None, shape.clone(), None).unwrap();
    conv.set_psf(&delta_at(8, 0)).unwrap();

    let x = ShapedVector::from_data(shape.clone(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
    let mut y = ShapedVector::zeros(shape);
    conv.apply(&mut y, &x, Job::Direct).unwrap();

    for (got, want) in y.as_slice().iter().zip(x.as_slice().iter()) {
        assert!((got - want).abs() < 1e-9, "got={got} want={want}");
    }
}

#[test]
fn adjoint_matches_the_direct_operator_under_the_inner_product() {
    let shape = Shape::new(&[8]).unwrap();
    let mut conv = Convolution::<f64>::build(None, shape.clone(), None, shape.clone(), None).unwrap();
    // an asymmetric PSF so adjoint != direct unless the bookkeeping is right
    let mut psf = vec![0.0; 8];
    psf[0] = 0.5;
    psf[1] = 0.3;
    psf[2] = 0.2;
    conv.set_psf(&ShapedVector::from_data(shape.clone(), psf).unwrap()).unwrap();

    let x = delta_at(8, 0);
    let b = delta_at(8, 0);

    let mut hx = ShapedVector::zeros(shape.clone());
    conv.apply(&mut hx, &x, Job::Direct).unwrap();
    let lhs: f64 = hx.as_slice().iter().zip(b.as_slice().iter()).map(|(&a, &b)| a * b).sum();

    let mut hadj_b = ShapedVector::zeros(shape);
    conv.apply(&mut hadj_b, &b, Job::Adjoint).unwrap();
    let rhs: f64 = x.as_slice().iter().zip(hadj_b.as_slice().iter()).map(|(&a, &b)| a * b).sum();

    assert!((lhs - rhs).abs() < 1e-9, "<Hx,b>={lhs} <x,H*b>={rhs}");
}

#[test]
fn apply_without_a_psf_reports_not_configured() {
    let shape = Shape::new(&[4]).unwrap();
    let mut conv = Convolution::<f64>::build(None, shape.clone(), None, shape.clone(), None).unwrap();
    let x = ShapedVector::zeros(shape.clone());
    let mut y = ShapedVector::zeros(shape);
    assert!(conv.apply(&mut y, &x, Job::Direct).is_err());
}
