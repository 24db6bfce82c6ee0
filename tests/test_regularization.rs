use tipi_core::cost::DifferentiableCost;
use tipi_core::regularization::HyperbolicTotalVariation;
use tipi_core::shape::{Shape, ShapedVector};

#[test]
fn constant_images_have_zero_prior_cost_at_every_supported_rank() {
    for dims in [vec![6], vec![4, 5], vec![3, 3, 3]] {
        let shape = Shape::new(&dims).unwrap();
        let mut htv = HyperbolicTotalVariation::<f64>::new(shape.clone(), 0.01, None).unwrap();
        let x = ShapedVector::from_data(shape, vec![2.5; dims.iter().product::<i64>() as usize]).unwrap();
        let cost = htv.evaluate(1.0, &x).unwrap();
        assert!(cost.abs() < 1e-10, "dims={dims:?} cost={cost}");
    }
}

#[test]
fn gradient_matches_a_central_finite_difference() {
    let shape = Shape::new(&[3, 3]).unwrap();
    let mut htv = HyperbolicTotalVariation::<f64>::new(shape.clone(), 0.05, None).unwrap();
    let x = ShapedVector::from_data(shape.clone(), vec![0.1, 0.4, 0.2, 0.9, 0.3, 0.6, 0.2, 0.8, 0.5]).unwrap();

    let mut g = ShapedVector::zeros(shape.clone());
    htv.compute_cost_and_gradient(1.0, &x, &mut g, true).unwrap();

    let h = 1e-6;
    for i in 0..9 {
        let mut xp = x.clone();
        xp.as_mut_slice()[i] += h;
        let mut xm = x.clone();
        xm.as_mut_slice()[i] -= h;
        let fp = htv.evaluate(1.0, &xp).unwrap();
        let fm = htv.evaluate(1.0, &xm).unwrap();
        let numeric = (fp - fm) / (2.0 * h);
        let analytic = g.as_slice()[i];
        assert!(
            (numeric - analytic).abs() < 1e-4,
            "component {i}: numeric={numeric} analytic={analytic}"
        );
    }
}

#[test]
fn rejects_nonpositive_edge_threshold() {
    let shape = Shape::new(&[4]).unwrap();
    assert!(HyperbolicTotalVariation::<f64>::new(shape, 0.0, None).is_err());
}
