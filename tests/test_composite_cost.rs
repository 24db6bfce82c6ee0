use tipi_core::cost::{CompositeCost, DifferentiableCost, WeightedData};
use tipi_core::regularization::HyperbolicTotalVariation;
use tipi_core::shape::{Shape, ShapedVector};

#[test]
fn composite_cost_is_the_weighted_sum_of_its_terms() {
    let shape = Shape::new(&[4, 4]).unwrap();
    let data = ShapedVector::from_data(shape.clone(), vec![1.0; 16]).unwrap();
    let x_data = ShapedVector::from_data(shape.clone(), (0..16).map(|i| i as f64 * 0.1).collect()).unwrap();

    let mut data_cost = WeightedData::new_with_data(data);
    let mut prior = HyperbolicTotalVariation::<f64>::new(shape.clone(), 0.01, None).unwrap();

    let f_data = data_cost.evaluate(1.0, &x_data).unwrap();
    let f_prior = prior.evaluate(1.0, &x_data).unwrap();

    let mut composite = CompositeCost::new(shape.clone());
    composite.add_term(1.0, Box::new(data_cost)).unwrap();
    composite.add_term(0.5, Box::new(prior)).unwrap();
    let total = composite.evaluate(1.0, &x_data).unwrap();

    let expected = f_data + 0.5 * f_prior;
    assert!((total - expected).abs() < 1e-9, "total={total} expected={expected}");
}

#[test]
fn gradient_clears_exactly_once_across_terms() {
    let shape = Shape::new(&[3]).unwrap();
    let data = ShapedVector::from_data(shape.clone(), vec![0.0, 0.0, 0.0]).unwrap();
    let x = ShapedVector::from_data(shape.clone(), vec![1.0, 1.0, 1.0]).unwrap();

    let mut composite = CompositeCost::new(shape.clone());
    composite.add_term(1.0, Box::new(WeightedData::new_with_data(data.clone()))).unwrap();
    composite.add_term(1.0, Box::new(WeightedData::new_with_data(data))).unwrap();

    let mut g: ShapedVector<f64> = ShapedVector::from_data(shape, vec![99.0, 99.0, 99.0]).unwrap();
    composite.compute_cost_and_gradient(1.0, &x, &mut g, true).unwrap();
    // each term contributes grad_i = x_i - y_i = 1.0, summed twice = 2.0,
    // not polluted by the stale 99.0 seed.
    for &gi in g.as_slice() {
        assert!((gi - 2.0).abs() < 1e-9, "gi={gi}");
    }
}
