use tipi_core::cost::{DifferentiableCost, WeightedData};
use tipi_core::shape::{Shape, ShapedVector};

#[test]
fn nan_datum_is_masked_and_zeroed_on_finalize() {
    let shape = Shape::new(&[4]).unwrap();
    let data = ShapedVector::from_data(shape, vec![1.0, f64::NAN, 3.0, 4.0]).unwrap();
    let mut wd = WeightedData::new_with_data(data);
    wd.mark_bad_data(&[false, true, false, false]).unwrap();

    let n_valid = wd.n_valid().unwrap();
    assert_eq!(n_valid, 3, "n_valid = {n_valid}");

    let data = wd.data().unwrap();
    assert_eq!(data[1], 0.0, "masked datum should read 0, got {}", data[1]);

    let weights = wd.weights().unwrap();
    assert_eq!(weights[1], 0.0, "masked weight should be 0, got {}", weights[1]);
}

#[test]
fn cost_at_the_data_point_is_zero() {
    let shape = Shape::new(&[3]).unwrap();
    let data = ShapedVector::from_data(shape.clone(), vec![1.0, 2.0, 3.0]).unwrap();
    let mut wd = WeightedData::new_with_data(data.clone());
    let cost = wd.evaluate(1.0, &data).unwrap();
    assert!(cost.abs() < 1e-12, "cost = {cost}");
}

#[test]
fn rejects_finite_weight_on_nonfinite_data() {
    let shape = Shape::new(&[2]).unwrap();
    let data = ShapedVector::from_data(shape, vec![f64::NAN, 1.0]).unwrap();
    let mut wd = WeightedData::new_with_data(data);
    assert!(wd.data().is_err(), "expected an error: positive weight on NaN data is inconsistent");
}

#[test]
fn weights_derived_from_data_are_nonnegative() {
    let shape = Shape::new(&[3]).unwrap();
    let data = ShapedVector::from_data(shape, vec![-1.0, 0.0, 4.0]).unwrap();
    let mut wd = WeightedData::new_with_data(data);
    wd.compute_weights_from_data(1.0, 1.0).unwrap();
    let weights = wd.weights().unwrap();
    for &w in weights {
        assert!(w >= 0.0, "weight {w} is negative");
    }
}
