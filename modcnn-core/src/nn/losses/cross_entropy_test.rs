use super::*;
use approx::assert_relative_eq;

fn pred_target() -> (Tensor<f64>, Tensor<f64>) {
    let pred = Tensor::from_vec(vec![0.7, 0.2, 0.1], [1, 3, 1, 1]).unwrap();
    let target = Tensor::from_vec(vec![1.0, 0.0, 0.0], [1, 3, 1, 1]).unwrap();
    (pred, target)
}

#[test]
fn test_forward_single_sample() {
    let (pred, target) = pred_target();
    let loss = CrossEntropyLoss::new(Reduction::Mean).forward(&pred, &target).unwrap();
    assert_relative_eq!(loss, -(0.7f64).ln(), epsilon = 1e-12);
}

#[test]
fn test_backward_single_sample() {
    let (mut pred, target) = pred_target();
    CrossEntropyLoss::default().backward(&mut pred, &target).unwrap();
    assert_relative_eq!(pred.grad()[0], 0.7 - 1.0, epsilon = 1e-12);
    assert_relative_eq!(pred.grad()[1], 0.2, epsilon = 1e-12);
    assert_relative_eq!(pred.grad()[2], 0.1, epsilon = 1e-12);
    // data untouched
    assert_eq!(pred.data(), &[0.7, 0.2, 0.1]);
}

#[test]
fn test_mean_and_sum_reduction() {
    let pred = Tensor::from_vec(vec![0.5, 0.5, 0.25, 0.75], [2, 2, 1, 1]).unwrap();
    let target = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], [2, 2, 1, 1]).unwrap();
    let total = -(0.5f64.ln() + 0.75f64.ln());

    let sum = CrossEntropyLoss::new(Reduction::Sum).forward(&pred, &target).unwrap();
    let mean = CrossEntropyLoss::new(Reduction::Mean).forward(&pred, &target).unwrap();
    assert_relative_eq!(sum, total, epsilon = 1e-12);
    assert_relative_eq!(mean, total / 2.0, epsilon = 1e-12);

    let mut p = pred.clone();
    CrossEntropyLoss::new(Reduction::Mean).backward(&mut p, &target).unwrap();
    assert_relative_eq!(p.grad()[0], (0.5 - 1.0) / 2.0, epsilon = 1e-12);
    let mut p = pred;
    CrossEntropyLoss::new(Reduction::Sum).backward(&mut p, &target).unwrap();
    assert_relative_eq!(p.grad()[3], 0.75 - 1.0, epsilon = 1e-12);
}

#[test]
fn test_zero_probability_is_clamped() {
    let pred = Tensor::from_vec(vec![0.0f64, 1.0], [1, 2, 1, 1]).unwrap();
    let target = Tensor::from_vec(vec![1.0, 0.0], [1, 2, 1, 1]).unwrap();
    let loss = CrossEntropyLoss::default().forward(&pred, &target).unwrap();
    assert!(loss.is_finite());
    assert_relative_eq!(loss, -(1e-15f64).ln(), epsilon = 1e-9);
}

#[test]
fn test_shape_mismatch() {
    let (pred, _) = pred_target();
    let target = Tensor::<f64>::zeros([1, 2, 1, 1]);
    assert!(matches!(
        CrossEntropyLoss::default().forward(&pred, &target),
        Err(ModCnnError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_empty_batch() {
    let pred = Tensor::<f32>::zeros([0, 3, 1, 1]);
    let target = Tensor::<f32>::zeros([0, 3, 1, 1]);
    assert!(matches!(
        CrossEntropyLoss::default().forward(&pred, &target),
        Err(ModCnnError::EmptyBatch { .. })
    ));
}

#[test]
fn test_reduction_from_str() {
    assert_eq!(Reduction::from_str("MEAN").unwrap(), Reduction::Mean);
    assert_eq!(Reduction::from_str("sum").unwrap(), Reduction::Sum);
    assert!(matches!(
        Reduction::from_str("none"),
        Err(ModCnnError::ConfigurationError(_))
    ));
}
