use crate::tensor::{Shape4, Tensor};
use crate::types::Element;

/// Checks if a tensor matches an expected shape and data within tolerance.
/// Panics with the first offending index otherwise.
pub fn check_tensor_near<T: Element>(actual: &Tensor<T>, expected_shape: Shape4, expected_data: &[T], tolerance: T) {
    assert_eq!(actual.shape(), expected_shape, "Shape mismatch");
    assert_eq!(
        actual.data().len(),
        expected_data.len(),
        "Data length mismatch"
    );
    for (i, (&a, &e)) in actual.data().iter().zip(expected_data).enumerate() {
        let diff = (a - e).abs();
        if diff > tolerance {
            panic!(
                "Data mismatch at index {}: actual={:?}, expected={:?}, diff={:?}, tolerance={:?}",
                i, a, e, diff, tolerance
            );
        }
    }
}

/// One-hot targets of shape `[labels.len(), classes, 1, 1]`.
pub fn one_hot<T: Element>(labels: &[usize], classes: usize) -> Tensor<T> {
    let mut target = Tensor::zeros([labels.len(), classes, 1, 1]);
    for (n, &label) in labels.iter().enumerate() {
        target.set(n, label, 0, 0, T::one());
    }
    target
}
