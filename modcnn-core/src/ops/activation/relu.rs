use crate::types::Element;

/// ReLU(x) = max(0, x)
#[inline]
pub fn relu<T: Element>(x: T) -> T {
    if x > T::zero() {
        x
    } else {
        T::zero()
    }
}

/// Zeroes every gradient whose forward value was not strictly positive.
///
/// `reference` is either the pre-activation or the post-activation buffer;
/// both are positive at exactly the same cells.
pub fn relu_mask_inplace<T: Element>(grad: &mut [T], reference: &[T]) {
    for (g, &r) in grad.iter_mut().zip(reference) {
        if r <= T::zero() {
            *g = T::zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_clamps_negative() {
        assert_eq!(relu(-1.0f32), 0.0);
        assert_eq!(relu(0.0f32), 0.0);
        assert_eq!(relu(2.5f64), 2.5);
    }

    #[test]
    fn test_relu_mask() {
        let mut grad = vec![1.0f32, 1.0, 1.0, 1.0];
        relu_mask_inplace(&mut grad, &[-1.0, 0.0, 0.5, 3.0]);
        assert_eq!(grad, vec![0.0, 0.0, 1.0, 1.0]);
    }
}
