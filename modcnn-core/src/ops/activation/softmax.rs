use crate::error::ModCnnError;
use crate::tensor::Tensor;
use crate::types::Element;

/// Per-sample softmax over all `c * h * w` values of each batch item.
///
/// This is the normalisation stage that sits between the graph output
/// (logits) and `CrossEntropyLoss`. The max is subtracted before
/// exponentiating so large logits do not overflow.
pub fn softmax<T: Element>(logits: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
    if logits.batch_size() == 0 {
        return Err(ModCnnError::EmptyBatch {
            operation: "softmax".to_string(),
        });
    }
    let sample_len = logits.sample_len();
    let mut out = Vec::with_capacity(logits.numel());
    for n in 0..logits.batch_size() {
        let row = logits.sample(n);
        let max = row.iter().fold(T::neg_infinity(), |acc, &x| acc.max(x));
        let exps: Vec<T> = row.iter().map(|&x| (x - max).exp()).collect();
        let sum: T = exps.iter().copied().sum();
        out.extend(exps.into_iter().map(|e| e / sum));
    }
    debug_assert_eq!(out.len(), logits.batch_size() * sample_len);
    Tensor::from_vec(out, logits.shape())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let logits = Tensor::from_vec(vec![1.0f64, 2.0, 3.0, 0.0, 0.0, 0.0], [2, 3, 1, 1]).unwrap();
        let probs = softmax(&logits).unwrap();
        let first: f64 = probs.sample(0).iter().sum();
        let second: f64 = probs.sample(1).iter().sum();
        assert_relative_eq!(first, 1.0, epsilon = 1e-12);
        assert_relative_eq!(second, 1.0, epsilon = 1e-12);
        assert_relative_eq!(probs.get(1, 0, 0, 0), 1.0 / 3.0, epsilon = 1e-12);
        assert!(probs.get(0, 2, 0, 0) > probs.get(0, 1, 0, 0));
    }

    #[test]
    fn test_softmax_large_logits_stay_finite() {
        let logits = Tensor::from_vec(vec![1000.0f32, 1000.0], [1, 2, 1, 1]).unwrap();
        let probs = softmax(&logits).unwrap();
        assert_relative_eq!(probs.get(0, 0, 0, 0), 0.5);
    }

    #[test]
    fn test_softmax_empty_batch() {
        let logits = Tensor::<f32>::zeros([0, 3, 1, 1]);
        assert!(matches!(softmax(&logits), Err(ModCnnError::EmptyBatch { .. })));
    }
}
