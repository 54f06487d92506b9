use crate::error::ModCnnError;
use crate::tensor::Tensor;
use crate::types::Element;

/// Probabilities below this are clamped before taking the logarithm.
pub const PROBABILITY_FLOOR: f64 = 1e-15;

/// Specifies the reduction to apply over the batch: 'mean' | 'sum'
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
}

impl Reduction {
    pub fn from_str(s: &str) -> Result<Self, ModCnnError> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            _ => Err(ModCnnError::ConfigurationError(format!(
                "Unsupported reduction type: {}",
                s
            ))),
        }
    }
}

/// Cross-entropy between per-class probabilities and a one-hot target.
///
/// The predictions must already be normalised (softmax). `backward` writes
/// `(pred - target) / N`, which is the gradient with respect to the logits
/// that produced `pred`, not with respect to `pred` itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss {
    reduction: Reduction,
}

impl CrossEntropyLoss {
    pub fn new(reduction: Reduction) -> Self {
        CrossEntropyLoss { reduction }
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn check_inputs<T: Element>(
        pred: &Tensor<T>,
        target: &Tensor<T>,
        operation: &str,
    ) -> Result<(), ModCnnError> {
        if pred.shape() != target.shape() {
            return Err(ModCnnError::ShapeMismatch {
                expected: pred.shape().to_vec(),
                actual: target.shape().to_vec(),
                operation: operation.to_string(),
            });
        }
        if pred.batch_size() == 0 {
            return Err(ModCnnError::EmptyBatch {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    fn divisor<T: Element>(&self, batch_size: usize) -> T {
        match self.reduction {
            Reduction::Mean => T::from_scalar(batch_size as f64),
            Reduction::Sum => T::one(),
        }
    }

    /// Computes `-Σ target · ln(max(pred, 1e-15))`, reduced over the batch.
    ///
    /// # Errors
    /// `ShapeMismatch` if the shapes differ, `EmptyBatch` for a zero batch.
    pub fn forward<T: Element>(&self, pred: &Tensor<T>, target: &Tensor<T>) -> Result<T, ModCnnError> {
        Self::check_inputs(pred, target, "CrossEntropyLoss::forward")?;
        let floor = T::from_scalar(PROBABILITY_FLOOR);
        let mut clamped = 0usize;
        let mut total = T::zero();
        for (&p, &t) in pred.data().iter().zip(target.data()) {
            let p = if p < floor {
                clamped += 1;
                floor
            } else {
                p
            };
            total -= t * p.ln();
        }
        if clamped > 0 {
            log::warn!(
                "CrossEntropyLoss: clamped {} probabilities to {:e} before log",
                clamped,
                PROBABILITY_FLOOR
            );
        }
        Ok(total / self.divisor(pred.batch_size()))
    }

    /// Overwrites `pred`'s gradient buffer with `(pred - target) / N`.
    pub fn backward<T: Element>(&self, pred: &mut Tensor<T>, target: &Tensor<T>) -> Result<(), ModCnnError> {
        Self::check_inputs(pred, target, "CrossEntropyLoss::backward")?;
        let n: T = self.divisor(pred.batch_size());
        let (data, grad) = pred.buffers_mut();
        for ((g, &p), &t) in grad.iter_mut().zip(data.iter()).zip(target.data()) {
            *g = (p - t) / n;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "cross_entropy_test.rs"]
mod tests;
