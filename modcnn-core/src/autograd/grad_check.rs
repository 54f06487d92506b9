use crate::error::ModCnnError;
use thiserror::Error;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug)]
pub enum GradCheckError {
    #[error("Gradient check failed at element {index}: analytical {analytical:?} != numerical {numerical:?} (difference {difference:?})")]
    GradientMismatch {
        index: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },

    #[error("Numerical gradient is NaN or infinite at element {index}. Loss+: {loss_plus:?}, Loss-: {loss_minus:?}")]
    NumericalGradNaNOrInfinite {
        index: usize,
        loss_plus: f64,
        loss_minus: f64,
    },

    #[error("Analytical gradient has {analytical} elements, point has {point}")]
    LengthMismatch { analytical: usize, point: usize },

    #[error("Loss evaluation failed during gradient check: {0}")]
    ForwardPassError(#[from] ModCnnError),
}

/// Central-difference estimate of dL/dx at `point`.
///
/// # Errors
/// Propagates any error returned by `loss`, and reports non-finite estimates.
pub fn numerical_gradient<F>(mut loss: F, point: &[f64], epsilon: f64) -> Result<Vec<f64>, GradCheckError>
where
    F: FnMut(&[f64]) -> Result<f64, ModCnnError>,
{
    let mut probe = point.to_vec();
    let mut grad = Vec::with_capacity(point.len());
    for index in 0..point.len() {
        let original = probe[index];

        probe[index] = original + epsilon;
        let loss_plus = loss(&probe)?;
        probe[index] = original - epsilon;
        let loss_minus = loss(&probe)?;
        probe[index] = original;

        let numerical = (loss_plus - loss_minus) / (2.0 * epsilon);
        if !numerical.is_finite() {
            return Err(GradCheckError::NumericalGradNaNOrInfinite {
                index,
                loss_plus,
                loss_minus,
            });
        }
        grad.push(numerical);
    }
    Ok(grad)
}

/// Checks an analytical gradient against central finite differences.
///
/// `loss` maps a flat parameter vector to a scalar. Each element passes when
/// `|analytical - numerical| <= tolerance * max(1, |analytical|, |numerical|)`.
///
/// # Arguments
/// * `loss`: Scalar function of the flattened parameters.
/// * `point`: Parameters at which to evaluate.
/// * `analytical`: Gradient computed by backward, same length as `point`.
/// * `epsilon`: Perturbation step.
/// * `tolerance`: Allowed relative difference.
pub fn check_grad<F>(
    loss: F,
    point: &[f64],
    analytical: &[f64],
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError>
where
    F: FnMut(&[f64]) -> Result<f64, ModCnnError>,
{
    if analytical.len() != point.len() {
        return Err(GradCheckError::LengthMismatch {
            analytical: analytical.len(),
            point: point.len(),
        });
    }
    let numerical = numerical_gradient(loss, point, epsilon)?;
    for (index, (&a, &n)) in analytical.iter().zip(&numerical).enumerate() {
        let difference = (a - n).abs();
        let scale = 1.0f64.max(a.abs()).max(n.abs());
        if difference > tolerance * scale {
            log::debug!("grad check mismatch at {}: analytical {} numerical {}", index, a, n);
            return Err(GradCheckError::GradientMismatch {
                index,
                analytical: a,
                numerical: n,
                difference,
            });
        }
    }
    Ok(())
}
