use crate::error::ModCnnError;
use crate::nn::layers::{LayerArena, LayerId};
use crate::tensor::{Shape4, Tensor};
use crate::types::Element;
use std::fmt::Debug;

/// Backward-capable wrapper around one layer of the arena.
///
/// The forward-pass state lives in the wrapped layer (cached input,
/// pre-activations, argmax map); the operation records only what it adds on
/// top, such as the input shape or the activation mask. `backward` receives
/// dL/dOutput in the `data` of its argument and returns a fresh tensor with
/// this call's dL/dInput in its `data`. Nothing is accumulated across calls,
/// so repeating `backward` after one `forward` returns the same gradient.
///
/// The trait requires `Debug + Send` so a graph can be moved into a worker
/// pool.
pub trait Operation<T: Element>: Debug + Send {
    /// Short name used in log output and error messages.
    fn name(&self) -> &'static str;

    /// Handle of the wrapped layer.
    fn layer_id(&self) -> LayerId;

    /// # Errors
    /// Propagates the layer's forward errors, and `UnknownLayer` when the
    /// handle does not resolve in `layers`.
    fn forward(&mut self, layers: &mut LayerArena<T>, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError>;

    /// # Errors
    /// Returns `MissingForwardCache` when called before `forward`.
    fn backward(&mut self, layers: &mut LayerArena<T>, d_output: &Tensor<T>) -> Result<Tensor<T>, ModCnnError>;
}

/// Moves the gradient buffer of `output` into the data buffer of a fresh
/// tensor, which is the form operations and layers pass gradients in.
pub(crate) fn upstream_gradient<T: Element>(output: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
    Tensor::from_vec(output.grad().to_vec(), output.shape())
}

/// Checks that `d_input` has the shape recorded at forward time.
pub(crate) fn check_input_gradient<T: Element>(
    operation: &str,
    input_shape: Shape4,
    d_input: &Tensor<T>,
) -> Result<(), ModCnnError> {
    if d_input.shape() != input_shape {
        return Err(ModCnnError::ShapeMismatch {
            expected: input_shape.to_vec(),
            actual: d_input.shape().to_vec(),
            operation: format!("{}::backward", operation),
        });
    }
    Ok(())
}

pub(crate) fn missing_cache(name: &str) -> ModCnnError {
    ModCnnError::MissingForwardCache {
        operation: name.to_string(),
    }
}
