use crate::autograd::operation::{missing_cache, Operation};
use crate::error::ModCnnError;
use crate::nn::layers::{Layer, LayerArena, LayerId};
use crate::ops::activation::{relu, relu_mask_inplace};
use crate::tensor::{Shape4, Tensor};
use crate::types::Element;

#[derive(Debug)]
struct FullyConnectedCache<T> {
    input_shape: Shape4,
    /// Post-activation output, used to mask the upstream gradient.
    output: Tensor<T>,
}

/// Fully-connected layer with an optional ReLU.
///
/// The layer is purely affine; this operation applies the activation on the
/// way forward and masks the upstream gradient before handing it to the
/// layer. dL/dInput is reshaped back to the cached input's 4-D shape.
#[derive(Debug)]
pub struct FullyConnectedOperation<T = f32> {
    id: LayerId,
    activated: bool,
    cache: Option<FullyConnectedCache<T>>,
}

impl<T: Element> FullyConnectedOperation<T> {
    pub fn new(id: LayerId, activated: bool) -> Self {
        FullyConnectedOperation {
            id,
            activated,
            cache: None,
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }
}

impl<T: Element> Operation<T> for FullyConnectedOperation<T> {
    fn name(&self) -> &'static str {
        "FullyConnectedOperation"
    }

    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn forward(&mut self, layers: &mut LayerArena<T>, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let mut output = layers.get_mut(self.id)?.forward(input)?;
        if self.activated {
            output.data_mut().iter_mut().for_each(|v| *v = relu(*v));
        }
        self.cache = Some(FullyConnectedCache {
            input_shape: input.shape(),
            output: output.clone(),
        });
        Ok(output)
    }

    fn backward(&mut self, layers: &mut LayerArena<T>, d_output: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let cache = self.cache.as_ref().ok_or_else(|| missing_cache("FullyConnectedOperation"))?;
        if d_output.shape() != cache.output.shape() {
            return Err(ModCnnError::ShapeMismatch {
                expected: cache.output.shape().to_vec(),
                actual: d_output.shape().to_vec(),
                operation: "FullyConnectedOperation::backward".to_string(),
            });
        }
        let d_flat = if self.activated {
            let mut masked = d_output.clone();
            relu_mask_inplace(masked.data_mut(), cache.output.data());
            layers.get_mut(self.id)?.backward(&masked)?
        } else {
            layers.get_mut(self.id)?.backward(d_output)?
        };
        d_flat.reshape(cache.input_shape)
    }
}
