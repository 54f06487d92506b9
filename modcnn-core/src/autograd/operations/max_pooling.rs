use crate::autograd::operation::{check_input_gradient, missing_cache, Operation};
use crate::error::ModCnnError;
use crate::nn::layers::{Layer, LayerArena, LayerId};
use crate::tensor::{Shape4, Tensor};
use crate::types::Element;

/// Max pooling. The argmax map lives in the layer.
#[derive(Debug)]
pub struct MaxPoolingOperation {
    id: LayerId,
    input_shape: Option<Shape4>,
}

impl MaxPoolingOperation {
    pub fn new(id: LayerId) -> Self {
        MaxPoolingOperation { id, input_shape: None }
    }
}

impl<T: Element> Operation<T> for MaxPoolingOperation {
    fn name(&self) -> &'static str {
        "MaxPoolingOperation"
    }

    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn forward(&mut self, layers: &mut LayerArena<T>, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let output = layers.get_mut(self.id)?.forward(input)?;
        self.input_shape = Some(input.shape());
        Ok(output)
    }

    fn backward(&mut self, layers: &mut LayerArena<T>, d_output: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let input_shape = self.input_shape.ok_or_else(|| missing_cache("MaxPoolingOperation"))?;
        let d_input = layers.get_mut(self.id)?.backward(d_output)?;
        check_input_gradient("MaxPoolingOperation", input_shape, &d_input)?;
        Ok(d_input)
    }
}
