//! One operation per layer kind.

pub mod convolution;
pub mod fully_connected;
pub mod max_pooling;

pub use convolution::ConvolutionOperation;
pub use fully_connected::FullyConnectedOperation;
pub use max_pooling::MaxPoolingOperation;

use crate::autograd::operation::Operation;
use crate::error::ModCnnError;
use crate::nn::layers::{Layer, LayerArena, LayerId, LayerKind};
use crate::types::Element;

/// Wraps the layer behind `id` in the operation matching its kind.
///
/// Fully-connected layers get `activated` as their ReLU flag; the flag is
/// ignored for the other kinds, whose activation behaviour is fixed.
pub fn operation_for<T: Element>(
    layers: &LayerArena<T>,
    id: LayerId,
    activated: bool,
) -> Result<Box<dyn Operation<T>>, ModCnnError> {
    let op: Box<dyn Operation<T>> = match layers.get(id)?.kind() {
        LayerKind::Convolution => Box::new(ConvolutionOperation::new(id)),
        LayerKind::MaxPooling => Box::new(MaxPoolingOperation::new(id)),
        LayerKind::FullyConnected => Box::new(FullyConnectedOperation::new(id, activated)),
    };
    Ok(op)
}
