use crate::error::ModCnnError;
use crate::nn::layers::{ConvolutionLayer, FullyConnectedLayer, MaxPoolingLayer};
use crate::tensor::Tensor;
use crate::types::Element;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// The closed set of layer variants.
///
/// The discriminant is the value stored in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Convolution = 0,
    MaxPooling = 1,
    FullyConnected = 2,
}

impl LayerKind {
    pub fn discriminant(self) -> i32 {
        self as i32
    }

    pub fn from_discriminant(value: i32) -> Result<Self, ModCnnError> {
        match value {
            0 => Ok(LayerKind::Convolution),
            1 => Ok(LayerKind::MaxPooling),
            2 => Ok(LayerKind::FullyConnected),
            other => Err(ModCnnError::UnknownLayerDiscriminant(other)),
        }
    }

    /// The short type string used in layer configurations.
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Convolution => "conv",
            LayerKind::MaxPooling => "pool",
            LayerKind::FullyConnected => "fc",
        }
    }
}

impl FromStr for LayerKind {
    type Err = ModCnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conv" => Ok(LayerKind::Convolution),
            "pool" => Ok(LayerKind::MaxPooling),
            "fc" => Ok(LayerKind::FullyConnected),
            other => Err(ModCnnError::UnknownLayerType(other.to_string())),
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common capability set of every layer.
///
/// Layers only see raw buffers: `forward` caches whatever `backward` needs,
/// and `backward` receives dL/dOutput in the data buffer of `d_out` and
/// returns dL/dInput in the data buffer of its result.
pub trait Layer<T: Element>: fmt::Debug + Send {
    fn kind(&self) -> LayerKind;

    /// Computes the layer output and caches the forward state.
    ///
    /// # Errors
    /// Returns `EmptyBatch`, `ChannelMismatch`, `ShapeMismatch` or
    /// `InvalidGeometry` when the input cannot be processed.
    fn forward(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError>;

    /// Propagates dL/dOutput back to the input and records parameter
    /// gradients.
    ///
    /// # Errors
    /// Returns `MissingForwardCache` when no forward pass preceded this call
    /// and `ShapeMismatch` when `d_out` does not match the last output.
    fn backward(&mut self, d_out: &Tensor<T>) -> Result<Tensor<T>, ModCnnError>;

    /// Resets the parameter gradient buffers. No-op for parameterless layers.
    fn zero_grad(&mut self);

    /// Number of learnable scalars.
    fn num_params(&self) -> usize;

    /// Writes the layer body (geometry and parameters, not the discriminant).
    fn save(&self, writer: &mut dyn Write) -> Result<(), ModCnnError>;
}

/// Owned layer of any kind, as stored in a `LayerArena`.
#[derive(Debug, Clone)]
pub enum AnyLayer<T = f32> {
    Convolution(ConvolutionLayer<T>),
    MaxPooling(MaxPoolingLayer),
    FullyConnected(FullyConnectedLayer<T>),
}

impl<T: Element> AnyLayer<T> {
    fn as_layer(&self) -> &dyn Layer<T> {
        match self {
            AnyLayer::Convolution(l) => l,
            AnyLayer::MaxPooling(l) => l,
            AnyLayer::FullyConnected(l) => l,
        }
    }

    fn as_layer_mut(&mut self) -> &mut dyn Layer<T> {
        match self {
            AnyLayer::Convolution(l) => l,
            AnyLayer::MaxPooling(l) => l,
            AnyLayer::FullyConnected(l) => l,
        }
    }
}

impl<T: Element> Layer<T> for AnyLayer<T> {
    fn kind(&self) -> LayerKind {
        self.as_layer().kind()
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        self.as_layer_mut().forward(input)
    }

    fn backward(&mut self, d_out: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        self.as_layer_mut().backward(d_out)
    }

    fn zero_grad(&mut self) {
        self.as_layer_mut().zero_grad()
    }

    fn num_params(&self) -> usize {
        self.as_layer().num_params()
    }

    fn save(&self, writer: &mut dyn Write) -> Result<(), ModCnnError> {
        self.as_layer().save(writer)
    }
}

impl<T> From<ConvolutionLayer<T>> for AnyLayer<T> {
    fn from(layer: ConvolutionLayer<T>) -> Self {
        AnyLayer::Convolution(layer)
    }
}

impl<T> From<MaxPoolingLayer> for AnyLayer<T> {
    fn from(layer: MaxPoolingLayer) -> Self {
        AnyLayer::MaxPooling(layer)
    }
}

impl<T> From<FullyConnectedLayer<T>> for AnyLayer<T> {
    fn from(layer: FullyConnectedLayer<T>) -> Self {
        AnyLayer::FullyConnected(layer)
    }
}
