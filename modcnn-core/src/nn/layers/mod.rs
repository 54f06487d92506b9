pub mod arena;
pub mod convolution;
pub mod fully_connected;
pub mod layer;
pub mod max_pooling;

pub use arena::{LayerArena, LayerId};
pub use convolution::{ConvolutionGeometry, ConvolutionLayer};
pub use fully_connected::FullyConnectedLayer;
pub use layer::{AnyLayer, Layer, LayerKind};
pub use max_pooling::{ArgMaxMap, MaxPoolingLayer, PoolingGeometry};
