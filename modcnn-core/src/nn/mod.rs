//! Layers, parameter initialisation and losses.

pub mod init;
pub mod layers;
pub mod losses;

pub use layers::{
    AnyLayer, ConvolutionGeometry, ConvolutionLayer, FullyConnectedLayer, Layer, LayerArena, LayerId, LayerKind,
    MaxPoolingLayer, PoolingGeometry,
};
pub use losses::{CrossEntropyLoss, Reduction};
