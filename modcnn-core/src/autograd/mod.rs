//! Operation wrappers, the linear computation graph and gradient checking.

pub mod grad_check;
pub mod graph;
pub mod operation;
pub mod operations;

pub use graph::ComputationGraph;
pub use operation::Operation;
pub use operations::{operation_for, ConvolutionOperation, FullyConnectedOperation, MaxPoolingOperation};
