//! Core of a small modular CNN training engine: 4-D tensors, convolution,
//! max-pooling and fully-connected layers, a linear computation graph,
//! cross-entropy loss, an AMSGrad optimizer and a binary checkpoint format.

pub mod autograd;
pub mod error;
pub mod io;
pub mod model;
pub mod nn;
pub mod ops;
pub mod optim;
pub mod tensor;
pub mod types;
pub mod utils;

pub use error::ModCnnError;
pub use model::{LayerConfig, ModularCnn};
pub use nn::losses::{CrossEntropyLoss, Reduction};
pub use optim::{AmsGrad, AmsGradConfig};
pub use tensor::{ParamArray, Shape4, Tensor};
pub use types::Element;
pub use utils::ExecutionConfig;
// Re-export traits required by public functions/structs
pub use num_traits;
