pub mod relu;
pub mod softmax;

pub use relu::{relu, relu_mask_inplace};
pub use softmax::softmax;
