//! Gradient-based parameter updates.

pub mod amsgrad;
pub mod optimizer_state;

pub use amsgrad::{AmsGrad, AmsGradConfig};
pub use optimizer_state::{LayerMoments, ParamMoments};
