//! Model construction from a declarative layer list.

pub mod layer_config;
pub mod modular_cnn;

pub use layer_config::LayerConfig;
pub use modular_cnn::ModularCnn;
