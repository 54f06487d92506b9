//! Binary weight persistence.

pub mod checkpoint;

pub use checkpoint::{load_layers, save_layers, LoadedLayer};
