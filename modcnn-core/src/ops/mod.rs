// modcnn-core/src/ops/mod.rs

//! Stateless element-wise kernels shared by the layers and the model.

pub mod activation;
