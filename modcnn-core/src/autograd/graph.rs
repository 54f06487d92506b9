use crate::autograd::operation::{upstream_gradient, Operation};
use crate::error::ModCnnError;
use crate::nn::layers::LayerArena;
use crate::tensor::Tensor;
use crate::types::Element;

/// A strictly linear chain of operations.
///
/// `forward` folds left to right, `backward` right to left. Operations run
/// one after another; each may parallelise its own work internally.
#[derive(Debug, Default)]
pub struct ComputationGraph<T: Element = f32> {
    operations: Vec<Box<dyn Operation<T>>>,
}

impl<T: Element> ComputationGraph<T> {
    pub fn new() -> Self {
        ComputationGraph { operations: Vec::new() }
    }

    /// Appends an operation. No structural validation is performed; shape
    /// contracts are checked by the layers when data flows.
    pub fn add_operation(&mut self, operation: Box<dyn Operation<T>>) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Box<dyn Operation<T>>] {
        &self.operations
    }

    /// Runs every operation in insertion order and returns the last output.
    /// An empty graph returns a copy of its input.
    pub fn forward(&mut self, layers: &mut LayerArena<T>, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let mut current = input.clone();
        for op in self.operations.iter_mut() {
            let next = op.forward(layers, &current)?;
            log::trace!("{} forward: {:?} -> {:?}", op.name(), current.shape(), next.shape());
            current = next;
        }
        Ok(current)
    }

    /// Unwinds the chain. `loss_grad` is the last output with dL/dOutput in
    /// its `grad` buffer. Returns a fresh tensor holding dL/dInput for the
    /// graph input in its `data`; parameter gradients are left in the layers.
    ///
    /// Calling this twice after one `forward` returns the same input gradient.
    pub fn backward(&mut self, layers: &mut LayerArena<T>, loss_grad: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let mut current = upstream_gradient(loss_grad)?;
        for op in self.operations.iter_mut().rev() {
            let next = op.backward(layers, &current)?;
            log::trace!("{} backward: {:?} -> {:?}", op.name(), current.shape(), next.shape());
            current = next;
        }
        Ok(current)
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
