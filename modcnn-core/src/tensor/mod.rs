// modcnn-core/src/tensor/mod.rs

//! The 4-D `(batch, channel, height, width)` tensor and the flat parameter
//! arrays owned by layers.

pub mod param_array;

pub use param_array::ParamArray;

use crate::error::ModCnnError;
use crate::types::Element;

/// `[batch, channels, height, width]`
pub type Shape4 = [usize; 4];

/// A 4-D numeric buffer paired with a gradient buffer of identical shape.
///
/// Storage is contiguous row-major (`w` fastest, then `h`, `c`, `n`), so a
/// single batch sample is one contiguous slice of `channels * height * width`
/// elements. `grad` is allocated together with `data` and never resized
/// independently of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T = f32> {
    shape: Shape4,
    data: Vec<T>,
    grad: Vec<T>,
}

impl<T: Element> Tensor<T> {
    /// Creates a tensor filled with `value`; the gradient starts at zero.
    pub fn new(batch_size: usize, channels: usize, height: usize, width: usize, value: T) -> Self {
        let shape = [batch_size, channels, height, width];
        let numel = shape.iter().product();
        Tensor {
            shape,
            data: vec![value; numel],
            grad: vec![T::zero(); numel],
        }
    }

    pub fn zeros(shape: Shape4) -> Self {
        Self::new(shape[0], shape[1], shape[2], shape[3], T::zero())
    }

    /// Wraps an existing row-major buffer. Fails if its length does not match `shape`.
    pub fn from_vec(data: Vec<T>, shape: Shape4) -> Result<Self, ModCnnError> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(ModCnnError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
                operation: "Tensor::from_vec".to_string(),
            });
        }
        Ok(Tensor {
            shape,
            data,
            grad: vec![T::zero(); numel],
        })
    }

    /// Builds a tensor whose gradient buffer is already populated.
    pub fn from_parts(data: Vec<T>, grad: Vec<T>, shape: Shape4) -> Result<Self, ModCnnError> {
        let mut tensor = Self::from_vec(data, shape)?;
        if grad.len() != tensor.data.len() {
            return Err(ModCnnError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![grad.len()],
                operation: "Tensor::from_parts (grad)".to_string(),
            });
        }
        tensor.grad = grad;
        Ok(tensor)
    }

    // --- Accessors ---

    pub fn shape(&self) -> Shape4 {
        self.shape
    }

    pub fn batch_size(&self) -> usize {
        self.shape[0]
    }

    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    pub fn height(&self) -> usize {
        self.shape[2]
    }

    pub fn width(&self) -> usize {
        self.shape[3]
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Number of elements in one batch sample (`c * h * w`).
    pub fn sample_len(&self) -> usize {
        self.shape[1] * self.shape[2] * self.shape[3]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn grad(&self) -> &[T] {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut [T] {
        &mut self.grad
    }

    /// Mutable access to both buffers at once.
    pub fn buffers_mut(&mut self) -> (&mut [T], &mut [T]) {
        (&mut self.data, &mut self.grad)
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Flat row-major offset of `(n, c, h, w)`.
    #[inline]
    pub fn offset(&self, n: usize, c: usize, h: usize, w: usize) -> usize {
        ((n * self.shape[1] + c) * self.shape[2] + h) * self.shape[3] + w
    }

    /// Panics if the index is out of bounds, like slice indexing.
    pub fn get(&self, n: usize, c: usize, h: usize, w: usize) -> T {
        self.data[self.offset(n, c, h, w)]
    }

    pub fn set(&mut self, n: usize, c: usize, h: usize, w: usize, value: T) {
        let idx = self.offset(n, c, h, w);
        self.data[idx] = value;
    }

    pub fn grad_at(&self, n: usize, c: usize, h: usize, w: usize) -> T {
        self.grad[self.offset(n, c, h, w)]
    }

    pub fn set_grad(&mut self, n: usize, c: usize, h: usize, w: usize, value: T) {
        let idx = self.offset(n, c, h, w);
        self.grad[idx] = value;
    }

    /// Contiguous data of batch sample `n`.
    pub fn sample(&self, n: usize) -> &[T] {
        let len = self.sample_len();
        &self.data[n * len..(n + 1) * len]
    }

    pub fn sample_grad(&self, n: usize) -> &[T] {
        let len = self.sample_len();
        &self.grad[n * len..(n + 1) * len]
    }

    // --- Gradient handling ---

    /// Resets every gradient element to zero. `data` is left untouched.
    pub fn zero_grad(&mut self) {
        self.grad.iter_mut().for_each(|g| *g = T::zero());
    }

    /// Adds `incoming` element-wise into the gradient buffer.
    pub fn accumulate_grad(&mut self, incoming: &[T]) -> Result<(), ModCnnError> {
        if incoming.len() != self.grad.len() {
            return Err(ModCnnError::ShapeMismatch {
                expected: self.shape.to_vec(),
                actual: vec![incoming.len()],
                operation: "Tensor::accumulate_grad".to_string(),
            });
        }
        for (g, &d) in self.grad.iter_mut().zip(incoming) {
            *g += d;
        }
        Ok(())
    }

    /// Reinterprets the tensor with a new shape of the same element count.
    /// Both buffers keep their row-major order.
    pub fn reshape(self, shape: Shape4) -> Result<Self, ModCnnError> {
        let numel: usize = shape.iter().product();
        if numel != self.data.len() {
            return Err(ModCnnError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: self.shape.to_vec(),
                operation: "Tensor::reshape".to_string(),
            });
        }
        Ok(Tensor {
            shape,
            data: self.data,
            grad: self.grad,
        })
    }
}
