use crate::error::ModCnnError;
use crate::types::Element;

/// A flat, row-major array of trainable values with explicit dimensions.
///
/// Used for filter banks (`[out, in, fh, fw]`), weight matrices
/// (`[out, in]`), bias vectors (`[out]`), their gradients, and the optimizer
/// moments congruent to them. Dimensions are fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamArray<T = f32> {
    dims: Vec<usize>,
    values: Vec<T>,
}

impl<T: Element> ParamArray<T> {
    pub fn new(dims: Vec<usize>, values: Vec<T>) -> Result<Self, ModCnnError> {
        let expected: usize = dims.iter().product();
        if values.len() != expected {
            return Err(ModCnnError::ShapeMismatch {
                expected: dims,
                actual: vec![values.len()],
                operation: "ParamArray::new".to_string(),
            });
        }
        Ok(ParamArray { dims, values })
    }

    pub fn zeros(dims: &[usize]) -> Self {
        let len = dims.iter().product();
        ParamArray {
            dims: dims.to_vec(),
            values: vec![T::zero(); len],
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    pub fn fill_zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = T::zero());
    }

    /// Checks `other` dimension by dimension against `self`.
    pub(crate) fn check_congruent(
        &self,
        other: &ParamArray<T>,
        operation: &str,
        what: &str,
    ) -> Result<(), ModCnnError> {
        if self.dims != other.dims {
            return Err(ModCnnError::OutOfRange {
                operation: operation.to_string(),
                what: what.to_string(),
                expected: self.dims.clone(),
                actual: other.dims.clone(),
            });
        }
        Ok(())
    }
}
