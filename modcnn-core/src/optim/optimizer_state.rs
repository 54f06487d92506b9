use crate::error::ModCnnError;
use crate::tensor::ParamArray;
use crate::types::Element;

/// Moment buffers for one parameter array.
#[derive(Debug, Clone)]
pub struct ParamMoments<T = f32> {
    /// First moment (EMA of gradients).
    pub(crate) m: ParamArray<T>,
    /// Second moment (EMA of squared gradients).
    pub(crate) v: ParamArray<T>,
    /// Running maximum of `v`. Never decreases.
    pub(crate) v_hat: ParamArray<T>,
}

impl<T: Element> ParamMoments<T> {
    pub(crate) fn zeros(dims: &[usize]) -> Self {
        ParamMoments {
            m: ParamArray::zeros(dims),
            v: ParamArray::zeros(dims),
            v_hat: ParamArray::zeros(dims),
        }
    }

    pub fn m(&self) -> &ParamArray<T> {
        &self.m
    }

    pub fn v(&self) -> &ParamArray<T> {
        &self.v
    }

    pub fn v_hat(&self) -> &ParamArray<T> {
        &self.v_hat
    }

    /// State created for one shape must not be reused for another.
    pub(crate) fn check_congruent(&self, param: &ParamArray<T>, operation: &str, what: &str) -> Result<(), ModCnnError> {
        param.check_congruent(&self.m, operation, what)
    }
}

/// Optimizer state of one trainable layer: its weight-like array (filters or
/// weights) and its bias vector.
#[derive(Debug, Clone)]
pub struct LayerMoments<T = f32> {
    pub(crate) weights: ParamMoments<T>,
    pub(crate) biases: ParamMoments<T>,
}

impl<T: Element> LayerMoments<T> {
    pub(crate) fn for_parameters(weights: &ParamArray<T>, biases: &ParamArray<T>) -> Self {
        LayerMoments {
            weights: ParamMoments::zeros(weights.dims()),
            biases: ParamMoments::zeros(biases.dims()),
        }
    }

    pub fn weights(&self) -> &ParamMoments<T> {
        &self.weights
    }

    pub fn biases(&self) -> &ParamMoments<T> {
        &self.biases
    }
}
