use crate::error::ModCnnError;
use crate::nn::layers::{AnyLayer, ConvolutionLayer, FullyConnectedLayer, LayerId};
use crate::optim::optimizer_state::{LayerMoments, ParamMoments};
use crate::tensor::ParamArray;
use crate::types::Element;
use rayon::prelude::*;
use std::collections::HashMap;

/// Hyperparameters of the AMSGrad optimizer with decoupled weight decay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmsGradConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
}

impl Default for AmsGradConfig {
    fn default() -> Self {
        AmsGradConfig {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AmsGradConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn validate(&self) -> Result<(), ModCnnError> {
        if !(self.learning_rate > 0.0) {
            return Err(ModCnnError::ConfigurationError(
                "Learning rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.beta1) {
            return Err(ModCnnError::ConfigurationError(
                "Beta1 must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.beta2) {
            return Err(ModCnnError::ConfigurationError(
                "Beta2 must be in [0, 1)".to_string(),
            ));
        }
        if !(self.epsilon > 0.0) {
            return Err(ModCnnError::ConfigurationError(
                "Epsilon must be positive".to_string(),
            ));
        }
        if !(self.weight_decay >= 0.0) {
            return Err(ModCnnError::ConfigurationError(
                "Weight decay must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-step scalars shared by every element of one update call.
#[derive(Debug, Clone, Copy)]
struct StepScalars<T> {
    lr: T,
    beta1: T,
    beta2: T,
    epsilon: T,
    decay: T,
    bias_correction1: T,
    bias_correction2: T,
}

/// AMSGrad with decoupled (AdamW-style) weight decay.
///
/// State is created lazily per layer handle on the first update of that
/// layer. The step counter is global: every successful update call advances
/// it by one, whichever layer it touches.
#[derive(Debug)]
pub struct AmsGrad<T = f32> {
    config: AmsGradConfig,
    step: u64,
    state: HashMap<LayerId, LayerMoments<T>>,
}

impl<T: Element> AmsGrad<T> {
    /// # Errors
    /// `ConfigurationError` if any hyperparameter is out of range.
    pub fn new(config: AmsGradConfig) -> Result<Self, ModCnnError> {
        config.validate()?;
        Ok(AmsGrad {
            config,
            step: 0,
            state: HashMap::new(),
        })
    }

    pub fn config(&self) -> &AmsGradConfig {
        &self.config
    }

    /// Number of update calls applied so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn state(&self, id: LayerId) -> Option<&LayerMoments<T>> {
        self.state.get(&id)
    }

    /// Updates a convolution layer's filters and biases from the given
    /// gradients.
    ///
    /// # Errors
    /// `OutOfRange` if a gradient's dims differ from its parameter's; nothing
    /// is modified in that case.
    pub fn update_convolution(
        &mut self,
        id: LayerId,
        layer: &mut ConvolutionLayer<T>,
        d_filters: &ParamArray<T>,
        d_biases: &ParamArray<T>,
    ) -> Result<(), ModCnnError> {
        let (filters, biases) = layer.parameters_mut();
        self.apply(id, "AmsGrad::update_convolution", filters, biases, d_filters, d_biases)
    }

    /// Updates a fully-connected layer's weights and biases.
    ///
    /// # Errors
    /// `OutOfRange` on any gradient/parameter dimension mismatch.
    pub fn update_fully_connected(
        &mut self,
        id: LayerId,
        layer: &mut FullyConnectedLayer<T>,
        d_weights: &ParamArray<T>,
        d_biases: &ParamArray<T>,
    ) -> Result<(), ModCnnError> {
        let (weights, biases) = layer.parameters_mut();
        self.apply(id, "AmsGrad::update_fully_connected", weights, biases, d_weights, d_biases)
    }

    /// Updates a layer from its own accumulated gradients. Pooling layers
    /// have nothing to update and do not advance the step counter.
    pub fn update_layer(&mut self, id: LayerId, layer: &mut AnyLayer<T>) -> Result<(), ModCnnError> {
        match layer {
            AnyLayer::Convolution(conv) => {
                let (d_filters, d_biases) = (conv.d_filters().clone(), conv.d_biases().clone());
                self.update_convolution(id, conv, &d_filters, &d_biases)
            }
            AnyLayer::FullyConnected(fc) => {
                let (d_weights, d_biases) = (fc.d_weights().clone(), fc.d_biases().clone());
                self.update_fully_connected(id, fc, &d_weights, &d_biases)
            }
            AnyLayer::MaxPooling(_) => Ok(()),
        }
    }

    fn apply(
        &mut self,
        id: LayerId,
        operation: &str,
        weights: &mut ParamArray<T>,
        biases: &mut ParamArray<T>,
        d_weights: &ParamArray<T>,
        d_biases: &ParamArray<T>,
    ) -> Result<(), ModCnnError> {
        // All checks happen before anything is written.
        weights.check_congruent(d_weights, operation, "weight gradient")?;
        biases.check_congruent(d_biases, operation, "bias gradient")?;
        if let Some(existing) = self.state.get(&id) {
            existing.weights.check_congruent(weights, operation, "weight moments")?;
            existing.biases.check_congruent(biases, operation, "bias moments")?;
        }

        self.step += 1;
        let scalars = self.scalars();
        log::debug!("AmsGrad step {} on {}", self.step, id);

        let moments = self
            .state
            .entry(id)
            .or_insert_with(|| LayerMoments::for_parameters(weights, biases));
        update_array(weights, d_weights, &mut moments.weights, &scalars);
        update_array(biases, d_biases, &mut moments.biases, &scalars);
        Ok(())
    }

    fn scalars(&self) -> StepScalars<T> {
        let c = &self.config;
        let t = self.step.min(i32::MAX as u64) as i32;
        StepScalars {
            lr: T::from_scalar(c.learning_rate),
            beta1: T::from_scalar(c.beta1),
            beta2: T::from_scalar(c.beta2),
            epsilon: T::from_scalar(c.epsilon),
            decay: T::from_scalar(1.0 - c.learning_rate * c.weight_decay),
            bias_correction1: T::from_scalar(1.0 - c.beta1.powi(t)),
            bias_correction2: T::from_scalar(1.0 - c.beta2.powi(t)),
        }
    }
}

/// Element-wise update over disjoint parameter/moment slots.
fn update_array<T: Element>(
    params: &mut ParamArray<T>,
    grads: &ParamArray<T>,
    moments: &mut ParamMoments<T>,
    s: &StepScalars<T>,
) {
    let one = T::one();
    params
        .values_mut()
        .par_iter_mut()
        .zip(grads.values().par_iter())
        .zip(moments.m.values_mut().par_iter_mut())
        .zip(moments.v.values_mut().par_iter_mut())
        .zip(moments.v_hat.values_mut().par_iter_mut())
        .for_each(|((((theta, &g), m), v), v_hat)| {
            *m = s.beta1 * *m + (one - s.beta1) * g;
            *v = s.beta2 * *v + (one - s.beta2) * g * g;
            if *v > *v_hat {
                *v_hat = *v;
            }
            let m_corrected = *m / s.bias_correction1;
            let v_corrected = *v_hat / s.bias_correction2;
            *theta *= s.decay;
            *theta -= s.lr * m_corrected / (v_corrected.sqrt() + s.epsilon);
        });
}

#[cfg(test)]
#[path = "amsgrad_test.rs"]
mod tests;
