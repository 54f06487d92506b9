use crate::error::ModCnnError;
use crate::nn::init::he_normal;
use crate::nn::layers::layer::{Layer, LayerKind};
use crate::tensor::{ParamArray, Tensor};
use crate::types::Element;
use rand::Rng;
use rayon::prelude::*;
use std::io::Write;

/// Forward-pass state needed by `backward`.
#[derive(Debug, Clone)]
struct FullyConnectedCache<T> {
    /// One row of `in_features` values per sample.
    flattened: Vec<T>,
    batch_size: usize,
}

/// Affine layer `y = W·x + b` over the flattened sample.
///
/// The layer itself is purely affine; the optional ReLU lives in
/// `FullyConnectedOperation`, which also masks the incoming gradient before
/// calling `backward`.
#[derive(Debug, Clone)]
pub struct FullyConnectedLayer<T = f32> {
    in_features: usize,
    out_features: usize,
    weights: ParamArray<T>,
    biases: ParamArray<T>,
    d_weights: ParamArray<T>,
    d_biases: ParamArray<T>,
    cache: Option<FullyConnectedCache<T>>,
}

impl<T: Element> FullyConnectedLayer<T> {
    /// He-initialised weights (`fan_in = in_features`), zero biases.
    pub fn new(in_features: usize, out_features: usize) -> Result<Self, ModCnnError> {
        Self::with_rng(in_features, out_features, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Result<Self, ModCnnError> {
        Self::check_features(in_features, out_features)?;
        let values = he_normal(rng, in_features, out_features * in_features)?;
        let weights = ParamArray::new(vec![out_features, in_features], values)?;
        Self::from_parameters(weights, ParamArray::zeros(&[out_features]))
    }

    /// Builds a layer from a `[out, in]` weight matrix and an `[out]` bias vector.
    pub fn from_parameters(weights: ParamArray<T>, biases: ParamArray<T>) -> Result<Self, ModCnnError> {
        let (out_features, in_features) = match weights.dims() {
            [o, i] => (*o, *i),
            other => {
                return Err(ModCnnError::ShapeMismatch {
                    expected: vec![0, 0],
                    actual: other.to_vec(),
                    operation: "FullyConnectedLayer::from_parameters (weights must be 2-D)".to_string(),
                })
            }
        };
        Self::check_features(in_features, out_features)?;
        let mut layer = FullyConnectedLayer {
            in_features,
            out_features,
            weights: ParamArray::zeros(&[out_features, in_features]),
            biases: ParamArray::zeros(&[out_features]),
            d_weights: ParamArray::zeros(&[out_features, in_features]),
            d_biases: ParamArray::zeros(&[out_features]),
            cache: None,
        };
        layer.set_weights(weights)?;
        layer.set_biases(biases)?;
        Ok(layer)
    }

    fn check_features(in_features: usize, out_features: usize) -> Result<(), ModCnnError> {
        if in_features == 0 || out_features == 0 {
            return Err(ModCnnError::InvalidGeometry {
                layer: "FullyConnectedLayer".to_string(),
                reason: format!("features must be non-zero (in {}, out {})", in_features, out_features),
            });
        }
        Ok(())
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weights(&self) -> &ParamArray<T> {
        &self.weights
    }

    pub fn biases(&self) -> &ParamArray<T> {
        &self.biases
    }

    pub fn d_weights(&self) -> &ParamArray<T> {
        &self.d_weights
    }

    pub fn d_biases(&self) -> &ParamArray<T> {
        &self.d_biases
    }

    pub(crate) fn parameters_mut(&mut self) -> (&mut ParamArray<T>, &mut ParamArray<T>) {
        (&mut self.weights, &mut self.biases)
    }

    pub fn set_weights(&mut self, weights: ParamArray<T>) -> Result<(), ModCnnError> {
        if weights.dims() != [self.out_features, self.in_features] {
            return Err(ModCnnError::ShapeMismatch {
                expected: vec![self.out_features, self.in_features],
                actual: weights.dims().to_vec(),
                operation: "FullyConnectedLayer::set_weights".to_string(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    pub fn set_biases(&mut self, biases: ParamArray<T>) -> Result<(), ModCnnError> {
        if biases.dims() != [self.out_features] {
            return Err(ModCnnError::ShapeMismatch {
                expected: vec![self.out_features],
                actual: biases.dims().to_vec(),
                operation: "FullyConnectedLayer::set_biases".to_string(),
            });
        }
        self.biases = biases;
        Ok(())
    }
}

impl<T: Element> Layer<T> for FullyConnectedLayer<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::FullyConnected
    }

    /// Flattens each sample (channel, then row, then column) and returns the
    /// raw affine result with shape `[batch, out_features, 1, 1]`.
    fn forward(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let n_batch = input.batch_size();
        if n_batch == 0 {
            return Err(ModCnnError::EmptyBatch {
                operation: "FullyConnectedLayer::forward".to_string(),
            });
        }
        if input.sample_len() != self.in_features {
            return Err(ModCnnError::ShapeMismatch {
                expected: vec![self.in_features],
                actual: vec![input.sample_len()],
                operation: "FullyConnectedLayer::forward (flattened sample)".to_string(),
            });
        }
        let (in_f, out_f) = (self.in_features, self.out_features);
        let weights = self.weights.values();
        let biases = self.biases.values();

        // Storage is already channel-major per sample, so flattening is a copy.
        let flattened = input.data().to_vec();
        let mut output = vec![T::zero(); n_batch * out_f];
        output
            .par_chunks_mut(out_f)
            .zip(flattened.par_chunks(in_f))
            .for_each(|(y, x)| {
                for (o, y_o) in y.iter_mut().enumerate() {
                    let row = &weights[o * in_f..(o + 1) * in_f];
                    let dot: T = row.iter().zip(x).map(|(&w, &xi)| w * xi).sum();
                    *y_o = dot + biases[o];
                }
            });

        self.cache = Some(FullyConnectedCache {
            flattened,
            batch_size: n_batch,
        });
        Tensor::from_vec(output, [n_batch, out_f, 1, 1])
    }

    /// `d_out.data()` holds dL/dOutput, already masked by the caller when an
    /// activation follows. Accumulates into the weight/bias gradients and
    /// returns dL/dInput flattened to `[batch, in_features, 1, 1]`.
    ///
    /// Weight and bias rows are partitioned across workers by output feature;
    /// input gradients by sample.
    fn backward(&mut self, d_out: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let cache = self.cache.as_ref().ok_or_else(|| ModCnnError::MissingForwardCache {
            operation: "FullyConnectedLayer::backward".to_string(),
        })?;
        let (in_f, out_f) = (self.in_features, self.out_features);
        let n_batch = cache.batch_size;
        if d_out.batch_size() != n_batch || d_out.sample_len() != out_f {
            return Err(ModCnnError::ShapeMismatch {
                expected: vec![n_batch, out_f, 1, 1],
                actual: d_out.shape().to_vec(),
                operation: "FullyConnectedLayer::backward".to_string(),
            });
        }
        let grads = d_out.data();
        let x = &cache.flattened;

        self.d_weights
            .values_mut()
            .par_chunks_mut(in_f)
            .zip(self.d_biases.values_mut().par_iter_mut())
            .enumerate()
            .for_each(|(o, (dw_row, db))| {
                for n in 0..n_batch {
                    let gv = grads[n * out_f + o];
                    *db += gv;
                    let x_row = &x[n * in_f..(n + 1) * in_f];
                    for (dw, &xi) in dw_row.iter_mut().zip(x_row) {
                        *dw += gv * xi;
                    }
                }
            });

        let weights = self.weights.values();
        let mut d_input = vec![T::zero(); n_batch * in_f];
        d_input
            .par_chunks_mut(in_f)
            .zip(grads.par_chunks(out_f))
            .for_each(|(dx, g)| {
                for (o, &gv) in g.iter().enumerate() {
                    let row = &weights[o * in_f..(o + 1) * in_f];
                    for (d, &w) in dx.iter_mut().zip(row) {
                        *d += w * gv;
                    }
                }
            });

        Tensor::from_vec(d_input, [n_batch, in_f, 1, 1])
    }

    fn zero_grad(&mut self) {
        self.d_weights.fill_zero();
        self.d_biases.fill_zero();
    }

    fn num_params(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// `in_features`, `out_features` as `u32`, then weights and biases.
    /// The activation flag belongs to the operation and is written by the
    /// checkpoint writer, not here.
    fn save(&self, writer: &mut dyn Write) -> Result<(), ModCnnError> {
        crate::io::checkpoint::write_dim(writer, self.in_features)?;
        crate::io::checkpoint::write_dim(writer, self.out_features)?;
        for &v in self.weights.values().iter().chain(self.biases.values()) {
            v.write_le(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fully_connected_test.rs"]
mod tests;
