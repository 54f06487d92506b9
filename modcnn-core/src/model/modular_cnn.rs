use crate::autograd::{operation_for, ComputationGraph};
use crate::error::ModCnnError;
use crate::io::checkpoint::{load_layers, save_layers};
use crate::model::layer_config::LayerConfig;
use crate::nn::layers::{AnyLayer, Layer, LayerArena, LayerId};
use crate::nn::losses::CrossEntropyLoss;
use crate::ops::activation::softmax;
use crate::optim::AmsGrad;
use crate::tensor::Tensor;
use crate::types::Element;
use crate::utils::parallel::{install, ExecutionConfig};
use rand::Rng;
use rayon::ThreadPool;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// A linear stack of convolution, pooling and fully-connected layers.
///
/// The model owns the layers (in an arena) and the graph of operations over
/// them. `forward` returns logits; `predict` applies softmax on top.
#[derive(Debug)]
pub struct ModularCnn<T: Element = f32> {
    layers: LayerArena<T>,
    graph: ComputationGraph<T>,
    /// ReLU flag per layer, in layer order. Only read for fully-connected layers.
    activations: Vec<bool>,
    pool: Option<Arc<ThreadPool>>,
}

impl<T: Element> ModularCnn<T> {
    /// Builds the model described by `configs`, in order.
    ///
    /// # Errors
    /// `UnknownLayerType` for an unrecognised tag, and any geometry error of
    /// the individual layers.
    pub fn new(configs: &[LayerConfig]) -> Result<Self, ModCnnError> {
        Self::with_rng(configs, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(configs: &[LayerConfig], rng: &mut R) -> Result<Self, ModCnnError> {
        let layers = configs
            .iter()
            .map(|config| config.build(&mut *rng))
            .collect::<Result<Vec<_>, _>>()?;
        let model = Self::from_layers(layers)?;
        log::info!(
            "Built ModularCnn with {} layers and {} parameters",
            model.num_layers(),
            model.total_params()
        );
        Ok(model)
    }

    fn from_layers(layers: Vec<(AnyLayer<T>, bool)>) -> Result<Self, ModCnnError> {
        let mut arena = LayerArena::new();
        let mut graph = ComputationGraph::new();
        let mut activations = Vec::with_capacity(layers.len());
        for (layer, activated) in layers {
            let id = arena.push(layer);
            graph.add_operation(operation_for(&arena, id, activated)?);
            activations.push(activated);
        }
        Ok(ModularCnn {
            layers: arena,
            graph,
            activations,
            pool: None,
        })
    }

    /// Runs all subsequent work of this model inside a dedicated worker pool.
    pub fn with_execution(mut self, config: ExecutionConfig) -> Result<Self, ModCnnError> {
        self.pool = Some(config.build_pool()?);
        Ok(self)
    }

    // --- Introspection ---

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|(id, _)| id).collect()
    }

    pub fn layers(&self) -> &LayerArena<T> {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Result<&AnyLayer<T>, ModCnnError> {
        self.layers.get(id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut AnyLayer<T>, ModCnnError> {
        self.layers.get_mut(id)
    }

    pub fn total_params(&self) -> usize {
        self.layers.iter().map(|(_, layer)| layer.num_params()).sum()
    }

    // --- Training ---

    /// Runs the graph and returns the raw logits.
    pub fn forward(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let (graph, layers) = (&mut self.graph, &mut self.layers);
        install(self.pool.as_deref(), || graph.forward(layers, input))
    }

    /// Class probabilities: softmax over each sample of the logits.
    pub fn predict(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        softmax(&self.forward(input)?)
    }

    /// Propagates dL/dLogits (held in `loss_grad.grad()`) through the graph.
    /// Returns dL/dInput in the `data` of a fresh tensor.
    pub fn backward(&mut self, loss_grad: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let (graph, layers) = (&mut self.graph, &mut self.layers);
        install(self.pool.as_deref(), || graph.backward(layers, loss_grad))
    }

    /// Applies one optimizer update to every trainable layer, in order.
    pub fn update(&mut self, optimizer: &mut AmsGrad<T>) -> Result<(), ModCnnError> {
        let layers = &mut self.layers;
        install(self.pool.as_deref(), || -> Result<(), ModCnnError> {
            for (id, layer) in layers.iter_mut() {
                optimizer.update_layer(id, layer)?;
            }
            Ok(())
        })
    }

    pub fn zero_grad(&mut self) {
        for (_, layer) in self.layers.iter_mut() {
            layer.zero_grad();
        }
    }

    /// One full step: forward, softmax, loss, backward, update, zero grad.
    /// Returns the loss before the update.
    pub fn train_step(
        &mut self,
        input: &Tensor<T>,
        target: &Tensor<T>,
        loss: &CrossEntropyLoss,
        optimizer: &mut AmsGrad<T>,
    ) -> Result<T, ModCnnError> {
        let logits = self.forward(input)?;
        let mut probabilities = softmax(&logits)?;
        let value = loss.forward(&probabilities, target)?;
        loss.backward(&mut probabilities, target)?;

        // (p - t) / N is the gradient w.r.t. the logits, so it seeds the graph directly.
        let shape = logits.shape();
        let seed = Tensor::from_parts(logits.into_data(), probabilities.grad().to_vec(), shape)?;
        self.backward(&seed)?;
        self.update(optimizer)?;
        self.zero_grad();
        log::debug!("train_step {}: loss {:?}", optimizer.step(), value);
        Ok(value)
    }

    // --- Persistence ---

    pub fn save(&self, writer: &mut dyn Write) -> Result<(), ModCnnError> {
        save_layers(
            writer,
            self.layers
                .iter()
                .zip(&self.activations)
                .map(|((_, layer), &activated)| (layer, activated)),
        )
    }

    pub fn load(reader: &mut dyn Read) -> Result<Self, ModCnnError> {
        let loaded = load_layers(reader)?;
        Self::from_layers(loaded.into_iter().map(|l| (l.layer, l.activated)).collect())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModCnnError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.save(&mut writer)?;
        writer.flush()?;
        log::info!("Saved {} layers to {}", self.num_layers(), path.as_ref().display());
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModCnnError> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let model = Self::load(&mut reader)?;
        log::info!("Loaded {} layers from {}", model.num_layers(), path.as_ref().display());
        Ok(model)
    }
}

#[cfg(test)]
#[path = "modular_cnn_test.rs"]
mod tests;
