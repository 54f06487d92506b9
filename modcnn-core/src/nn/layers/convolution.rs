use crate::error::ModCnnError;
use crate::nn::init::he_normal;
use crate::nn::layers::layer::{Layer, LayerKind};
use crate::ops::activation::relu;
use crate::tensor::{ParamArray, Shape4, Tensor};
use crate::types::Element;
use rand::Rng;
use rayon::prelude::*;
use std::io::Write;

/// Shape metadata of a convolution layer. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionGeometry {
    pub in_channels: usize,
    pub out_channels: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub stride: usize,
    pub padding: usize,
}

impl ConvolutionGeometry {
    pub fn validate(&self) -> Result<(), ModCnnError> {
        let invalid = |reason: &str| ModCnnError::InvalidGeometry {
            layer: "ConvolutionLayer".to_string(),
            reason: reason.to_string(),
        };
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(invalid("channel counts must be non-zero"));
        }
        if self.filter_height == 0 || self.filter_width == 0 {
            return Err(invalid("filter dimensions must be non-zero"));
        }
        if self.stride == 0 {
            return Err(invalid("stride must be non-zero"));
        }
        Ok(())
    }

    /// `[out_channels, in_channels, filter_height, filter_width]`
    pub fn filter_dims(&self) -> [usize; 4] {
        [self.out_channels, self.in_channels, self.filter_height, self.filter_width]
    }

    /// Output spatial size: `floor((dim + 2p - f) / s) + 1` per axis.
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize), ModCnnError> {
        let padded_h = height + 2 * self.padding;
        let padded_w = width + 2 * self.padding;
        if padded_h < self.filter_height || padded_w < self.filter_width {
            return Err(ModCnnError::InvalidGeometry {
                layer: "ConvolutionLayer".to_string(),
                reason: format!(
                    "filter {}x{} larger than padded input {}x{}",
                    self.filter_height, self.filter_width, padded_h, padded_w
                ),
            });
        }
        Ok((
            (padded_h - self.filter_height) / self.stride + 1,
            (padded_w - self.filter_width) / self.stride + 1,
        ))
    }
}

/// Forward-pass state needed by `backward`.
#[derive(Debug, Clone)]
struct ConvolutionCache<T> {
    /// Zero-padded copy of the forward input, reused by backward.
    padded: Vec<T>,
    input_shape: Shape4,
    pre_activation: Vec<T>,
    output_shape: Shape4,
}

/// 2-D convolution (cross-correlation) with zero padding, bias and a fused ReLU.
#[derive(Debug, Clone)]
pub struct ConvolutionLayer<T = f32> {
    geometry: ConvolutionGeometry,
    filters: ParamArray<T>,
    biases: ParamArray<T>,
    d_filters: ParamArray<T>,
    d_biases: ParamArray<T>,
    cache: Option<ConvolutionCache<T>>,
}

impl<T: Element> ConvolutionLayer<T> {
    /// Creates a layer with He-initialised filters and zero biases.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        filter_height: usize,
        filter_width: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self, ModCnnError> {
        let geometry = ConvolutionGeometry {
            in_channels,
            out_channels,
            filter_height,
            filter_width,
            stride,
            padding,
        };
        Self::with_rng(geometry, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(geometry: ConvolutionGeometry, rng: &mut R) -> Result<Self, ModCnnError> {
        geometry.validate()?;
        let dims = geometry.filter_dims();
        let fan_in = geometry.filter_height * geometry.filter_width * geometry.in_channels;
        let values = he_normal(rng, fan_in, dims.iter().product())?;
        let filters = ParamArray::new(dims.to_vec(), values)?;
        let biases = ParamArray::zeros(&[geometry.out_channels]);
        Self::from_parameters(geometry, filters, biases)
    }

    /// Builds a layer around existing parameters, e.g. when loading a checkpoint.
    pub fn from_parameters(
        geometry: ConvolutionGeometry,
        filters: ParamArray<T>,
        biases: ParamArray<T>,
    ) -> Result<Self, ModCnnError> {
        geometry.validate()?;
        let mut layer = ConvolutionLayer {
            geometry,
            filters: ParamArray::zeros(&geometry.filter_dims()),
            biases: ParamArray::zeros(&[geometry.out_channels]),
            d_filters: ParamArray::zeros(&geometry.filter_dims()),
            d_biases: ParamArray::zeros(&[geometry.out_channels]),
            cache: None,
        };
        layer.set_filters(filters)?;
        layer.set_biases(biases)?;
        Ok(layer)
    }

    // --- Accessors ---

    pub fn geometry(&self) -> &ConvolutionGeometry {
        &self.geometry
    }

    pub fn filters(&self) -> &ParamArray<T> {
        &self.filters
    }

    pub fn biases(&self) -> &ParamArray<T> {
        &self.biases
    }

    pub fn d_filters(&self) -> &ParamArray<T> {
        &self.d_filters
    }

    pub fn d_biases(&self) -> &ParamArray<T> {
        &self.d_biases
    }

    pub(crate) fn parameters_mut(&mut self) -> (&mut ParamArray<T>, &mut ParamArray<T>) {
        (&mut self.filters, &mut self.biases)
    }

    /// Replaces the filter bank. The dimensions must match exactly.
    pub fn set_filters(&mut self, filters: ParamArray<T>) -> Result<(), ModCnnError> {
        if filters.dims() != self.geometry.filter_dims() {
            return Err(ModCnnError::ShapeMismatch {
                expected: self.geometry.filter_dims().to_vec(),
                actual: filters.dims().to_vec(),
                operation: "ConvolutionLayer::set_filters".to_string(),
            });
        }
        self.filters = filters;
        Ok(())
    }

    pub fn set_biases(&mut self, biases: ParamArray<T>) -> Result<(), ModCnnError> {
        if biases.dims() != [self.geometry.out_channels] {
            return Err(ModCnnError::ShapeMismatch {
                expected: vec![self.geometry.out_channels],
                actual: biases.dims().to_vec(),
                operation: "ConvolutionLayer::set_biases".to_string(),
            });
        }
        self.biases = biases;
        Ok(())
    }

    fn pad_input(&self, input: &Tensor<T>) -> (Vec<T>, usize, usize) {
        let [n_batch, channels, height, width] = input.shape();
        let p = self.geometry.padding;
        let (ph, pw) = (height + 2 * p, width + 2 * p);
        if p == 0 {
            return (input.data().to_vec(), ph, pw);
        }
        let mut padded = vec![T::zero(); n_batch * channels * ph * pw];
        for plane in 0..n_batch * channels {
            let src = &input.data()[plane * height * width..(plane + 1) * height * width];
            let dst = &mut padded[plane * ph * pw..(plane + 1) * ph * pw];
            for h in 0..height {
                let row = (h + p) * pw + p;
                dst[row..row + width].copy_from_slice(&src[h * width..(h + 1) * width]);
            }
        }
        (padded, ph, pw)
    }
}

impl<T: Element> Layer<T> for ConvolutionLayer<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::Convolution
    }

    /// Pads, cross-correlates, adds the bias and applies ReLU.
    ///
    /// # Errors
    /// `EmptyBatch` for a zero batch size, `ChannelMismatch` when the input
    /// channel count differs from `in_channels`.
    fn forward(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let [n_batch, channels, height, width] = input.shape();
        if n_batch == 0 {
            return Err(ModCnnError::EmptyBatch {
                operation: "ConvolutionLayer::forward".to_string(),
            });
        }
        let g = self.geometry;
        if channels != g.in_channels {
            return Err(ModCnnError::ChannelMismatch {
                expected: g.in_channels,
                actual: channels,
                operation: "ConvolutionLayer::forward".to_string(),
            });
        }
        let (out_h, out_w) = g.output_size(height, width)?;
        let (padded, ph, pw) = self.pad_input(input);
        let in_sample = channels * ph * pw;
        let out_sample = g.out_channels * out_h * out_w;

        let mut output = vec![T::zero(); n_batch * out_sample];
        let mut pre_activation = vec![T::zero(); n_batch * out_sample];
        let filters = self.filters.values();
        let biases = self.biases.values();
        let f_size = g.in_channels * g.filter_height * g.filter_width;

        output
            .par_chunks_mut(out_sample)
            .zip(pre_activation.par_chunks_mut(out_sample))
            .enumerate()
            .for_each(|(n, (out, pre))| {
                let x = &padded[n * in_sample..(n + 1) * in_sample];
                for f in 0..g.out_channels {
                    let kernel = &filters[f * f_size..(f + 1) * f_size];
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut sum = T::zero();
                            for c in 0..g.in_channels {
                                for kh in 0..g.filter_height {
                                    let x_row = (c * ph + oh * g.stride + kh) * pw + ow * g.stride;
                                    let k_row = (c * g.filter_height + kh) * g.filter_width;
                                    for kw in 0..g.filter_width {
                                        sum += x[x_row + kw] * kernel[k_row + kw];
                                    }
                                }
                            }
                            sum += biases[f];
                            let idx = (f * out_h + oh) * out_w + ow;
                            pre[idx] = sum;
                            out[idx] = relu(sum);
                        }
                    }
                }
            });

        let output_shape = [n_batch, g.out_channels, out_h, out_w];
        log::trace!("ConvolutionLayer forward {:?} -> {:?}", input.shape(), output_shape);
        self.cache = Some(ConvolutionCache {
            padded,
            input_shape: input.shape(),
            pre_activation,
            output_shape,
        });
        Tensor::from_vec(output, output_shape)
    }

    /// `d_out.data()` holds dL/dOutput (before the ReLU mask). Returns
    /// dL/dInput in the returned tensor's `data`.
    ///
    /// Filter and bias gradients are recomputed from scratch on every call.
    /// Each batch sample produces a private partial filter/bias gradient; the
    /// partials are reduced once at the end. Input gradients go to disjoint
    /// per-sample slices.
    fn backward(&mut self, d_out: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let cache = self.cache.as_ref().ok_or_else(|| ModCnnError::MissingForwardCache {
            operation: "ConvolutionLayer::backward".to_string(),
        })?;
        if d_out.batch_size() == 0 {
            return Err(ModCnnError::EmptyBatch {
                operation: "ConvolutionLayer::backward".to_string(),
            });
        }
        if d_out.shape() != cache.output_shape {
            return Err(ModCnnError::ShapeMismatch {
                expected: cache.output_shape.to_vec(),
                actual: d_out.shape().to_vec(),
                operation: "ConvolutionLayer::backward".to_string(),
            });
        }

        let g = self.geometry;
        let [n_batch, _, out_h, out_w] = cache.output_shape;
        let input_shape = cache.input_shape;
        let padded = &cache.padded;
        let (ph, pw) = (input_shape[2] + 2 * g.padding, input_shape[3] + 2 * g.padding);
        let in_sample = g.in_channels * ph * pw;
        let out_sample = g.out_channels * out_h * out_w;
        let f_size = g.in_channels * g.filter_height * g.filter_width;
        let n_filter = g.out_channels * f_size;

        let mut masked = d_out.data().to_vec();
        crate::ops::activation::relu_mask_inplace(&mut masked, &cache.pre_activation);

        let filters = self.filters.values();
        let mut d_input_padded = vec![T::zero(); n_batch * in_sample];

        let (d_filters, d_biases) = d_input_padded
            .par_chunks_mut(in_sample)
            .enumerate()
            .map(|(n, dx)| {
                let x = &padded[n * in_sample..(n + 1) * in_sample];
                let grad = &masked[n * out_sample..(n + 1) * out_sample];
                let mut df = vec![T::zero(); n_filter];
                let mut db = vec![T::zero(); g.out_channels];
                for f in 0..g.out_channels {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let gv = grad[(f * out_h + oh) * out_w + ow];
                            if gv == T::zero() {
                                continue;
                            }
                            db[f] += gv;
                            for c in 0..g.in_channels {
                                for kh in 0..g.filter_height {
                                    let x_row = (c * ph + oh * g.stride + kh) * pw + ow * g.stride;
                                    let k_row = f * f_size + (c * g.filter_height + kh) * g.filter_width;
                                    for kw in 0..g.filter_width {
                                        df[k_row + kw] += gv * x[x_row + kw];
                                        dx[x_row + kw] += gv * filters[k_row + kw];
                                    }
                                }
                            }
                        }
                    }
                }
                (df, db)
            })
            .reduce(
                || (vec![T::zero(); n_filter], vec![T::zero(); g.out_channels]),
                |(mut df_a, mut db_a), (df_b, db_b)| {
                    df_a.iter_mut().zip(&df_b).for_each(|(a, &b)| *a += b);
                    db_a.iter_mut().zip(&db_b).for_each(|(a, &b)| *a += b);
                    (df_a, db_a)
                },
            );

        self.d_filters = ParamArray::new(g.filter_dims().to_vec(), d_filters)?;
        self.d_biases = ParamArray::new(vec![g.out_channels], d_biases)?;

        // Strip the padding border.
        let [_, channels, height, width] = input_shape;
        let p = g.padding;
        let mut d_input = vec![T::zero(); n_batch * channels * height * width];
        for plane in 0..n_batch * channels {
            let src = &d_input_padded[plane * ph * pw..(plane + 1) * ph * pw];
            let dst = &mut d_input[plane * height * width..(plane + 1) * height * width];
            for h in 0..height {
                let row = (h + p) * pw + p;
                dst[h * width..(h + 1) * width].copy_from_slice(&src[row..row + width]);
            }
        }
        Tensor::from_vec(d_input, input_shape)
    }

    fn zero_grad(&mut self) {
        self.d_filters.fill_zero();
        self.d_biases.fill_zero();
    }

    fn num_params(&self) -> usize {
        self.filters.len() + self.biases.len()
    }

    /// Geometry as six `u32`, then filters and biases.
    fn save(&self, writer: &mut dyn Write) -> Result<(), ModCnnError> {
        let g = &self.geometry;
        for dim in [
            g.in_channels,
            g.out_channels,
            g.filter_height,
            g.filter_width,
            g.stride,
            g.padding,
        ] {
            crate::io::checkpoint::write_dim(writer, dim)?;
        }
        for &v in self.filters.values().iter().chain(self.biases.values()) {
            v.write_le(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "convolution_test.rs"]
mod tests;
