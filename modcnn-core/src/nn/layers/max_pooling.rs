use crate::error::ModCnnError;
use crate::nn::layers::layer::{Layer, LayerKind};
use crate::tensor::{Shape4, Tensor};
use crate::types::Element;
use rayon::prelude::*;
use std::io::Write;

/// Pooling window geometry. Max pooling has no trainable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolingGeometry {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
    pub padding: usize,
}

impl PoolingGeometry {
    /// Padding must stay below the window size so every window overlaps the
    /// real input by at least one cell.
    pub fn validate(&self) -> Result<(), ModCnnError> {
        let invalid = |reason: String| ModCnnError::InvalidGeometry {
            layer: "MaxPoolingLayer".to_string(),
            reason,
        };
        if self.pool_height == 0 || self.pool_width == 0 {
            return Err(invalid("pool dimensions must be non-zero".to_string()));
        }
        if self.stride == 0 {
            return Err(invalid("stride must be non-zero".to_string()));
        }
        if self.padding >= self.pool_height || self.padding >= self.pool_width {
            return Err(invalid(format!(
                "padding {} must be smaller than the {}x{} window",
                self.padding, self.pool_height, self.pool_width
            )));
        }
        Ok(())
    }

    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize), ModCnnError> {
        let padded_h = height + 2 * self.padding;
        let padded_w = width + 2 * self.padding;
        if padded_h < self.pool_height || padded_w < self.pool_width {
            return Err(ModCnnError::InvalidGeometry {
                layer: "MaxPoolingLayer".to_string(),
                reason: format!(
                    "window {}x{} larger than padded input {}x{}",
                    self.pool_height, self.pool_width, padded_h, padded_w
                ),
            });
        }
        Ok((
            (padded_h - self.pool_height) / self.stride + 1,
            (padded_w - self.pool_width) / self.stride + 1,
        ))
    }
}

/// Position of the maximum of every pooling window, recorded at forward time.
///
/// Positions are `(row, col)` in the *padded* input plane of the same
/// `(sample, channel)`; one entry per output cell in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgMaxMap {
    input_shape: Shape4,
    output_shape: Shape4,
    positions: Vec<(usize, usize)>,
}

impl ArgMaxMap {
    pub fn input_shape(&self) -> Shape4 {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape4 {
        self.output_shape
    }

    pub fn positions(&self) -> &[(usize, usize)] {
        &self.positions
    }
}

#[derive(Debug, Clone)]
pub struct MaxPoolingLayer {
    geometry: PoolingGeometry,
    argmax: Option<ArgMaxMap>,
}

impl MaxPoolingLayer {
    pub fn new(pool_height: usize, pool_width: usize, stride: usize, padding: usize) -> Result<Self, ModCnnError> {
        Self::from_geometry(PoolingGeometry {
            pool_height,
            pool_width,
            stride,
            padding,
        })
    }

    pub fn from_geometry(geometry: PoolingGeometry) -> Result<Self, ModCnnError> {
        geometry.validate()?;
        Ok(MaxPoolingLayer { geometry, argmax: None })
    }

    pub fn geometry(&self) -> &PoolingGeometry {
        &self.geometry
    }

    /// Argmax positions of the most recent forward pass.
    pub fn argmax(&self) -> Option<&ArgMaxMap> {
        self.argmax.as_ref()
    }
}

impl<T: Element> Layer<T> for MaxPoolingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPooling
    }

    /// Window maxima. Padding cells never win: each window is clipped to the
    /// real input before scanning. Ties keep the first maximum in row-major
    /// scan order.
    fn forward(&mut self, input: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let [n_batch, channels, height, width] = input.shape();
        if n_batch == 0 {
            return Err(ModCnnError::EmptyBatch {
                operation: "MaxPoolingLayer::forward".to_string(),
            });
        }
        if channels == 0 || height == 0 || width == 0 {
            return Err(ModCnnError::InvalidGeometry {
                layer: "MaxPoolingLayer".to_string(),
                reason: format!("input {:?} has an empty dimension", input.shape()),
            });
        }
        let g = self.geometry;
        let (out_h, out_w) = g.output_size(height, width)?;
        let out_plane = out_h * out_w;
        let in_plane = height * width;

        let mut output = vec![T::zero(); n_batch * channels * out_plane];
        let mut positions = vec![(0usize, 0usize); n_batch * channels * out_plane];

        output
            .par_chunks_mut(out_plane)
            .zip(positions.par_chunks_mut(out_plane))
            .enumerate()
            .for_each(|(plane, (out, pos))| {
                let x = &input.data()[plane * in_plane..(plane + 1) * in_plane];
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        // Window bounds in unpadded coordinates, clipped to the input.
                        let h_start = (oh * g.stride).saturating_sub(g.padding);
                        let w_start = (ow * g.stride).saturating_sub(g.padding);
                        let h_end = (oh * g.stride + g.pool_height - g.padding).min(height);
                        let w_end = (ow * g.stride + g.pool_width - g.padding).min(width);

                        let mut max_val = T::neg_infinity();
                        let mut max_pos = (h_start, w_start);
                        for h in h_start..h_end {
                            for w in w_start..w_end {
                                let v = x[h * width + w];
                                if v > max_val {
                                    max_val = v;
                                    max_pos = (h, w);
                                }
                            }
                        }
                        out[oh * out_w + ow] = max_val;
                        pos[oh * out_w + ow] = (max_pos.0 + g.padding, max_pos.1 + g.padding);
                    }
                }
            });

        let output_shape = [n_batch, channels, out_h, out_w];
        log::trace!("MaxPoolingLayer forward {:?} -> {:?}", input.shape(), output_shape);
        self.argmax = Some(ArgMaxMap {
            input_shape: input.shape(),
            output_shape,
            positions,
        });
        Tensor::from_vec(output, output_shape)
    }

    /// Routes each output gradient (`d_out.data()`) to its recorded argmax.
    ///
    /// Overlapping windows that share an argmax sum their gradients. Each
    /// `(sample, channel)` plane is handled by one worker, so the scatter-add
    /// never races.
    fn backward(&mut self, d_out: &Tensor<T>) -> Result<Tensor<T>, ModCnnError> {
        let argmax = self.argmax.as_ref().ok_or_else(|| ModCnnError::MissingForwardCache {
            operation: "MaxPoolingLayer::backward".to_string(),
        })?;
        if d_out.shape() != argmax.output_shape {
            return Err(ModCnnError::ShapeMismatch {
                expected: argmax.output_shape.to_vec(),
                actual: d_out.shape().to_vec(),
                operation: "MaxPoolingLayer::backward".to_string(),
            });
        }
        let g = self.geometry;
        let [_, _, height, width] = argmax.input_shape;
        let [_, _, out_h, out_w] = argmax.output_shape;
        let (ph, pw) = (height + 2 * g.padding, width + 2 * g.padding);
        let out_plane = out_h * out_w;
        let in_plane = height * width;
        let grads = d_out.data();

        let mut d_input = vec![T::zero(); argmax.input_shape.iter().product()];
        d_input
            .par_chunks_mut(in_plane)
            .enumerate()
            .for_each(|(plane, dx)| {
                let mut padded = vec![T::zero(); ph * pw];
                let pos = &argmax.positions[plane * out_plane..(plane + 1) * out_plane];
                let grad = &grads[plane * out_plane..(plane + 1) * out_plane];
                for (&(r, c), &gv) in pos.iter().zip(grad) {
                    padded[r * pw + c] += gv;
                }
                for h in 0..height {
                    let row = (h + g.padding) * pw + g.padding;
                    dx[h * width..(h + 1) * width].copy_from_slice(&padded[row..row + width]);
                }
            });

        Tensor::from_vec(d_input, argmax.input_shape)
    }

    fn zero_grad(&mut self) {}

    fn num_params(&self) -> usize {
        0
    }

    /// Geometry as four `u32`.
    fn save(&self, writer: &mut dyn Write) -> Result<(), ModCnnError> {
        let g = &self.geometry;
        for dim in [g.pool_height, g.pool_width, g.stride, g.padding] {
            crate::io::checkpoint::write_dim(writer, dim)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "max_pooling_test.rs"]
mod tests;
