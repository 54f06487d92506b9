//! Little-endian checkpoint layout:
//!
//! ```text
//! u32 layer_count
//! repeated layer_count times:
//!   i32 discriminant            (0 conv, 1 pool, 2 fc)
//!   conv: u32 in_channels, out_channels, filter_height, filter_width, stride, padding,
//!         filters, biases
//!   pool: u32 pool_height, pool_width, stride, padding
//!   fc:   u32 in_features, out_features, weights, biases, u8 activated
//! ```
//!
//! Parameters are stored as the element type's little-endian bytes.

use crate::error::ModCnnError;
use crate::nn::layers::{
    AnyLayer, ConvolutionGeometry, ConvolutionLayer, FullyConnectedLayer, Layer, LayerKind, MaxPoolingLayer,
    PoolingGeometry,
};
use crate::tensor::ParamArray;
use crate::types::Element;
use std::io::{self, Read, Write};

/// Upper bound on the up-front allocation for one parameter array, so a
/// corrupt count fails on truncation instead of on allocation.
const MAX_PREALLOCATED_ELEMENTS: usize = 1 << 20;

/// A layer read back from a checkpoint, with its operation's activation flag.
#[derive(Debug, Clone)]
pub struct LoadedLayer<T = f32> {
    pub layer: AnyLayer<T>,
    /// Only meaningful for fully-connected layers; `true` otherwise.
    pub activated: bool,
}

fn truncated(err: io::Error, what: &str) -> ModCnnError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ModCnnError::CheckpointFormat(format!("truncated while reading {}", what))
    } else {
        ModCnnError::Io(err)
    }
}

// --- Primitive fields ---

pub(crate) fn write_dim(writer: &mut dyn Write, dim: usize) -> Result<(), ModCnnError> {
    let value = u32::try_from(dim)
        .map_err(|_| ModCnnError::CheckpointFormat(format!("dimension {} does not fit in u32", dim)))?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_dim(reader: &mut dyn Read, what: &str) -> Result<usize, ModCnnError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(|e| truncated(e, what))?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn write_discriminant(writer: &mut dyn Write, kind: LayerKind) -> Result<(), ModCnnError> {
    writer.write_all(&kind.discriminant().to_le_bytes())?;
    Ok(())
}

fn read_discriminant(reader: &mut dyn Read) -> Result<LayerKind, ModCnnError> {
    let mut bytes = [0u8; 4];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| truncated(e, "layer discriminant"))?;
    LayerKind::from_discriminant(i32::from_le_bytes(bytes))
}

fn read_flag(reader: &mut dyn Read) -> Result<bool, ModCnnError> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .map_err(|e| truncated(e, "activation flag"))?;
    match byte[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ModCnnError::CheckpointFormat(format!(
            "activation flag must be 0 or 1, found {}",
            other
        ))),
    }
}

fn read_params<T: Element>(reader: &mut dyn Read, dims: &[usize], what: &str) -> Result<ParamArray<T>, ModCnnError> {
    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| ModCnnError::CheckpointFormat(format!("{} dimensions {:?} overflow", what, dims)))?;
    let mut values = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
    for _ in 0..count {
        values.push(T::read_le(reader).map_err(|e| truncated(e, what))?);
    }
    ParamArray::new(dims.to_vec(), values)
}

// --- Layers ---

fn load_convolution<T: Element>(reader: &mut dyn Read) -> Result<ConvolutionLayer<T>, ModCnnError> {
    let geometry = ConvolutionGeometry {
        in_channels: read_dim(reader, "convolution in_channels")?,
        out_channels: read_dim(reader, "convolution out_channels")?,
        filter_height: read_dim(reader, "convolution filter_height")?,
        filter_width: read_dim(reader, "convolution filter_width")?,
        stride: read_dim(reader, "convolution stride")?,
        padding: read_dim(reader, "convolution padding")?,
    };
    geometry.validate()?;
    let filters = read_params(reader, &geometry.filter_dims(), "convolution filters")?;
    let biases = read_params(reader, &[geometry.out_channels], "convolution biases")?;
    ConvolutionLayer::from_parameters(geometry, filters, biases)
}

fn load_max_pooling(reader: &mut dyn Read) -> Result<MaxPoolingLayer, ModCnnError> {
    let geometry = PoolingGeometry {
        pool_height: read_dim(reader, "pooling pool_height")?,
        pool_width: read_dim(reader, "pooling pool_width")?,
        stride: read_dim(reader, "pooling stride")?,
        padding: read_dim(reader, "pooling padding")?,
    };
    MaxPoolingLayer::from_geometry(geometry)
}

fn load_fully_connected<T: Element>(reader: &mut dyn Read) -> Result<(FullyConnectedLayer<T>, bool), ModCnnError> {
    let in_features = read_dim(reader, "fully-connected in_features")?;
    let out_features = read_dim(reader, "fully-connected out_features")?;
    let weights = read_params(reader, &[out_features, in_features], "fully-connected weights")?;
    let biases = read_params(reader, &[out_features], "fully-connected biases")?;
    let activated = read_flag(reader)?;
    Ok((FullyConnectedLayer::from_parameters(weights, biases)?, activated))
}

/// Writes every layer in order. `activated` is the fully-connected
/// operation's ReLU flag and is ignored for the other kinds.
///
/// # Errors
/// `Io` on write failure, `CheckpointFormat` if a dimension exceeds `u32`.
pub fn save_layers<'a, T, I>(writer: &mut dyn Write, layers: I) -> Result<(), ModCnnError>
where
    T: Element,
    I: IntoIterator<Item = (&'a AnyLayer<T>, bool)>,
    I::IntoIter: ExactSizeIterator,
{
    let layers = layers.into_iter();
    write_dim(writer, layers.len())?;
    for (layer, activated) in layers {
        let kind = layer.kind();
        write_discriminant(writer, kind)?;
        layer.save(writer)?;
        if kind == LayerKind::FullyConnected {
            writer.write_all(&[u8::from(activated)])?;
        }
    }
    Ok(())
}

/// Reads layers back in file order.
///
/// # Errors
/// `UnknownLayerDiscriminant` for an unrecognised tag, `CheckpointFormat` on
/// truncated or inconsistent data, and the layers' own geometry errors.
pub fn load_layers<T: Element>(reader: &mut dyn Read) -> Result<Vec<LoadedLayer<T>>, ModCnnError> {
    let count = read_dim(reader, "layer count")?;
    let mut layers = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
    for index in 0..count {
        let kind = read_discriminant(reader)?;
        log::trace!("checkpoint layer {}: {}", index, kind);
        let loaded: LoadedLayer<T> = match kind {
            LayerKind::Convolution => LoadedLayer {
                layer: load_convolution::<T>(reader)?.into(),
                activated: true,
            },
            LayerKind::MaxPooling => LoadedLayer {
                layer: load_max_pooling(reader)?.into(),
                activated: true,
            },
            LayerKind::FullyConnected => {
                let (layer, activated) = load_fully_connected::<T>(reader)?;
                LoadedLayer {
                    layer: layer.into(),
                    activated,
                }
            }
        };
        layers.push(loaded);
    }
    Ok(layers)
}

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod tests;
