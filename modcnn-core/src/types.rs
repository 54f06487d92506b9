use num_traits::{Float, NumAssign};
use std::fmt::Debug;
use std::io::{Read, Write};
use std::iter::Sum;

/// Floating-point element type usable by tensors, layers and optimizers.
///
/// Restricted to `f32` and `f64`. Besides the arithmetic supplied by
/// `num_traits::Float`, an element knows how to write itself to and read
/// itself from a little-endian byte stream, which is what the checkpoint
/// format stores.
pub trait Element:
    Float + NumAssign + Sum + Default + Debug + Send + Sync + 'static
{
    /// Width of one encoded element in bytes.
    const BYTES: usize;

    /// Converts an `f64` hyperparameter or sample into this element type.
    fn from_scalar(value: f64) -> Self;

    fn write_le<W: Write + ?Sized>(self, writer: &mut W) -> std::io::Result<()>;

    fn read_le<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Self>;
}

impl Element for f32 {
    const BYTES: usize = 4;

    fn from_scalar(value: f64) -> Self {
        value as f32
    }

    fn write_le<W: Write + ?Sized>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }

    fn read_le<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Self> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        Ok(f32::from_le_bytes(bytes))
    }
}

impl Element for f64 {
    const BYTES: usize = 8;

    fn from_scalar(value: f64) -> Self {
        value
    }

    fn write_le<W: Write + ?Sized>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }

    fn read_le<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Self> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        Ok(f64::from_le_bytes(bytes))
    }
}
