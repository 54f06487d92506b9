use thiserror::Error;

/// Custom error type for the modcnn training core.
#[derive(Error, Debug)]
pub enum ModCnnError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Channel mismatch in {operation}: layer expects {expected} input channels, got {actual}")]
    ChannelMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Empty batch passed to {operation}")]
    EmptyBatch { operation: String },

    /// Gradient buffer (or optimizer state) does not line up with the parameter it updates.
    #[error("Out of range in {operation}: {what} has dims {actual:?}, parameter has dims {expected:?}")]
    OutOfRange {
        operation: String,
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{operation}: backward called without a prior forward pass")]
    MissingForwardCache { operation: String },

    #[error("Unknown layer type: {0}")]
    UnknownLayerType(String),

    #[error("Unknown layer discriminant {0} in checkpoint")]
    UnknownLayerDiscriminant(i32),

    #[error("Invalid geometry for {layer}: {reason}")]
    InvalidGeometry { layer: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Checkpoint format error: {0}")]
    CheckpointFormat(String),

    #[error("No layer registered under {0}")]
    UnknownLayer(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
