use thiserror::Error;

/// Construction-time failures.
///
/// Everything here is raised while a graph is being assembled; there is no
/// separate runtime error path. Shape problems are caught by the static
/// shape pass before any tensor op runs.
#[derive(Debug, Error)]
pub enum UpresError {
    #[error("{stage}: expected {expected} input channels, got {actual}")]
    ChannelMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{stage}: {kernel}x{kernel} kernel does not fit {height}x{width} input")]
    KernelTooLarge {
        stage: &'static str,
        kernel: usize,
        height: usize,
        width: usize,
    },

    #[error("expected a 4D (batch, channels, height, width) tensor, got shape {shape:?}")]
    NotAnImageBatch { shape: Vec<usize> },

    #[error("shape mismatch: {expected:?} vs {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("parameter {name:?} exists with shape {existing:?}, requested {requested:?}")]
    ParamShapeConflict {
        name: String,
        existing: Vec<usize>,
        requested: Vec<usize>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, UpresError>;
