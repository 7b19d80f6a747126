//! Error types for the VAE-WGAN training library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized or inconsistent configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required call argument was not supplied
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Tensor shape does not match what the operation expects
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Tensors of one computation live on different devices
    #[error("Device mismatch in {context}: expected {expected}, got {actual}")]
    DeviceMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// A loss evaluated to NaN or infinity
    #[error("Non-finite value in {0}")]
    NonFinite(String),

    /// Image corpus could not be used
    #[error("Data error: {0}")]
    DataError(String),

    /// libtorch error
    #[error("Torch error: {0}")]
    TorchError(#[from] tch::TchError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    /// TOML write error
    #[error("TOML write error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl Error {
    /// Build a shape mismatch from two shapes
    pub fn shape(context: &str, expected: &[i64], actual: &[i64]) -> Self {
        Error::ShapeMismatch {
            context: context.to_string(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Build a device mismatch from two devices
    pub fn device(context: &str, expected: tch::Device, actual: tch::Device) -> Self {
        Error::DeviceMismatch {
            context: context.to_string(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Whether the error aborts only the current training step
    pub fn is_step_error(&self) -> bool {
        matches!(
            self,
            Error::MissingArgument(_)
                | Error::ShapeMismatch { .. }
                | Error::DeviceMismatch { .. }
                | Error::NonFinite(_)
        )
    }
}

/// Fail with `DeviceMismatch` unless `tensor` lives on `expected`
pub(crate) fn ensure_device(
    context: &str,
    expected: tch::Device,
    tensor: &tch::Tensor,
) -> Result<()> {
    let actual = tensor.device();
    if actual != expected {
        return Err(Error::device(context, expected, actual));
    }
    Ok(())
}
