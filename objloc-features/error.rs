use objloc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },
    #[error("Image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },
    #[error("Mask length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidMask { expected_len: usize, actual_len: usize },
    #[error("Invalid threshold: {0} (must be 1-127)")]
    InvalidThreshold(u8),
    #[error("Invalid patch size {0} (must be odd and at least 7)")]
    InvalidPatchSize(usize),
    #[error("Invalid pyramid: {levels} levels with scale factor {scale_factor}")]
    InvalidPyramid { levels: usize, scale_factor: f32 },
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: f32 },
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type FeatureResult<T> = Result<T, FeatureError>;
