use objloc_core::{ConfigError, CoreError};
use objloc_features::FeatureError;
use thiserror::Error;

use crate::dataset::DatasetError;

/// Errors surfaced by the dataset runner
#[derive(Debug, Error)]
pub enum CliError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("feature extraction error: {0}")]
    Feature(#[from] FeatureError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;
