use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("keypoint/descriptor count mismatch: {keypoints} keypoints, {descriptors} descriptors")]
    LengthMismatch { keypoints: usize, descriptors: usize },
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid NNDR ratio: {0} (must be in (0, 1])")]
    InvalidRatio(f32),
    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("invalid category `{category}`: {reason}")]
    InvalidCategory { category: String, reason: String },
    #[error("strategy order must name at least one box strategy")]
    EmptyStrategyOrder,
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serde")]
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[cfg(feature = "serde")]
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
