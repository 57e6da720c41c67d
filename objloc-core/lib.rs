//! Shared types for keypoint-based object localization: geometry, keypoints,
//! descriptors, correspondences and the localizer configuration.

pub mod config;
pub mod error;
pub mod features;
pub mod geometry;

pub use config::{BoxStrategy, CategoryConfig, LocalizerConfig, RansacConfig};
pub use error::{ConfigError, ConfigResult, CoreError, CoreResult};
pub use features::{BinaryDescriptor, Correspondence, Descriptor, FeatureSet, FloatDescriptor, Keypoint};
pub use geometry::{BoundingRegion, OrientedRect, Point2, Rect, Size};

/// Row-major 8-bit grayscale image
pub type Image = Vec<u8>;

/// Initialize the global Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> CoreResult<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .build_global()?;
    Ok(())
}
