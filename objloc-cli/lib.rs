//! Dataset runner for keypoint-based object localization: loads reference views and
//! test images, localizes every object, scores against annotations and renders results.

pub mod dataset;
pub mod error;
pub mod ground_truth;
pub mod render;
pub mod run;

pub use dataset::{DatasetError, DatasetLoader, DatasetResult, FileSystemLoader, ModelView};
pub use error::{CliError, CliResult};
pub use ground_truth::{canonical_label, load_ground_truth, parse_ground_truth};
pub use run::{ImageReport, Preprocessing, RunOptions, RunReport, Runner};

pub use objloc_core::{self, LocalizerConfig};
pub use objloc_features::{self, ExtractorConfig, OrbExtractor};
pub use objloc_localize::{self, DetectionOutcome, Evaluation, Localizer};

use image::DynamicImage;
use objloc_core::{BinaryDescriptor, Size};
use objloc_localize::ObjectModel;

/// Feature extraction and localization configured together
pub struct Pipeline {
    extractor: OrbExtractor,
    localizer: Localizer,
}

impl Pipeline {
    /// Validates both configurations and sizes the global thread pool
    pub fn new(config: LocalizerConfig, extractor_config: ExtractorConfig) -> CliResult<Self> {
        objloc_core::init_thread_pool(config.threads)?;
        Ok(Self {
            extractor: OrbExtractor::new(extractor_config)?,
            localizer: Localizer::new(config)?,
        })
    }

    pub fn extractor(&self) -> &OrbExtractor {
        &self.extractor
    }

    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    /// Localize the given objects in a single image
    pub fn localize_image(
        &self,
        image: &DynamicImage,
        models: &[ObjectModel<BinaryDescriptor>],
        preprocessing: &Preprocessing,
    ) -> CliResult<Vec<DetectionOutcome>> {
        let gray = run::preprocess(image, preprocessing);
        let features = run::extract_gray(&self.extractor, &gray, None)?;
        let (w, h) = gray.dimensions();
        Ok(self.localizer.localize(&features, Size::from_dimensions(w, h), models))
    }

    pub fn runner<'a, L: DatasetLoader + Sync>(&'a self, loader: &'a L, options: RunOptions) -> Runner<'a, L> {
        Runner::new(loader, &self.extractor, &self.localizer, options)
    }
}
