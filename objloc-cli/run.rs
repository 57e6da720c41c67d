use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, GrayImage};
use imageproc::filter::bilateral::GaussianEuclideanColorDistance;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use log::{info, warn};
use objloc_core::{BinaryDescriptor, FeatureSet, Size};
use objloc_features::{FeatureResult, OrbExtractor};
use objloc_localize::{DetectionOutcome, Evaluation, LabeledBox, Localizer, ObjectModel, ReferenceView};
use rayon::prelude::*;
use serde::Serialize;

use crate::dataset::{DatasetLoader, ModelView};
use crate::error::CliResult;
use crate::ground_truth::{canonical_label, load_ground_truth};
use crate::render::render_outcomes;

pub const REPORT_FILE: &str = "report.json";

/// Filtering applied to every extractor input after grayscale conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessing {
    /// Edge-preserving bilateral denoising
    pub denoise: bool,
    /// Window radius; 4 gives a 9x9 window
    pub bilateral_radius: u8,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_spatial: f32,
    /// Optional Gaussian blur after denoising
    pub blur_sigma: Option<f32>,
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            denoise: true,
            bilateral_radius: 4,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_spatial: 75.0,
            blur_sigma: None,
        }
    }
}

impl Preprocessing {
    /// Grayscale conversion only
    pub fn none() -> Self {
        Self {
            denoise: false,
            ..Self::default()
        }
    }

    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        let denoised = if self.denoise {
            bilateral_filter(
                gray,
                self.bilateral_radius,
                self.bilateral_sigma_spatial,
                GaussianEuclideanColorDistance::new(self.bilateral_sigma_color),
            )
        } else {
            gray.clone()
        };
        match self.blur_sigma {
            Some(sigma) if sigma > 0.0 => gaussian_blur_f32(&denoised, sigma),
            _ => denoised,
        }
    }
}

/// Output and evaluation settings for a dataset run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Rendered images and the JSON report are written here
    pub output: Option<PathBuf>,
    /// Directory of `<test image stem>.txt` annotation files
    pub ground_truth: Option<PathBuf>,
    pub preprocessing: Preprocessing,
}

/// Outcomes for one test image
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub object_dir: String,
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub outcomes: Vec<DetectionOutcome>,
    pub ground_truth: Vec<LabeledBox>,
}

impl ImageReport {
    /// Envelopes of present detections, labeled by object key
    pub fn predictions(&self) -> Vec<LabeledBox> {
        self.outcomes
            .iter()
            .filter(|o| o.present)
            .filter_map(|o| o.region().map(|r| LabeledBox::new(o.object.clone(), r.envelope())))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub images: Vec<ImageReport>,
    pub evaluation: Evaluation,
}

/// Grayscale conversion followed by the configured filtering
pub fn preprocess(image: &DynamicImage, preprocessing: &Preprocessing) -> GrayImage {
    preprocessing.apply(&image.to_luma8())
}

pub fn extract_gray(
    extractor: &OrbExtractor,
    gray: &GrayImage,
    mask: Option<&GrayImage>,
) -> FeatureResult<FeatureSet<BinaryDescriptor>> {
    let (w, h) = gray.dimensions();
    extractor.extract(gray.as_raw(), w as usize, h as usize, mask.map(|m| m.as_raw().as_slice()))
}

fn reference_view(
    extractor: &OrbExtractor,
    view: &ModelView,
    preprocessing: &Preprocessing,
) -> FeatureResult<ReferenceView<BinaryDescriptor>> {
    let gray = preprocessing.apply(&view.image);
    let (w, h) = gray.dimensions();
    Ok(ReferenceView {
        name: view.name.clone(),
        size: Size::from_dimensions(w, h),
        features: extract_gray(extractor, &gray, view.mask.as_ref())?,
    })
}

/// Extract features of every reference view, one model per object key
pub fn build_models<L: DatasetLoader>(
    loader: &L,
    keys: &[String],
    extractor: &OrbExtractor,
    localizer: &Localizer,
    preprocessing: &Preprocessing,
) -> CliResult<Vec<ObjectModel<BinaryDescriptor>>> {
    let mut models = Vec::with_capacity(keys.len());
    for key in keys {
        let views = loader.load_model_views(key)?;
        if views.is_empty() {
            warn!("{key}: no readable reference views");
        }
        let views = views
            .par_iter()
            .map(|v| reference_view(extractor, v, preprocessing))
            .collect::<FeatureResult<Vec<_>>>()?;
        info!(
            "{key}: {} views, {} features",
            views.len(),
            views.iter().map(|v| v.features.len()).sum::<usize>()
        );
        models.push(ObjectModel::new(key.as_str(), views, localizer.config()));
    }
    Ok(models)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn annotations_for(dir: &Path, image: &Path) -> CliResult<Vec<LabeledBox>> {
    let stem = image.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    load_ground_truth(&dir.join(format!("{stem}.txt")))
}

/// Per-image evaluation with labels compared without their numeric prefix
pub fn score_image(report: &ImageReport, iou_threshold: f32) -> Evaluation {
    let canonical = |boxes: Vec<LabeledBox>| -> Vec<LabeledBox> {
        boxes
            .into_iter()
            .map(|b| LabeledBox::new(canonical_label(&b.label), b.rect))
            .collect()
    };
    Evaluation::score(
        &canonical(report.predictions()),
        &canonical(report.ground_truth.clone()),
        iou_threshold,
    )
}

/// Runs every test image of a dataset against every object model
pub struct Runner<'a, L> {
    loader: &'a L,
    extractor: &'a OrbExtractor,
    localizer: &'a Localizer,
    options: RunOptions,
}

impl<'a, L: DatasetLoader + Sync> Runner<'a, L> {
    pub fn new(loader: &'a L, extractor: &'a OrbExtractor, localizer: &'a Localizer, options: RunOptions) -> Self {
        Self {
            loader,
            extractor,
            localizer,
            options,
        }
    }

    /// `None` when the test image cannot be decoded
    fn process_image(
        &self,
        models: &[ObjectModel<BinaryDescriptor>],
        object_dir: &str,
        path: &Path,
    ) -> CliResult<Option<ImageReport>> {
        let Some(image) = self.loader.load_test_image(path) else {
            return Ok(None);
        };
        let start = Instant::now();
        let gray = preprocess(&image, &self.options.preprocessing);
        let (width, height) = gray.dimensions();
        let features = extract_gray(self.extractor, &gray, None)?;
        let outcomes = self
            .localizer
            .localize(&features, Size::from_dimensions(width, height), models);

        let name = file_name(path);
        info!(
            "{object_dir}/{name}: {} features, {} of {} objects found in {:.2?}",
            features.len(),
            outcomes.iter().filter(|o| o.present).count(),
            outcomes.len(),
            start.elapsed()
        );

        let ground_truth = match &self.options.ground_truth {
            Some(dir) => annotations_for(dir, path)?,
            None => Vec::new(),
        };

        if let Some(output) = &self.options.output {
            let dir = output.join(object_dir);
            fs::create_dir_all(&dir)?;
            let rendered = render_outcomes(&image, &outcomes, &ground_truth);
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            rendered.save(dir.join(format!("{stem}.png")))?;
        }

        Ok(Some(ImageReport {
            object_dir: object_dir.to_string(),
            image: name,
            width,
            height,
            outcomes,
            ground_truth,
        }))
    }

    pub fn run(&self) -> CliResult<RunReport> {
        // structural problems surface before anything else touches the dataset
        let required: Vec<&str> = self.localizer.config().categories.keys().map(String::as_str).collect();
        self.loader.check_integrity(&required)?;
        let keys = self.loader.list_object_keys()?;

        let models = build_models(
            self.loader,
            &keys,
            self.extractor,
            self.localizer,
            &self.options.preprocessing,
        )?;

        let mut tests = Vec::new();
        for key in &keys {
            for path in self.loader.list_test_images(key)? {
                tests.push((key.as_str(), path));
            }
        }
        info!("{} test images across {} objects", tests.len(), keys.len());

        let images: Vec<ImageReport> = tests
            .par_iter()
            .map(|(key, path)| self.process_image(&models, key, path))
            .collect::<CliResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let iou_threshold = self.localizer.config().iou_threshold;
        let evaluation = images
            .par_iter()
            .map(|r| score_image(r, iou_threshold))
            .reduce(Evaluation::new, Evaluation::merge);

        let report = RunReport { images, evaluation };
        if let Some(output) = &self.options.output {
            fs::create_dir_all(output)?;
            let file = File::create(output.join(REPORT_FILE))?;
            serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
            info!("report written to {}", output.join(REPORT_FILE).display());
        }
        Ok(report)
    }
}
