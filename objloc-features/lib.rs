//! Multi-scale FAST-9 keypoints with steered 256-bit BRIEF descriptors.
//!
//! Produces the `FeatureSet<BinaryDescriptor>` consumed by the localizer. An
//! optional mask restricts detection to the object region of a reference view.

pub mod brief;
pub mod detector;
pub mod error;
pub mod pyramid;

pub use brief::BriefGenerator;
pub use detector::{FastDetector, ScoredKeypoint};
pub use error::{FeatureError, FeatureResult};
pub use pyramid::{ImagePyramid, ScaleLevel};

use log::debug;
use objloc_core::{BinaryDescriptor, FeatureSet, Keypoint};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Extractor parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtractorConfig {
    /// FAST intensity threshold
    pub threshold: u8,
    /// Side of the orientation / descriptor patch, odd
    pub patch_size: usize,
    pub n_levels: usize,
    pub scale_factor: f32,
    /// Strongest keypoints kept across all levels
    pub max_features: usize,
    pub nms_radius: f32,
    /// Seed of the BRIEF sampling pattern
    pub pattern_seed: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            patch_size: 31,
            n_levels: 8,
            scale_factor: 1.2,
            max_features: 1000,
            nms_radius: 3.0,
            pattern_seed: 0,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> FeatureResult<()> {
        if self.threshold == 0 || self.threshold > 127 {
            return Err(FeatureError::InvalidThreshold(self.threshold));
        }
        if self.patch_size % 2 == 0 || self.patch_size < 7 {
            return Err(FeatureError::InvalidPatchSize(self.patch_size));
        }
        if self.n_levels == 0 || !(self.scale_factor > 1.0) {
            return Err(FeatureError::InvalidPyramid {
                levels: self.n_levels,
                scale_factor: self.scale_factor,
            });
        }
        if self.max_features == 0 {
            return Err(FeatureError::InvalidValue {
                field: "max_features",
                value: 0.0,
            });
        }
        if !(self.nms_radius >= 0.0) {
            return Err(FeatureError::InvalidValue {
                field: "nms_radius",
                value: self.nms_radius,
            });
        }
        Ok(())
    }
}

/// Detector + descriptor pipeline
#[derive(Debug, Clone)]
pub struct OrbExtractor {
    config: ExtractorConfig,
    detector: FastDetector,
    brief: BriefGenerator,
}

impl OrbExtractor {
    pub fn new(config: ExtractorConfig) -> FeatureResult<Self> {
        config.validate()?;
        Ok(Self {
            detector: FastDetector::new(config.threshold, config.patch_size, config.nms_radius),
            brief: BriefGenerator::new(config.patch_size, config.pattern_seed),
            config,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract keypoints (base-image coordinates) and descriptors from a grayscale image.
    ///
    /// Mask pixels equal to zero are excluded from detection.
    pub fn extract(
        &self,
        img: &[u8],
        width: usize,
        height: usize,
        mask: Option<&[u8]>,
    ) -> FeatureResult<FeatureSet<BinaryDescriptor>> {
        if width == 0 || height == 0 {
            return Err(FeatureError::InvalidImageSize { width, height });
        }
        let expected_len = width * height;
        if img.len() != expected_len {
            return Err(FeatureError::InvalidImageData {
                expected_len,
                actual_len: img.len(),
            });
        }
        if let Some(m) = mask {
            if m.len() != expected_len {
                return Err(FeatureError::InvalidMask {
                    expected_len,
                    actual_len: m.len(),
                });
            }
        }

        let levels = ImagePyramid::generate_scale_levels(width, height, self.config.scale_factor, self.config.n_levels);
        let pyramid = ImagePyramid::build(img, width, height, &levels);
        let masks = mask.map(|m| ImagePyramid::build_mask(m, width, height, &levels));

        let per_level: Vec<Vec<(Keypoint, BinaryDescriptor)>> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .enumerate()
            .map(|(i, (level, level_img))| {
                let level_mask = masks.as_ref().map(|m| m[i].as_slice());
                self.extract_level(level_img, level, level_mask)
            })
            .collect();

        let mut features: Vec<(Keypoint, BinaryDescriptor)> = per_level.into_iter().flatten().collect();
        features.sort_by(|a, b| b.0.response.total_cmp(&a.0.response));
        features.truncate(self.config.max_features);

        debug!(
            "extracted {} keypoints over {} levels ({}x{})",
            features.len(),
            levels.len(),
            width,
            height
        );

        let (keypoints, descriptors): (Vec<_>, Vec<_>) = features.into_iter().unzip();
        Ok(FeatureSet::new(keypoints, descriptors)?)
    }

    fn extract_level(&self, img: &[u8], level: &ScaleLevel, mask: Option<&[u8]>) -> Vec<(Keypoint, BinaryDescriptor)> {
        let (w, h) = (level.width, level.height);
        let mut keypoints: Vec<Keypoint> = self
            .detector
            .detect(img, level, mask)
            .into_iter()
            .map(|sk| sk.keypoint)
            .collect();

        for kp in keypoints.iter_mut() {
            kp.angle = detector::compute_orientation(img, w, h, kp.x, kp.y, self.config.patch_size);
        }

        let smoothed = brief::smooth(img, w, h);
        let descriptors = self.brief.describe(&smoothed, w, h, &keypoints);

        keypoints
            .into_iter()
            .zip(descriptors)
            .map(|(mut kp, d)| {
                kp.x *= level.scale;
                kp.y *= level.scale;
                kp.size = self.config.patch_size as f32 * level.scale;
                (kp, d)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Bright squares of several sizes on a dark background
    fn create_test_image(width: usize, height: usize) -> Vec<u8> {
        let mut img = vec![20u8; width * height];
        for &(x0, y0, side) in &[(20usize, 20usize, 30usize), (80, 30, 20), (40, 90, 40), (110, 100, 25)] {
            for y in y0..(y0 + side).min(height) {
                for x in x0..(x0 + side).min(width) {
                    img[y * width + x] = 220;
                }
            }
        }
        img
    }

    #[test]
    fn test_config_validation() {
        assert!(ExtractorConfig::default().validate().is_ok());
        let bad_threshold = ExtractorConfig { threshold: 0, ..Default::default() };
        assert!(matches!(bad_threshold.validate(), Err(FeatureError::InvalidThreshold(0))));
        let even_patch = ExtractorConfig { patch_size: 30, ..Default::default() };
        assert!(matches!(even_patch.validate(), Err(FeatureError::InvalidPatchSize(30))));
        let flat_pyramid = ExtractorConfig { scale_factor: 1.0, ..Default::default() };
        assert!(matches!(flat_pyramid.validate(), Err(FeatureError::InvalidPyramid { .. })));
    }

    #[test]
    fn test_invalid_image_data() {
        let extractor = OrbExtractor::new(ExtractorConfig::default()).unwrap();
        let result = extractor.extract(&[0u8; 10], 4, 4, None);
        assert!(matches!(result, Err(FeatureError::InvalidImageData { expected_len: 16, actual_len: 10 })));
        let result = extractor.extract(&[0u8; 16], 4, 4, Some(&[0u8; 3]));
        assert!(matches!(result, Err(FeatureError::InvalidMask { .. })));
        assert!(matches!(extractor.extract(&[], 0, 4, None), Err(FeatureError::InvalidImageSize { .. })));
    }

    #[test]
    fn test_extract_finds_features() {
        let (w, h) = (160, 160);
        let img = create_test_image(w, h);
        let extractor = OrbExtractor::new(ExtractorConfig::default()).unwrap();
        let features = extractor.extract(&img, w, h, None).unwrap();

        assert!(!features.is_empty());
        assert_eq!(features.keypoints().len(), features.descriptors().len());
        for kp in features.keypoints() {
            assert!(kp.x >= 0.0 && kp.x < w as f32);
            assert!(kp.y >= 0.0 && kp.y < h as f32);
            assert!(kp.size >= 31.0);
        }
    }

    #[test]
    fn test_max_features_cap() {
        let (w, h) = (160, 160);
        let img = create_test_image(w, h);
        let config = ExtractorConfig { max_features: 3, ..Default::default() };
        let extractor = OrbExtractor::new(config).unwrap();
        let features = extractor.extract(&img, w, h, None).unwrap();
        assert!(features.len() <= 3);
        let responses: Vec<f32> = features.keypoints().iter().map(|k| k.response).collect();
        assert!(responses.windows(2).all(|p| p[0] >= p[1]));
    }

    #[test]
    fn test_zero_mask_yields_nothing() {
        let (w, h) = (160, 160);
        let img = create_test_image(w, h);
        let mask = vec![0u8; w * h];
        let extractor = OrbExtractor::new(ExtractorConfig::default()).unwrap();
        let features = extractor.extract(&img, w, h, Some(&mask)).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let (w, h) = (160, 160);
        let img = create_test_image(w, h);
        let extractor = OrbExtractor::new(ExtractorConfig::default()).unwrap();
        let a = extractor.extract(&img, w, h, None).unwrap();
        let b = extractor.extract(&img, w, h, None).unwrap();
        assert_eq!(a, b);
    }

    fn squares_image(width: usize, height: usize, squares: &[(usize, usize, usize)]) -> Vec<u8> {
        let mut img = vec![30u8; width * height];
        for &(x0, y0, side) in squares {
            for y in y0..(y0 + side).min(height) {
                for x in x0..(x0 + side).min(width) {
                    img[y * width + x] = 210;
                }
            }
        }
        img
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_features_respect_mask_and_cap(
            squares in prop::collection::vec((0usize..100, 0usize..100, 8usize..40), 1..6),
            max_features in 1usize..200,
        ) {
            let (w, h) = (128, 128);
            let img = squares_image(w, h, &squares);
            let half = w / 2;
            let mask: Vec<u8> = (0..w * h).map(|i| if i % w < half { 255 } else { 0 }).collect();
            let config = ExtractorConfig { max_features, ..Default::default() };
            let extractor = OrbExtractor::new(config).unwrap();

            let features = extractor.extract(&img, w, h, Some(&mask)).unwrap();
            prop_assert!(features.len() <= max_features);
            prop_assert_eq!(features.keypoints().len(), features.descriptors().len());
            for kp in features.keypoints() {
                prop_assert!(kp.x >= 0.0 && kp.x < half as f32);
                prop_assert!(kp.y >= 0.0 && kp.y < h as f32);
            }
        }
    }
}
