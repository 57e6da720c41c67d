use log::{debug, info};
use objloc_core::{
    BoundingRegion, BoxStrategy, CategoryConfig, ConfigResult, Correspondence, Descriptor, FeatureSet, Keypoint,
    LocalizerConfig, Point2, Size,
};
use rayon::prelude::*;

use crate::boxes::{BoxInputs, BoxSynthesizer};
use crate::homography::{verify_with, Verification};
use crate::presence::{decide_counts, match_views, rank_views};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Named exemplar of an object with its extracted features
#[derive(Debug, Clone)]
pub struct ReferenceView<D> {
    pub name: String,
    /// Pixel extent of the exemplar image
    pub size: Size,
    pub features: FeatureSet<D>,
}

/// An object category: its reference views and resolved thresholds
#[derive(Debug, Clone)]
pub struct ObjectModel<D> {
    pub key: String,
    pub views: Vec<ReferenceView<D>>,
    thresholds: CategoryConfig,
}

impl<D> ObjectModel<D> {
    /// Thresholds are looked up once here and never change afterwards
    pub fn new(key: impl Into<String>, views: Vec<ReferenceView<D>>, config: &LocalizerConfig) -> Self {
        let key = key.into();
        let thresholds = config.category(&key).clone();
        Self { key, views, thresholds }
    }

    pub fn thresholds(&self) -> &CategoryConfig {
        &self.thresholds
    }
}

/// Result for one (object, test image) pair
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectionOutcome {
    pub object: String,
    pub present: bool,
    pub best_view: Option<usize>,
    pub best_view_name: Option<String>,
    pub match_count: usize,
    pub inlier_count: usize,
    pub regions: Vec<BoundingRegion>,
    pub strategy: Option<BoxStrategy>,
}

impl DetectionOutcome {
    fn absent(object: &str, best_view: Option<usize>, best_view_name: Option<String>, match_count: usize) -> Self {
        Self {
            object: object.to_string(),
            present: false,
            best_view,
            best_view_name,
            match_count,
            inlier_count: 0,
            regions: Vec::new(),
            strategy: None,
        }
    }

    pub fn region(&self) -> Option<&BoundingRegion> {
        self.regions.first()
    }
}

/// Test-image points of correspondences whose indices are valid for both keypoint sets
pub fn candidate_points(reference: &[Keypoint], test: &[Keypoint], correspondences: &[Correspondence]) -> Vec<Point2> {
    correspondences
        .iter()
        .filter_map(|c| c.points(reference, test).map(|(_, t)| t))
        .collect()
}

/// Matching, presence voting, verification and box synthesis for a set of objects
#[derive(Debug, Clone)]
pub struct Localizer {
    config: LocalizerConfig,
    synthesizer: BoxSynthesizer,
}

impl Localizer {
    pub fn new(config: LocalizerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            synthesizer: BoxSynthesizer::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    /// One outcome per model, in model order
    pub fn localize<D>(&self, test: &FeatureSet<D>, image_size: Size, models: &[ObjectModel<D>]) -> Vec<DetectionOutcome>
    where
        D: Descriptor + Sync,
    {
        models
            .par_iter()
            .map(|model| self.localize_object(test, image_size, model))
            .collect()
    }

    pub fn localize_object<D>(&self, test: &FeatureSet<D>, image_size: Size, model: &ObjectModel<D>) -> DetectionOutcome
    where
        D: Descriptor + Sync,
    {
        let thresholds = model.thresholds();
        let views: Vec<&[D]> = model.views.iter().map(|v| v.features.descriptors()).collect();

        let all = match_views(&views, test.descriptors(), self.config.nndr_ratio);
        let counts: Vec<usize> = all.iter().map(|m| m.count()).collect();
        let decision = decide_counts(&counts, thresholds.match_threshold);
        let view_name = |i: usize| model.views.get(i).map(|v| v.name.clone());

        let Some(best_view) = decision.best_view.filter(|_| decision.present) else {
            info!(
                "{}: not enough matches ({} <= {})",
                model.key, decision.best_match_count, thresholds.match_threshold
            );
            return DetectionOutcome::absent(
                &model.key,
                decision.best_view,
                decision.best_view.and_then(view_name),
                decision.best_match_count,
            );
        };

        let ranked = rank_views(all, self.config.top_n_views);

        let mut fused: Vec<Point2> = Vec::new();
        let mut best = None;
        for view_matches in &ranked {
            let reference = &model.views[view_matches.view];
            let verification = verify_with(
                reference.features.keypoints(),
                test.keypoints(),
                &view_matches.correspondences,
                &self.config.ransac,
            );
            let points = candidate_points(reference.features.keypoints(), test.keypoints(), &verification.inliers);
            debug!(
                "{} / {}: {} of {} matches verified",
                model.key,
                reference.name,
                verification.inliers.len(),
                view_matches.count()
            );
            fused.extend_from_slice(&points);
            if view_matches.view == best_view {
                best = Some((verification, points));
            }
        }

        // the best view always ranks first, so this only guards an empty ranking
        let (verification, inlier_points) = best.unwrap_or_else(|| {
            let empty = Verification {
                inliers: Vec::new(),
                homography: None,
            };
            (empty, Vec::new())
        });

        let inputs = BoxInputs {
            inlier_points: &inlier_points,
            homography: verification.homography.as_ref(),
            reference_size: model.views[best_view].size,
            fused_points: &fused,
            category: thresholds,
            image_size,
        };
        let synthesized = self.synthesizer.synthesize(&inputs);

        let outcome = DetectionOutcome {
            object: model.key.clone(),
            present: true,
            best_view: Some(best_view),
            best_view_name: view_name(best_view),
            match_count: decision.best_match_count,
            inlier_count: verification.inliers.len(),
            regions: synthesized.iter().map(|&(_, r)| r).collect(),
            strategy: synthesized.map(|(s, _)| s),
        };

        info!(
            "{}: detected via view {} ({} matches, {} inliers, box: {})",
            outcome.object,
            outcome.best_view_name.as_deref().unwrap_or("?"),
            outcome.match_count,
            outcome.inlier_count,
            outcome.strategy.map_or("none", |s| s.name())
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objloc_core::FloatDescriptor;

    const IMAGE: Size = Size::new(640.0, 480.0);

    fn descriptor(k: usize, offset: f32) -> FloatDescriptor {
        FloatDescriptor::new(vec![k as f32 * 10.0 + offset, 0.0])
    }

    /// 5x4 grid of keypoints with distinct descriptors
    fn reference_view(name: &str, offset: f32) -> ReferenceView<FloatDescriptor> {
        let keypoints: Vec<Keypoint> = (0..20)
            .map(|k| Keypoint::new(10.0 + (k % 5) as f32 * 20.0, 10.0 + (k / 5) as f32 * 20.0))
            .collect();
        let descriptors = (0..20).map(|k| descriptor(k, offset)).collect();
        ReferenceView {
            name: name.to_string(),
            size: Size::new(100.0, 80.0),
            features: FeatureSet::new(keypoints, descriptors).unwrap(),
        }
    }

    /// The reference grid shifted by (100, 50), plus unrelated clutter
    fn test_features() -> FeatureSet<FloatDescriptor> {
        let mut keypoints: Vec<Keypoint> = (0..20)
            .map(|k| Keypoint::new(110.0 + (k % 5) as f32 * 20.0, 60.0 + (k / 5) as f32 * 20.0))
            .collect();
        let mut descriptors: Vec<FloatDescriptor> = (0..20).map(|k| descriptor(k, 0.0)).collect();
        for i in 0..5 {
            keypoints.push(Keypoint::new(500.0 + i as f32 * 7.0, 400.0));
            descriptors.push(FloatDescriptor::new(vec![0.0, 1000.0 + i as f32 * 50.0]));
        }
        FeatureSet::new(keypoints, descriptors).unwrap()
    }

    fn model(key: &str, views: Vec<ReferenceView<FloatDescriptor>>, config: &LocalizerConfig) -> ObjectModel<FloatDescriptor> {
        ObjectModel::new(key, views, config)
    }

    #[test]
    fn test_candidate_points_skip_out_of_range() {
        let reference = [Keypoint::new(0.0, 0.0)];
        let test = [Keypoint::new(5.0, 6.0)];
        let corrs = [Correspondence::new(0, 0, 0.0), Correspondence::new(0, 9, 0.0), Correspondence::new(4, 0, 0.0)];
        assert_eq!(candidate_points(&reference, &test, &corrs), vec![Point2::new(5.0, 6.0)]);
    }

    #[test]
    fn test_detects_translated_object() {
        let config = LocalizerConfig::default();
        let localizer = Localizer::new(config.clone()).unwrap();
        let models = vec![model(
            "sugar_box",
            vec![reference_view("side", 5.0), reference_view("front", 0.0)],
            &config,
        )];

        let outcomes = localizer.localize(&test_features(), IMAGE, &models);
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.present);
        assert_eq!(outcome.best_view, Some(1));
        assert_eq!(outcome.best_view_name.as_deref(), Some("front"));
        assert_eq!(outcome.match_count, 20);
        assert_eq!(outcome.inlier_count, 20);
        assert_eq!(outcome.strategy, Some(BoxStrategy::Adaptive));

        let envelope = outcome.region().unwrap().envelope();
        assert!(envelope.x < 110.0 && envelope.right() > 190.0);
        assert!(envelope.y < 60.0 && envelope.bottom() > 120.0);
        assert!(envelope.within(IMAGE));
    }

    #[test]
    fn test_ambiguous_object_is_absent() {
        let config = LocalizerConfig::default();
        let localizer = Localizer::new(config.clone()).unwrap();
        let models = vec![model("mustard", vec![reference_view("only", 5.0)], &config)];

        let outcome = &localizer.localize(&test_features(), IMAGE, &models)[0];
        assert!(!outcome.present);
        // only the last grid descriptor has a single nearest neighbour
        assert_eq!(outcome.match_count, 1);
        assert!(outcome.regions.is_empty());
        assert_eq!(outcome.strategy, None);
    }

    #[test]
    fn test_model_without_views() {
        let config = LocalizerConfig::default();
        let localizer = Localizer::new(config.clone()).unwrap();
        let models = vec![model("empty", Vec::new(), &config)];
        let outcome = &localizer.localize(&test_features(), IMAGE, &models)[0];
        assert!(!outcome.present);
        assert_eq!(outcome.best_view, None);
    }

    #[test]
    fn test_too_few_inliers_uses_cluster_fallback() {
        let strict = CategoryConfig {
            min_inliers: 50,
            ..CategoryConfig::default()
        };
        let config = LocalizerConfig::default().with_category("drill", strict);
        let localizer = Localizer::new(config.clone()).unwrap();
        let models = vec![model("drill", vec![reference_view("front", 0.0)], &config)];

        let outcome = &localizer.localize(&test_features(), IMAGE, &models)[0];
        assert!(outcome.present);
        assert_eq!(outcome.strategy, Some(BoxStrategy::ClusterFallback));
        assert!(matches!(outcome.region(), Some(BoundingRegion::Oriented(_))));
    }

    #[test]
    fn test_model_thresholds_resolved_at_construction() {
        let drill = CategoryConfig {
            match_threshold: 25,
            ..CategoryConfig::default()
        };
        let config = LocalizerConfig::default().with_category("drill", drill.clone());
        assert_eq!(model("drill", Vec::new(), &config).thresholds(), &drill);
        assert_eq!(model("mug", Vec::new(), &config).thresholds(), &config.default_category);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LocalizerConfig {
            nndr_ratio: 1.5,
            ..LocalizerConfig::default()
        };
        assert!(Localizer::new(config).is_err());
    }
}
