use std::collections::BTreeMap;

use crate::error::{ConfigError, ConfigResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Box synthesis strategies, tried in the configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BoxStrategy {
    /// Padded bounding rectangle of the verified test points
    Adaptive,
    /// Reference view corners projected through the fitted homography
    Homography,
    /// Mean-shift cluster enclosed by a minimum-area rectangle
    ClusterFallback,
}

impl BoxStrategy {
    pub const DEFAULT_ORDER: [BoxStrategy; 3] = [
        BoxStrategy::Adaptive,
        BoxStrategy::Homography,
        BoxStrategy::ClusterFallback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BoxStrategy::Adaptive => "adaptive",
            BoxStrategy::Homography => "homography",
            BoxStrategy::ClusterFallback => "cluster_fallback",
        }
    }
}

impl std::fmt::Display for BoxStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-category decision thresholds
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CategoryConfig {
    /// Presence requires strictly more good matches than this
    pub match_threshold: usize,
    /// Verified inliers needed before the adaptive/homography boxes are trusted
    pub min_inliers: usize,
    /// Mean-shift kernel radius in pixels
    pub bandwidth: f32,
    /// Candidate points farther than this from their centroid are dropped before clustering
    pub max_radius: f32,
    /// Adaptive box padding as a fraction of the box size, per side
    pub padding: f32,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            match_threshold: 10,
            min_inliers: 6,
            bandwidth: 40.0,
            max_radius: 150.0,
            padding: 0.18,
        }
    }
}

impl CategoryConfig {
    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding;
        self
    }

    pub fn validate(&self, category: &str) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::InvalidCategory {
            category: category.to_string(),
            reason,
        };
        if !(self.bandwidth > 0.0 && self.bandwidth.is_finite()) {
            return Err(invalid(format!("bandwidth must be positive, got {}", self.bandwidth)));
        }
        if !(self.max_radius > 0.0 && self.max_radius.is_finite()) {
            return Err(invalid(format!("max_radius must be positive, got {}", self.max_radius)));
        }
        if !(0.0..=1.0).contains(&self.padding) {
            return Err(invalid(format!("padding must be in [0, 1], got {}", self.padding)));
        }
        if self.min_inliers < 4 {
            return Err(invalid(format!("min_inliers must be at least 4, got {}", self.min_inliers)));
        }
        Ok(())
    }
}

/// Random sample consensus settings for homography fitting
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RansacConfig {
    /// Reprojection error (pixels) below which a correspondence is an inlier
    pub threshold: f32,
    pub max_iterations: usize,
    /// Target probability of drawing one all-inlier sample; drives early termination
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

impl RansacConfig {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

/// Complete localizer configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LocalizerConfig {
    /// Nearest-neighbour distance ratio for the match test
    pub nndr_ratio: f32,
    /// Reference views fused for the clustering fallback
    pub top_n_views: usize,
    /// Padding applied to the projected homography box, per side
    pub homography_padding: f32,
    /// Relative growth of the cluster rectangle side lengths
    pub cluster_padding: f32,
    /// Homography boxes larger than this multiple of the image extent are rejected
    pub max_homography_box_scale: f32,
    /// A ground truth counts as found when the best IoU is strictly above this
    pub iou_threshold: f32,
    pub strategy_order: Vec<BoxStrategy>,
    pub threads: usize,
    pub ransac: RansacConfig,
    pub default_category: CategoryConfig,
    pub categories: BTreeMap<String, CategoryConfig>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            nndr_ratio: 0.75,
            top_n_views: 3,
            homography_padding: 0.15,
            cluster_padding: 0.15,
            max_homography_box_scale: 1.0,
            iou_threshold: 0.5,
            strategy_order: BoxStrategy::DEFAULT_ORDER.to_vec(),
            threads: num_cpus::get().max(1),
            ransac: RansacConfig::default(),
            default_category: CategoryConfig::default(),
            categories: BTreeMap::new(),
        }
    }
}

impl LocalizerConfig {
    /// Thresholds tuned for the YCB sugar box, mustard bottle and power drill views
    pub fn ycb_preset() -> Self {
        let base = CategoryConfig::default();
        let mut categories = BTreeMap::new();
        categories.insert("004_sugar_box".to_string(), base.clone().with_padding(0.16));
        categories.insert("006_mustard_bottle".to_string(), base.clone().with_padding(0.16));
        categories.insert(
            "035_power_drill".to_string(),
            CategoryConfig {
                bandwidth: 60.0,
                max_radius: 200.0,
                ..base.clone().with_padding(0.20)
            },
        );
        Self {
            default_category: base,
            categories,
            ..Self::default()
        }
    }

    /// Thresholds for a category, falling back to the default entry
    pub fn category(&self, key: &str) -> &CategoryConfig {
        self.categories.get(key).unwrap_or(&self.default_category)
    }

    pub fn with_category(mut self, key: &str, category: CategoryConfig) -> Self {
        self.categories.insert(key.to_string(), category);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ransac.seed = seed;
        self
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "LocalizerConfig: ratio={}, ransac=[thr:{}px, iters:{}, seed:{}], top_n={}, strategies=[{}], categories={}, threads={}",
            self.nndr_ratio,
            self.ransac.threshold,
            self.ransac.max_iterations,
            self.ransac.seed,
            self.top_n_views,
            self.strategy_order
                .iter()
                .map(BoxStrategy::name)
                .collect::<Vec<_>>()
                .join(", "),
            self.categories.len(),
            self.threads
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.nndr_ratio > 0.0 && self.nndr_ratio <= 1.0) {
            return Err(ConfigError::InvalidRatio(self.nndr_ratio));
        }
        if !(self.ransac.threshold > 0.0 && self.ransac.threshold.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "ransac.threshold",
                value: self.ransac.threshold as f64,
            });
        }
        if self.ransac.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ransac.max_iterations",
                value: 0.0,
            });
        }
        if !(self.ransac.confidence > 0.0 && self.ransac.confidence < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "ransac.confidence",
                value: self.ransac.confidence,
            });
        }
        if self.top_n_views == 0 {
            return Err(ConfigError::InvalidValue {
                field: "top_n_views",
                value: 0.0,
            });
        }
        for (field, value) in [
            ("homography_padding", self.homography_padding),
            ("cluster_padding", self.cluster_padding),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field,
                    value: value as f64,
                });
            }
        }
        if !(self.max_homography_box_scale > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "max_homography_box_scale",
                value: self.max_homography_box_scale as f64,
            });
        }
        if !(0.0..1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "iou_threshold",
                value: self.iou_threshold as f64,
            });
        }
        if self.strategy_order.is_empty() {
            return Err(ConfigError::EmptyStrategyOrder);
        }
        self.default_category.validate("default")?;
        for (key, category) in &self.categories {
            category.validate(key)?;
        }
        Ok(())
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(LocalizerConfig::default().validate().is_ok());
        assert!(LocalizerConfig::ycb_preset().validate().is_ok());
    }

    #[test]
    fn test_category_lookup_falls_back_to_default() {
        let cfg = LocalizerConfig::ycb_preset();
        assert_eq!(cfg.category("035_power_drill").padding, 0.20);
        assert_eq!(cfg.category("006_mustard_bottle").padding, 0.16);
        assert_eq!(cfg.category("unknown_object"), &cfg.default_category);
        assert_eq!(cfg.category("unknown_object").padding, 0.18);
    }

    #[test]
    fn test_invalid_ratio() {
        let mut cfg = LocalizerConfig::default();
        cfg.nndr_ratio = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRatio(_))));
        cfg.nndr_ratio = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRatio(_))));
    }

    #[test]
    fn test_invalid_category() {
        let cfg = LocalizerConfig::default().with_category(
            "broken",
            CategoryConfig {
                bandwidth: -1.0,
                ..CategoryConfig::default()
            },
        );
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidCategory { ref category, .. }) if category == "broken"
        ));
    }

    #[test]
    fn test_empty_strategy_order() {
        let mut cfg = LocalizerConfig::default();
        cfg.strategy_order.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyStrategyOrder)));
    }

    #[test]
    fn test_summary_mentions_strategies() {
        let summary = LocalizerConfig::default().summary();
        assert!(summary.contains("adaptive, homography, cluster_fallback"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_partial_override() {
        let cfg = LocalizerConfig::from_toml(
            r#"
            nndr_ratio = 0.7
            strategy_order = ["homography", "cluster_fallback"]

            [ransac]
            seed = 42

            [categories.035_power_drill]
            padding = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.nndr_ratio, 0.7);
        assert_eq!(cfg.ransac.seed, 42);
        assert_eq!(cfg.ransac.threshold, 3.0);
        assert_eq!(
            cfg.strategy_order,
            vec![BoxStrategy::Homography, BoxStrategy::ClusterFallback]
        );
        assert_eq!(cfg.category("035_power_drill").padding, 0.2);
        assert_eq!(cfg.category("035_power_drill").min_inliers, 6);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_rejects_invalid() {
        assert!(LocalizerConfig::from_toml("nndr_ratio = 2.0").is_err());
    }
}
