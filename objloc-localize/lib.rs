//! Correspondence-to-localization pipeline.
//!
//! Descriptor matching with the ratio test, presence voting across reference
//! views, RANSAC homography verification, mean-shift clustering, bounding box
//! synthesis and IoU evaluation.

pub mod boxes;
pub mod cluster;
pub mod evaluate;
pub mod homography;
pub mod localizer;
pub mod matcher;
pub mod presence;

pub use boxes::{is_valid, min_area_rect, BoxInputs, BoxSynthesizer};
pub use cluster::{cluster, filter_by_distance, MeanShift};
pub use evaluate::{iou, Evaluation, LabelStats, LabeledBox};
pub use homography::{
    bounding_box_from_homography, fit_ransac, projected_bounds, verify, verify_with, Homography, HomographyError,
    HomographyResult, RansacFit, Verification,
};
pub use localizer::{candidate_points, DetectionOutcome, Localizer, ObjectModel, ReferenceView};
pub use matcher::{match_descriptors, passes_ratio_test, two_nearest};
pub use presence::{decide, decide_counts, match_views, rank_views, top_n, PresenceDecision, ViewMatches};
