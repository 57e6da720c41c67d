//! Reference-to-test homography estimation.
//!
//! - Direct Linear Transform (DLT) with Hartley normalization.
//! - Seeded RANSAC with adaptive iteration count and a refit on the consensus set.
//! - Correspondence verification and projection of the reference extent.

use log::debug;
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use objloc_core::{Correspondence, Keypoint, Point2, RansacConfig, Rect, Size};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use thiserror::Error;

/// Sample size of the minimal solver
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HomographyError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("source and destination lengths differ: {src} vs {dst}")]
    LengthMismatch { src: usize, dst: usize },
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },
}

pub type HomographyResult<T> = Result<T, HomographyError>;

/// 3x3 projective transform from reference-view to test-image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Project a point; `None` when it maps to infinity
    pub fn project(&self, p: Point2) -> Option<Point2> {
        let v = self.0 * Vector3::new(p.x as f64, p.y as f64, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        let (x, y) = (v[0] / v[2], v[1] / v[2]);
        (x.is_finite() && y.is_finite()).then(|| Point2::new(x as f32, y as f32))
    }

    /// Distance between the projected source and the destination
    pub fn reprojection_error(&self, src: Point2, dst: Point2) -> f64 {
        match self.project(src) {
            Some(p) => ((p.x - dst.x) as f64).hypot((p.y - dst.y) as f64),
            None => f64::INFINITY,
        }
    }

    fn is_valid(&self) -> bool {
        self.0.iter().all(|v| v.is_finite()) && self.0.determinant().abs() > 1e-12
    }
}

/// Translate the centroid to the origin and scale the mean distance to sqrt(2)
fn normalize_points(pts: &[Point2]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y as f64).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| (p.x as f64 - cx).hypot(p.y as f64 - cy))
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| [s * (p.x as f64 - cx), s * (p.y as f64 - cy)])
        .collect();

    (t, normalized)
}

/// Homography from four or more correspondences, least squares beyond four
pub fn estimate_dlt(src: &[Point2], dst: &[Point2]) -> HomographyResult<Homography> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let [sx, sy] = src_n[i];
        let [dx, dy] = dst_n[i];

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of the smallest eigenvalue of A^T A
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
        .map(|(i, _)| i)
        .ok_or_else(|| HomographyError::NumericalFailure("empty eigen decomposition".into()))?;
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("T_dst not invertible".into()))?;
    let mut m = t_dst_inv * h_norm * t_src;

    let scale = m[(2, 2)];
    if scale.abs() > 1e-15 {
        m /= scale;
    }

    let homography = Homography(m);
    if !homography.is_valid() {
        return Err(HomographyError::NumericalFailure("singular homography".into()));
    }
    Ok(homography)
}

/// Consensus found by RANSAC
#[derive(Debug, Clone, PartialEq)]
pub struct RansacFit {
    pub homography: Homography,
    pub inlier_mask: Vec<bool>,
    pub inlier_count: usize,
}

fn collinear(a: Point2, b: Point2, c: Point2) -> bool {
    let (abx, aby) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let (acx, acy) = ((c.x - a.x) as f64, (c.y - a.y) as f64);
    let cross = abx * acy - aby * acx;
    cross.abs() <= 1e-6 * abx.hypot(aby) * acx.hypot(acy) + 1e-9
}

/// Any three of the four sample points on a line
fn degenerate_sample(pts: &[Point2; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES
        .iter()
        .any(|&(i, j, k)| collinear(pts[i], pts[j], pts[k]))
}

fn consensus(h: &Homography, src: &[Point2], dst: &[Point2], threshold: f64) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| h.reprojection_error(s, d) < threshold)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Iterations needed to draw one all-inlier sample with the given confidence
fn required_iterations(inlier_ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let p_good = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if p_good <= f64::EPSILON {
        return max_iterations;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if needed.is_finite() && needed >= 0.0 {
        (needed.ceil() as usize).min(max_iterations)
    } else {
        max_iterations
    }
}

/// Fit a homography with RANSAC, then refit on the consensus set
pub fn fit_ransac(src: &[Point2], dst: &[Point2], config: &RansacConfig) -> HomographyResult<RansacFit> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }

    let threshold = config.threshold as f64;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<RansacFit> = None;
    let mut iterations = config.max_iterations;
    let mut iter = 0;

    while iter < iterations {
        iter += 1;

        let idx = sample(&mut rng, n, MIN_CORRESPONDENCES);
        let s4 = [src[idx.index(0)], src[idx.index(1)], src[idx.index(2)], src[idx.index(3)]];
        let d4 = [dst[idx.index(0)], dst[idx.index(1)], dst[idx.index(2)], dst[idx.index(3)]];
        if degenerate_sample(&s4) || degenerate_sample(&d4) {
            continue;
        }

        let h = match estimate_dlt(&s4, &d4) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let (mask, count) = consensus(&h, src, dst, threshold);
        if best.as_ref().map_or(true, |b| count > b.inlier_count) {
            iterations = required_iterations(count as f64 / n as f64, config.confidence, config.max_iterations);
            best = Some(RansacFit {
                homography: h,
                inlier_mask: mask,
                inlier_count: count,
            });
        }
    }

    let best = match best {
        Some(b) if b.inlier_count >= MIN_CORRESPONDENCES => b,
        Some(b) => {
            return Err(HomographyError::InsufficientInliers {
                needed: MIN_CORRESPONDENCES,
                found: b.inlier_count,
            })
        }
        None => return Err(HomographyError::NumericalFailure("no non-degenerate sample".into())),
    };

    let (inlier_src, inlier_dst): (Vec<Point2>, Vec<Point2>) = best
        .inlier_mask
        .iter()
        .zip(src.iter().zip(dst))
        .filter(|(&m, _)| m)
        .map(|(_, (&s, &d))| (s, d))
        .unzip();

    let refit = estimate_dlt(&inlier_src, &inlier_dst)
        .ok()
        .map(|h| {
            let (mask, count) = consensus(&h, src, dst, threshold);
            RansacFit {
                homography: h,
                inlier_mask: mask,
                inlier_count: count,
            }
        })
        .filter(|r| r.inlier_count >= best.inlier_count);

    let fit = refit.unwrap_or(best);
    debug!("RANSAC: {}/{} inliers after {} iterations", fit.inlier_count, n, iter);
    Ok(fit)
}

/// Verified correspondences and the transform that supports them
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub inliers: Vec<Correspondence>,
    /// `None` when too few correspondences or no consensus; `inliers` is then the input
    pub homography: Option<Homography>,
}

/// Correspondences with both endpoints in range, as parallel point lists
fn correspondence_points(
    reference: &[Keypoint],
    test: &[Keypoint],
    correspondences: &[Correspondence],
) -> (Vec<usize>, Vec<Point2>, Vec<Point2>) {
    let mut kept = Vec::with_capacity(correspondences.len());
    let mut src = Vec::with_capacity(correspondences.len());
    let mut dst = Vec::with_capacity(correspondences.len());
    for (i, c) in correspondences.iter().enumerate() {
        if let Some((r, t)) = c.points(reference, test) {
            kept.push(i);
            src.push(r);
            dst.push(t);
        }
    }
    (kept, src, dst)
}

/// Keep exactly the RANSAC inliers; degenerate input comes back unchanged
pub fn verify_with(
    reference: &[Keypoint],
    test: &[Keypoint],
    correspondences: &[Correspondence],
    config: &RansacConfig,
) -> Verification {
    let unchanged = || Verification {
        inliers: correspondences.to_vec(),
        homography: None,
    };

    if correspondences.len() < MIN_CORRESPONDENCES {
        return unchanged();
    }

    let (kept, src, dst) = correspondence_points(reference, test, correspondences);
    match fit_ransac(&src, &dst, config) {
        Ok(fit) => Verification {
            inliers: kept
                .iter()
                .zip(&fit.inlier_mask)
                .filter(|(_, &m)| m)
                .map(|(&i, _)| correspondences[i])
                .collect(),
            homography: Some(fit.homography),
        },
        Err(e) => {
            debug!("verification kept all {} correspondences: {}", correspondences.len(), e);
            unchanged()
        }
    }
}

/// RANSAC inlier filter with default settings and the given reprojection threshold
pub fn verify(
    reference: &[Keypoint],
    test: &[Keypoint],
    correspondences: &[Correspondence],
    ransac_threshold: f32,
) -> Vec<Correspondence> {
    verify_with(reference, test, correspondences, &RansacConfig::with_threshold(ransac_threshold)).inliers
}

/// Bounding rectangle of the projected reference extent, unpadded and unclipped
pub fn projected_bounds(h: &Homography, reference_size: Size) -> Option<Rect> {
    let (w, ht) = (reference_size.width, reference_size.height);
    let corners = [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, ht),
        Point2::new(0.0, ht),
    ];
    let projected: Option<Vec<Point2>> = corners.iter().map(|&c| h.project(c)).collect();
    Rect::bounding(&projected?)
}

/// Projected reference extent, padded per side and clipped to the image.
///
/// Empty rectangle with fewer than four usable correspondences or when no fit exists.
pub fn bounding_box_from_homography(
    reference: &[Keypoint],
    test: &[Keypoint],
    correspondences: &[Correspondence],
    reference_size: Size,
    image_size: Size,
    padding: f32,
    config: &RansacConfig,
) -> Rect {
    let (_, src, dst) = correspondence_points(reference, test, correspondences);
    fit_ransac(&src, &dst, config)
        .ok()
        .and_then(|fit| projected_bounds(&fit.homography, reference_size))
        .map(|r| r.expanded(padding).clipped(image_size))
        .unwrap_or_default()
}
