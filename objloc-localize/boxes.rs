use log::debug;
use objloc_core::{BoundingRegion, BoxStrategy, CategoryConfig, LocalizerConfig, OrientedRect, Point2, Rect, Size};

use crate::cluster::{cluster, filter_by_distance};
use crate::homography::{projected_bounds, Homography};

/// Cross product of vectors OA and OB
#[inline]
fn cross(o: Point2, a: Point2, b: Point2) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull by monotone chain, counter-clockwise, without collinear points
pub fn convex_hull(points: &[Point2]) -> Vec<Point2> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point2> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point2> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area enclosing rectangle by rotating calipers over the hull edges.
///
/// Fewer than three non-collinear points give a zero-height rectangle along the
/// point spread; an empty input gives the default rectangle.
pub fn min_area_rect(points: &[Point2]) -> OrientedRect {
    let hull = convex_hull(points);
    match hull.len() {
        0 => return OrientedRect::default(),
        1 => return OrientedRect::new(hull[0], Size::default(), 0.0),
        2 => {
            let (a, b) = (hull[0], hull[1]);
            let center = Point2::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5);
            let angle = (b.y - a.y).atan2(b.x - a.x).to_degrees();
            return OrientedRect::new(center, Size::new(a.distance(&b), 0.0), angle);
        }
        _ => {}
    }

    let n = hull.len();
    let mut best: Option<(f32, OrientedRect)> = None;

    for i in 0..n {
        let p1 = hull[i];
        let p2 = hull[(i + 1) % n];
        let (ex, ey) = (p2.x - p1.x, p2.y - p1.y);
        let len = ex.hypot(ey);
        if len < 1e-6 {
            continue;
        }
        let (ux, uy) = (ex / len, ey / len);
        let (vx, vy) = (-uy, ux);

        let (mut min_u, mut max_u, mut min_v, mut max_v) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
        for p in &hull {
            let (dx, dy) = (p.x - p1.x, p.y - p1.y);
            let u = dx * ux + dy * uy;
            let v = dx * vx + dy * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let (width, height) = (max_u - min_u, max_v - min_v);
        let area = width * height;
        if best.as_ref().map_or(true, |(a, _)| area < *a) {
            let (cu, cv) = ((min_u + max_u) * 0.5, (min_v + max_v) * 0.5);
            let center = Point2::new(p1.x + cu * ux + cv * vx, p1.y + cu * uy + cv * vy);
            let angle = uy.atan2(ux).to_degrees();
            best = Some((area, OrientedRect::new(center, Size::new(width, height), angle)));
        }
    }

    best.map(|(_, r)| r).unwrap_or_default()
}

/// Uniform acceptance test for every strategy
pub fn is_valid(region: &BoundingRegion, image_size: Size) -> bool {
    !region.is_degenerate() && region.within(image_size)
}

/// Padded, clipped bounding rectangle of the matched test points
pub fn adaptive_box(points: &[Point2], padding: f32, image_size: Size) -> Option<Rect> {
    Rect::bounding(points).map(|r| r.expanded(padding).clipped(image_size))
}

/// Projected reference extent; rejected when larger than `max_scale` times the image
pub fn homography_box(
    homography: &Homography,
    reference_size: Size,
    image_size: Size,
    padding: f32,
    max_scale: f32,
) -> Option<Rect> {
    let bounds = projected_bounds(homography, reference_size)?;
    if bounds.width > max_scale * image_size.width || bounds.height > max_scale * image_size.height {
        debug!(
            "homography box {:.0}x{:.0} exceeds image {:.0}x{:.0}",
            bounds.width, bounds.height, image_size.width, image_size.height
        );
        return None;
    }
    Some(bounds.expanded(padding).clipped(image_size))
}

/// Distance filter, mean-shift, minimum-area rectangle, growth, clip
pub fn cluster_box(points: &[Point2], category: &CategoryConfig, growth: f32, image_size: Size) -> Option<BoundingRegion> {
    let filtered = filter_by_distance(points, category.max_radius);
    let clustered = cluster(&filtered, category.bandwidth);
    if clustered.is_empty() {
        return None;
    }
    let rect = min_area_rect(&clustered).scaled(1.0 + growth);
    Some(BoundingRegion::Oriented(rect).clipped(image_size))
}

/// Evidence available to the box strategies for one detection
#[derive(Debug, Clone, Copy)]
pub struct BoxInputs<'a> {
    /// Test-image points of the verified correspondences of the best view
    pub inlier_points: &'a [Point2],
    pub homography: Option<&'a Homography>,
    pub reference_size: Size,
    /// Inlier test points fused over the top-ranked views
    pub fused_points: &'a [Point2],
    pub category: &'a CategoryConfig,
    pub image_size: Size,
}

/// Priority selector over the box strategies
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSynthesizer {
    pub order: Vec<BoxStrategy>,
    pub homography_padding: f32,
    pub cluster_growth: f32,
    pub max_homography_box_scale: f32,
}

impl Default for BoxSynthesizer {
    fn default() -> Self {
        Self::from_config(&LocalizerConfig::default())
    }
}

impl BoxSynthesizer {
    pub fn from_config(config: &LocalizerConfig) -> Self {
        Self {
            order: config.strategy_order.clone(),
            homography_padding: config.homography_padding,
            cluster_growth: config.cluster_padding,
            max_homography_box_scale: config.max_homography_box_scale,
        }
    }

    /// Region proposed by one strategy, before validation.
    ///
    /// The adaptive and homography boxes need at least `min_inliers` verified points.
    pub fn propose(&self, strategy: BoxStrategy, inputs: &BoxInputs<'_>) -> Option<BoundingRegion> {
        let trusted = inputs.inlier_points.len() >= inputs.category.min_inliers;
        match strategy {
            BoxStrategy::Adaptive if trusted => {
                adaptive_box(inputs.inlier_points, inputs.category.padding, inputs.image_size).map(BoundingRegion::Axis)
            }
            BoxStrategy::Homography if trusted => inputs
                .homography
                .and_then(|h| {
                    homography_box(
                        h,
                        inputs.reference_size,
                        inputs.image_size,
                        self.homography_padding,
                        self.max_homography_box_scale,
                    )
                })
                .map(BoundingRegion::Axis),
            BoxStrategy::ClusterFallback => {
                cluster_box(inputs.fused_points, inputs.category, self.cluster_growth, inputs.image_size)
            }
            _ => None,
        }
    }

    /// First valid region in strategy order
    pub fn synthesize(&self, inputs: &BoxInputs<'_>) -> Option<(BoxStrategy, BoundingRegion)> {
        self.order.iter().find_map(|&strategy| {
            let region = self.propose(strategy, inputs)?;
            if is_valid(&region, inputs.image_size) {
                Some((strategy, region))
            } else {
                debug!("{} box rejected: {:?}", strategy, region);
                None
            }
        })
    }
}
