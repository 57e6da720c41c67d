#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 2D image coordinate in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn distance(&self, other: &Point2) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Unweighted mean of a point set, `None` when empty
    pub fn centroid(points: &[Point2]) -> Option<Point2> {
        if points.is_empty() {
            return None;
        }
        let (sx, sy) = points
            .iter()
            .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        let n = points.len() as f64;
        Some(Point2::new((sx / n) as f32, (sy / n) as f32))
    }
}

/// Pixel extent of an image or reference view
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32)
    }
}

/// Axis-aligned rectangle, top-left corner plus extent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from two opposite corners in any order
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (min_x, max_x) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (min_y, max_y) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Tight bounding rectangle of a point set, `None` when empty
    pub fn bounding(points: &[Point2]) -> Option<Self> {
        let first = points.first()?;
        let (min_x, min_y, max_x, max_y) = points.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        );
        Some(Self::from_corners(min_x, min_y, max_x, max_y))
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Area, zero for degenerate rectangles
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.width * self.height
        }
    }

    /// True when either dimension is non-positive or not finite
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0) || !self.width.is_finite() || !self.height.is_finite()
    }

    /// Overlap of two rectangles; a zero-size rectangle when they are disjoint
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Rect::new(x0, y0, 0.0, 0.0);
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Intersection over union; 0 for disjoint rectangles or a non-positive union
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = self.intersection(other).area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0)
    }

    /// Grow by `fraction` of the width/height on every side
    pub fn expanded(&self, fraction: f32) -> Rect {
        let pad_x = self.width * fraction;
        let pad_y = self.height * fraction;
        Rect::new(
            self.x - pad_x,
            self.y - pad_y,
            self.width + 2.0 * pad_x,
            self.height + 2.0 * pad_y,
        )
    }

    /// Clip to `[0, width] x [0, height]`; collapses to zero size when fully outside
    pub fn clipped(&self, bounds: Size) -> Rect {
        let x0 = self.x.clamp(0.0, bounds.width);
        let y0 = self.y.clamp(0.0, bounds.height);
        let x1 = self.right().clamp(0.0, bounds.width);
        let y1 = self.bottom().clamp(0.0, bounds.height);
        Rect::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    /// True when the rectangle lies inside `[0, width] x [0, height]`
    pub fn within(&self, bounds: Size) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= bounds.width && self.bottom() <= bounds.height
    }

    pub fn corners(&self) -> [Point2; 4] {
        [
            Point2::new(self.x, self.y),
            Point2::new(self.right(), self.y),
            Point2::new(self.right(), self.bottom()),
            Point2::new(self.x, self.bottom()),
        ]
    }
}

/// Rotated rectangle: center, extent along its own axes, rotation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrientedRect {
    pub center: Point2,
    pub size: Size,
    pub angle: f32,
}

impl OrientedRect {
    pub fn new(center: Point2, size: Size, angle: f32) -> Self {
        Self { center, size, angle }
    }

    /// Corner points in drawing order
    pub fn corners(&self) -> [Point2; 4] {
        let (s, c) = self.angle.to_radians().sin_cos();
        let hw = self.size.width * 0.5;
        let hh = self.size.height * 0.5;
        let local = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
        local.map(|(u, v)| {
            Point2::new(
                self.center.x + u * c - v * s,
                self.center.y + u * s + v * c,
            )
        })
    }

    /// Axis-aligned envelope of the four corners
    pub fn envelope(&self) -> Rect {
        // four corners are never empty
        Rect::bounding(&self.corners()).unwrap_or_default()
    }

    /// Scale both side lengths around the center
    pub fn scaled(&self, factor: f32) -> OrientedRect {
        OrientedRect::new(
            self.center,
            Size::new(self.size.width * factor, self.size.height * factor),
            self.angle,
        )
    }

    pub fn area(&self) -> f32 {
        (self.size.width * self.size.height).max(0.0)
    }
}

/// Region reported for a detection
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum BoundingRegion {
    Axis(Rect),
    Oriented(OrientedRect),
}

impl BoundingRegion {
    /// Axis-aligned rectangle used for IoU scoring
    pub fn envelope(&self) -> Rect {
        match self {
            BoundingRegion::Axis(r) => *r,
            BoundingRegion::Oriented(o) => o.envelope(),
        }
    }

    /// Zero width or height, or non-finite geometry
    pub fn is_degenerate(&self) -> bool {
        match self {
            BoundingRegion::Axis(r) => r.is_empty(),
            BoundingRegion::Oriented(o) => {
                !(o.size.width > 0.0 && o.size.height > 0.0)
                    || !o.center.x.is_finite()
                    || !o.center.y.is_finite()
                    || o.envelope().is_empty()
            }
        }
    }

    pub fn within(&self, bounds: Size) -> bool {
        self.envelope().within(bounds)
    }

    /// Clip to the image extent.
    ///
    /// An oriented rectangle that already fits is kept as is; one that crosses the
    /// border is replaced by its clipped axis-aligned envelope.
    pub fn clipped(&self, bounds: Size) -> BoundingRegion {
        match self {
            BoundingRegion::Axis(r) => BoundingRegion::Axis(r.clipped(bounds)),
            BoundingRegion::Oriented(o) if o.envelope().within(bounds) => BoundingRegion::Oriented(*o),
            BoundingRegion::Oriented(o) => BoundingRegion::Axis(o.envelope().clipped(bounds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_iou_partial_overlap() {
        let gt = Rect::new(10.0, 10.0, 50.0, 50.0);
        let pred = Rect::new(20.0, 20.0, 50.0, 50.0);
        assert_relative_eq!(gt.intersection(&pred).area(), 1600.0);
        assert_relative_eq!(gt.iou(&pred), 1600.0 / 3400.0, epsilon = 1e-6);
        assert!(gt.iou(&pred) < 0.5);
    }

    #[test]
    fn test_iou_identity_and_disjoint() {
        let a = Rect::new(0.0, 0.0, 10.0, 20.0);
        let b = Rect::new(30.0, 30.0, 5.0, 5.0);
        assert_relative_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
        // touching edges do not overlap
        let c = Rect::new(10.0, 0.0, 10.0, 20.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_iou_degenerate_union() {
        let a = Rect::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn test_clip_to_bounds() {
        let r = Rect::new(-10.0, 5.0, 50.0, 200.0);
        let c = r.clipped(Size::new(30.0, 100.0));
        assert_eq!(c, Rect::new(0.0, 5.0, 30.0, 95.0));
        assert!(c.within(Size::new(30.0, 100.0)));

        let outside = Rect::new(200.0, 200.0, 10.0, 10.0).clipped(Size::new(30.0, 100.0));
        assert!(outside.is_empty());
        assert!(outside.width >= 0.0 && outside.height >= 0.0);
    }

    #[test]
    fn test_expanded() {
        let r = Rect::new(10.0, 10.0, 100.0, 50.0).expanded(0.1);
        assert_relative_eq!(r.x, 0.0);
        assert_relative_eq!(r.y, 5.0);
        assert_relative_eq!(r.width, 120.0);
        assert_relative_eq!(r.height, 60.0);
    }

    #[test]
    fn test_bounding_and_centroid() {
        let pts = [Point2::new(3.0, 4.0), Point2::new(-1.0, 10.0), Point2::new(5.0, 0.0)];
        assert_eq!(Rect::bounding(&pts), Some(Rect::new(-1.0, 0.0, 6.0, 10.0)));
        let c = Point2::centroid(&pts).unwrap();
        assert_relative_eq!(c.x, 7.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(c.y, 14.0 / 3.0, epsilon = 1e-6);
        assert!(Rect::bounding(&[]).is_none());
        assert!(Point2::centroid(&[]).is_none());
    }

    #[test]
    fn test_oriented_corners() {
        let o = OrientedRect::new(Point2::new(50.0, 50.0), Size::new(20.0, 10.0), 90.0);
        let env = o.envelope();
        assert_relative_eq!(env.width, 10.0, epsilon = 1e-4);
        assert_relative_eq!(env.height, 20.0, epsilon = 1e-4);
        assert_relative_eq!(o.scaled(2.0).area(), 800.0);
    }

    #[test]
    fn test_oriented_clip_falls_back_to_envelope() {
        let bounds = Size::new(100.0, 100.0);
        let inside = BoundingRegion::Oriented(OrientedRect::new(
            Point2::new(50.0, 50.0),
            Size::new(20.0, 10.0),
            30.0,
        ));
        assert_eq!(inside.clipped(bounds), inside);

        let crossing = BoundingRegion::Oriented(OrientedRect::new(
            Point2::new(95.0, 50.0),
            Size::new(40.0, 10.0),
            10.0,
        ));
        match crossing.clipped(bounds) {
            BoundingRegion::Axis(r) => assert!(r.within(bounds)),
            other => panic!("expected clipped envelope, got {:?}", other),
        }
    }

    fn rect_strategy() -> impl Strategy<Value = Rect> {
        (-100.0f32..100.0, -100.0f32..100.0, 0.5f32..80.0, 0.5f32..80.0)
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn prop_iou_symmetric_and_bounded(a in rect_strategy(), b in rect_strategy()) {
            let ab = a.iou(&b);
            let ba = b.iou(&a);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn prop_iou_self_is_one(a in rect_strategy()) {
            prop_assert!((a.iou(&a) - 1.0).abs() < 1e-5);
        }

        #[test]
        fn prop_clip_is_within(a in rect_strategy()) {
            let bounds = Size::new(64.0, 48.0);
            let c = a.clipped(bounds);
            prop_assert!(c.width >= 0.0 && c.height >= 0.0);
            prop_assert!(c.within(bounds));
        }
    }
}
