use crate::error::{CoreError, CoreResult};
use crate::geometry::Point2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Detected interest point: subpixel location, scale and orientation (radians)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the described neighbourhood in base-image pixels
    pub size: f32,
    pub angle: f32,
    pub response: f32,
    pub octave: u8,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    #[inline]
    pub fn point(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// A feature vector with a distance metric.
///
/// Matching only needs `distance`; the search mechanism is up to the matcher.
pub trait Descriptor {
    fn distance(&self, other: &Self) -> f32;
}

/// 256-bit binary descriptor = 32 bytes, compared by Hamming distance
pub type BinaryDescriptor = [u8; 32];

impl Descriptor for BinaryDescriptor {
    #[inline]
    fn distance(&self, other: &Self) -> f32 {
        self.iter()
            .zip(other.iter())
            .map(|(&a, &b)| (a ^ b).count_ones())
            .sum::<u32>() as f32
    }
}

/// Floating point descriptor compared by Euclidean (L2) distance
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FloatDescriptor(pub Vec<f32>);

impl FloatDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl From<Vec<f32>> for FloatDescriptor {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl Descriptor for FloatDescriptor {
    #[inline]
    fn distance(&self, other: &Self) -> f32 {
        debug_assert_eq!(self.0.len(), other.0.len(), "descriptor length mismatch");
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// Keypoints and their descriptors, index aligned
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet<D> {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<D>,
}

impl<D> FeatureSet<D> {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<D>) -> CoreResult<Self> {
        if keypoints.len() != descriptors.len() {
            return Err(CoreError::LengthMismatch {
                keypoints: keypoints.len(),
                descriptors: descriptors.len(),
            });
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    pub fn empty() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[D] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

impl<D> Default for FeatureSet<D> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Accepted pairing of a reference descriptor with a test descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Correspondence {
    pub reference: usize,
    pub test: usize,
    pub distance: f32,
}

impl Correspondence {
    pub fn new(reference: usize, test: usize, distance: f32) -> Self {
        Self {
            reference,
            test,
            distance,
        }
    }

    /// Both endpoints, `None` if either index is out of range
    pub fn points(&self, reference: &[Keypoint], test: &[Keypoint]) -> Option<(Point2, Point2)> {
        let r = reference.get(self.reference)?;
        let t = test.get(self.test)?;
        Some((r.point(), t.point()))
    }
}
