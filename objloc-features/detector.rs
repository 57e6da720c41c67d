use objloc_core::Keypoint;
use rayon::prelude::*;

use crate::pyramid::ScaleLevel;

/// Bresenham circle of radius 3 around the candidate pixel
const CIRCLE: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Contiguous arc length required for a FAST-9 corner
const ARC_LENGTH: usize = 9;

/// Keypoint with corner response score for NMS
#[derive(Debug, Clone, Copy)]
pub struct ScoredKeypoint {
    pub keypoint: Keypoint,
    pub response: f32,
}

/// Check if there are at least `min_count` consecutive set bits in the circular 16-bit mask
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }

    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// FAST-9 corner detection on a single pyramid level
#[derive(Debug, Clone, Copy)]
pub struct FastDetector {
    pub threshold: u8,
    /// Pixels kept clear of the level border so the orientation patch fits
    pub border: usize,
    pub nms_radius: f32,
}

impl FastDetector {
    pub fn new(threshold: u8, patch_size: usize, nms_radius: f32) -> Self {
        Self {
            threshold,
            border: (patch_size / 2).max(3),
            nms_radius,
        }
    }

    /// Corners of one level in level coordinates, after NMS and mask filtering
    pub fn detect(&self, img: &[u8], level: &ScaleLevel, mask: Option<&[u8]>) -> Vec<ScoredKeypoint> {
        let (w, h) = (level.width, level.height);
        if w <= 2 * self.border || h <= 2 * self.border {
            return Vec::new();
        }

        let rows = self.border..h - self.border;
        let candidates: Vec<ScoredKeypoint> = rows
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row = Vec::new();
                for x in self.border..w - self.border {
                    if let Some(m) = mask {
                        if m[y * w + x] == 0 {
                            continue;
                        }
                    }
                    if let Some(response) = self.corner_response(img, w, x, y) {
                        let mut keypoint = Keypoint::new(x as f32, y as f32);
                        keypoint.response = response;
                        keypoint.octave = level.level as u8;
                        row.push(ScoredKeypoint { keypoint, response });
                    }
                }
                row.into_iter()
            })
            .collect();

        non_maximum_suppression(&candidates, self.nms_radius)
    }

    /// Response of a FAST-9 corner, `None` if the pixel is not a corner
    fn corner_response(&self, img: &[u8], width: usize, x: usize, y: usize) -> Option<f32> {
        let center = img[y * width + x] as i32;
        let threshold = self.threshold as i32;

        let mut brighter: u16 = 0;
        let mut darker: u16 = 0;
        let mut sum_sq = 0.0f32;
        let mut count = 0u32;

        for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
            let px = (x as i32 + dx) as usize;
            let py = (y as i32 + dy) as usize;
            let diff = img[py * width + px] as i32 - center;

            if diff > threshold {
                brighter |= 1 << i;
            } else if diff < -threshold {
                darker |= 1 << i;
            } else {
                continue;
            }
            sum_sq += (diff * diff) as f32;
            count += 1;
        }

        if has_consecutive_bits(brighter, ARC_LENGTH) || has_consecutive_bits(darker, ARC_LENGTH) {
            Some(sum_sq / count as f32)
        } else {
            None
        }
    }
}

/// Greedy suppression: strongest first, dropping anything closer than `min_distance`
pub fn non_maximum_suppression(keypoints: &[ScoredKeypoint], min_distance: f32) -> Vec<ScoredKeypoint> {
    if keypoints.is_empty() {
        return Vec::new();
    }

    let mut sorted = keypoints.to_vec();
    sorted.sort_by(|a, b| b.response.total_cmp(&a.response));

    let mut kept: Vec<ScoredKeypoint> = Vec::new();
    let min_distance_sq = min_distance * min_distance;

    for candidate in sorted {
        let is_local_max = kept.iter().all(|existing| {
            let dx = candidate.keypoint.x - existing.keypoint.x;
            let dy = candidate.keypoint.y - existing.keypoint.y;
            dx * dx + dy * dy >= min_distance_sq
        });

        if is_local_max {
            kept.push(candidate);
        }
    }

    kept
}

/// Orientation (radians) by intensity centroid over a circular patch
pub fn compute_orientation(img: &[u8], width: usize, height: usize, x: f32, y: f32, patch_size: usize) -> f32 {
    let half = (patch_size / 2) as i32;
    let radius_sq = half * half;
    let (cx, cy) = (x.round() as i32, y.round() as i32);

    let mut m10 = 0i64;
    let mut m01 = 0i64;

    for dy in -half..=half {
        let py = cy + dy;
        if py < 0 || py >= height as i32 {
            continue;
        }
        for dx in -half..=half {
            let px = cx + dx;
            if px < 0 || px >= width as i32 || dx * dx + dy * dy > radius_sq {
                continue;
            }
            let value = img[py as usize * width + px as usize] as i64;
            m10 += dx as i64 * value;
            m01 += dy as i64 * value;
        }
    }

    if m10 == 0 && m01 == 0 {
        0.0
    } else {
        (m01 as f32).atan2(m10 as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(width: usize, height: usize) -> ScaleLevel {
        ScaleLevel { level: 0, scale: 1.0, width, height }
    }

    /// Dark image with a bright square; its corners are FAST corners
    fn square_image(size: usize, lo: usize, hi: usize) -> Vec<u8> {
        let mut img = vec![10u8; size * size];
        for y in lo..hi {
            for x in lo..hi {
                img[y * size + x] = 200;
            }
        }
        img
    }

    #[test]
    fn test_consecutive_bits_simple() {
        let mask: u16 = 0b0000_0001_1111_1111;
        assert!(has_consecutive_bits(mask, 9));
        assert!(!has_consecutive_bits(mask, 10));
    }

    #[test]
    fn test_consecutive_bits_wrap_around() {
        let mask: u16 = 0b1111_0000_0001_1111;
        assert!(has_consecutive_bits(mask, 9));
        assert!(!has_consecutive_bits(0b0101_0101_0101_0101, 2));
        assert!(!has_consecutive_bits(u16::MAX, 0));
    }

    #[test]
    fn test_uniform_image_has_no_corners() {
        let img = vec![128u8; 64 * 64];
        let detector = FastDetector::new(20, 7, 3.0);
        assert!(detector.detect(&img, &level(64, 64), None).is_empty());
    }

    #[test]
    fn test_square_corners_detected() {
        let img = square_image(64, 20, 44);
        let detector = FastDetector::new(20, 7, 3.0);
        let corners = detector.detect(&img, &level(64, 64), None);
        assert!(!corners.is_empty());
        for c in &corners {
            let near_corner = [(20.0, 20.0), (43.0, 20.0), (20.0, 43.0), (43.0, 43.0)]
                .iter()
                .any(|&(x, y): &(f32, f32)| (c.keypoint.x - x).abs() <= 3.0 && (c.keypoint.y - y).abs() <= 3.0);
            assert!(near_corner, "unexpected corner at {:?}", c.keypoint);
        }
    }

    #[test]
    fn test_mask_excludes_corners() {
        let img = square_image(64, 20, 44);
        let mask = vec![0u8; 64 * 64];
        let detector = FastDetector::new(20, 7, 3.0);
        assert!(detector.detect(&img, &level(64, 64), Some(&mask)).is_empty());
    }

    #[test]
    fn test_nms_keeps_strongest() {
        let make = |x: f32, response: f32| {
            let mut keypoint = Keypoint::new(x, 0.0);
            keypoint.response = response;
            ScoredKeypoint { keypoint, response }
        };
        let kept = non_maximum_suppression(&[make(0.0, 1.0), make(1.0, 5.0), make(10.0, 2.0)], 3.0);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].keypoint.x, 1.0);
        assert_eq!(kept[1].keypoint.x, 10.0);
    }

    #[test]
    fn test_orientation_points_to_bright_side() {
        let mut img = vec![0u8; 32 * 32];
        for y in 0..32 {
            for x in 17..32 {
                img[y * 32 + x] = 255;
            }
        }
        let angle = compute_orientation(&img, 32, 32, 16.0, 16.0, 15);
        assert!(angle.abs() < 1e-3);
    }
}
