use objloc_core::{BinaryDescriptor, Keypoint};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rayon::prelude::*;

use crate::pyramid::bilinear_sample;

/// Number of intensity comparisons, one bit each
pub const DESCRIPTOR_BITS: usize = 256;

/// Steered BRIEF: a fixed sampling pattern rotated by the keypoint angle
#[derive(Debug, Clone)]
pub struct BriefGenerator {
    pairs: Vec<(f32, f32, f32, f32)>,
}

impl BriefGenerator {
    /// Pattern inside a `patch_size` square, drawn from a seeded generator so
    /// every extractor built with the same seed produces comparable descriptors
    pub fn new(patch_size: usize, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let half = (patch_size / 2) as f32 - 2.0;

        // Sum of two uniforms concentrates samples near the center
        let mut coord = move || {
            let v: f32 = (rng.gen_range(-1.0f32..1.0) + rng.gen_range(-1.0f32..1.0)) * 0.5;
            (v * half).round()
        };

        let pairs = (0..DESCRIPTOR_BITS)
            .map(|_| (coord(), coord(), coord(), coord()))
            .collect();

        Self { pairs }
    }

    pub fn pairs(&self) -> &[(f32, f32, f32, f32)] {
        &self.pairs
    }

    /// Descriptors for keypoints given in `img` coordinates
    pub fn describe(&self, img: &[u8], width: usize, height: usize, kps: &[Keypoint]) -> Vec<BinaryDescriptor> {
        kps.par_iter()
            .map(|kp| {
                let (s, c) = kp.angle.sin_cos();
                let (cx, cy) = (kp.x, kp.y);
                let mut d: BinaryDescriptor = [0u8; 32];

                for (i, &(dx1, dy1, dx2, dy2)) in self.pairs.iter().enumerate() {
                    let (rx1, ry1) = (cx + c * dx1 - s * dy1, cy + s * dx1 + c * dy1);
                    let (rx2, ry2) = (cx + c * dx2 - s * dy2, cy + s * dx2 + c * dy2);

                    let val1 = bilinear_sample(img, width, height, rx1, ry1);
                    let val2 = bilinear_sample(img, width, height, rx2, ry2);

                    let bit = (val1 < val2) as u8;
                    d[i / 8] |= bit << (i % 8);
                }
                d
            })
            .collect()
    }
}

/// 5x5 box smoothing applied before sampling the pattern
pub fn smooth(img: &[u8], width: usize, height: usize) -> Vec<u8> {
    const RADIUS: i32 = 2;
    let mut horizontal = vec![0u16; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0u16;
            for dx in -RADIUS..=RADIUS {
                let xx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
                sum += img[y * width + xx] as u16;
            }
            horizontal[y * width + x] = sum;
        }
    }

    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0u32;
            for dy in -RADIUS..=RADIUS {
                let yy = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;
                sum += horizontal[yy * width + x] as u32;
            }
            out[y * width + x] = ((sum + 12) / 25) as u8;
        }
    }
    out
}
