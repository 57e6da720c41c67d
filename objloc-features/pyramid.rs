use objloc_core::Image;

/// Scale information for one pyramid level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

/// Smallest level side that still leaves room for detection
pub const MIN_LEVEL_SIZE: usize = 32;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Scale levels for an image, stopping at `max_levels` or when a side drops below `MIN_LEVEL_SIZE`
    pub fn generate_scale_levels(width: usize, height: usize, scale_factor: f32, max_levels: usize) -> Vec<ScaleLevel> {
        let mut levels = Vec::new();
        let mut current_scale = 1.0f32;

        for level in 0..max_levels {
            let scaled_width = ((width as f32) / current_scale) as usize;
            let scaled_height = ((height as f32) / current_scale) as usize;

            if scaled_width < MIN_LEVEL_SIZE || scaled_height < MIN_LEVEL_SIZE {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });

            current_scale *= scale_factor;
        }

        levels
    }

    /// Build the image pyramid; level 0 is a copy of the input
    pub fn build(img: &[u8], width: usize, height: usize, scale_levels: &[ScaleLevel]) -> Vec<Image> {
        scale_levels
            .iter()
            .map(|level| {
                if level.level == 0 {
                    img.to_vec()
                } else {
                    Self::downsample(img, width, height, level.width, level.height)
                }
            })
            .collect()
    }

    /// Mask pyramid, nearest-neighbour so the mask stays binary
    pub fn build_mask(mask: &[u8], width: usize, height: usize, scale_levels: &[ScaleLevel]) -> Vec<Image> {
        scale_levels
            .iter()
            .map(|level| {
                let x_ratio = width as f32 / level.width as f32;
                let y_ratio = height as f32 / level.height as f32;
                let mut out = vec![0u8; level.width * level.height];
                for y in 0..level.height {
                    let sy = ((y as f32 * y_ratio) as usize).min(height - 1);
                    for x in 0..level.width {
                        let sx = ((x as f32 * x_ratio) as usize).min(width - 1);
                        out[y * level.width + x] = mask[sy * width + sx];
                    }
                }
                out
            })
            .collect()
    }

    /// Downsample image using bilinear interpolation
    fn downsample(img: &[u8], src_width: usize, src_height: usize, target_width: usize, target_height: usize) -> Image {
        let mut downsampled = vec![0u8; target_width * target_height];

        let x_ratio = src_width as f32 / target_width as f32;
        let y_ratio = src_height as f32 / target_height as f32;

        for y in 0..target_height {
            for x in 0..target_width {
                let value = bilinear_sample(img, src_width, src_height, x as f32 * x_ratio, y as f32 * y_ratio);
                downsampled[y * target_width + x] = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        downsampled
    }
}

/// Sample image at fractional coordinates, clamping to the border
pub fn bilinear_sample(img: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x1 = x.floor() as usize;
    let y1 = y.floor() as usize;
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);

    let fx = x - x1 as f32;
    let fy = y - y1 as f32;

    let p11 = img[y1 * width + x1] as f32;
    let p12 = img[y1 * width + x2] as f32;
    let p21 = img[y2 * width + x1] as f32;
    let p22 = img[y2 * width + x2] as f32;

    let top = p11 * (1.0 - fx) + p12 * fx;
    let bottom = p21 * (1.0 - fx) + p22 * fx;

    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_levels_stop_at_min_size() {
        let levels = ImagePyramid::generate_scale_levels(64, 64, 1.2, 8);
        assert_eq!(levels[0].scale, 1.0);
        assert!(levels.iter().all(|l| l.width >= MIN_LEVEL_SIZE && l.height >= MIN_LEVEL_SIZE));
        assert!(levels.len() < 8);
    }

    #[test]
    fn test_scale_levels_capped() {
        let levels = ImagePyramid::generate_scale_levels(2000, 2000, 1.2, 8);
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[7].level, 7);
    }

    #[test]
    fn test_tiny_image_has_no_levels() {
        assert!(ImagePyramid::generate_scale_levels(20, 100, 1.2, 8).is_empty());
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let img = vec![77u8; 100 * 80];
        let levels = ImagePyramid::generate_scale_levels(100, 80, 1.5, 3);
        let pyramid = ImagePyramid::build(&img, 100, 80, &levels);
        for (level, data) in levels.iter().zip(pyramid.iter()) {
            assert_eq!(data.len(), level.width * level.height);
            assert!(data.iter().all(|&v| v == 77));
        }
    }

    #[test]
    fn test_mask_pyramid_binary() {
        let mut mask = vec![0u8; 64 * 64];
        for y in 16..48 {
            for x in 16..48 {
                mask[y * 64 + x] = 255;
            }
        }
        let levels = ImagePyramid::generate_scale_levels(64, 64, 1.2, 3);
        let masks = ImagePyramid::build_mask(&mask, 64, 64, &levels);
        for m in &masks {
            assert!(m.iter().all(|&v| v == 0 || v == 255));
            assert!(m.iter().any(|&v| v == 255));
        }
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = vec![0u8, 100, 0, 100];
        assert_eq!(bilinear_sample(&img, 2, 2, 0.5, 0.0), 50.0);
        assert_eq!(bilinear_sample(&img, 2, 2, -3.0, 5.0), 0.0);
    }
}
