use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use objloc_core::{BoundingRegion, BoxStrategy, Rect};
use objloc_localize::{DetectionOutcome, LabeledBox};

const GROUND_TRUTH_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

pub fn strategy_color(strategy: Option<BoxStrategy>) -> Rgb<u8> {
    match strategy {
        Some(BoxStrategy::Adaptive) => Rgb([0, 220, 0]),
        Some(BoxStrategy::Homography) => Rgb([0, 120, 255]),
        Some(BoxStrategy::ClusterFallback) => Rgb([255, 160, 0]),
        None => Rgb([200, 200, 200]),
    }
}

fn draw_rect(canvas: &mut RgbImage, rect: &Rect, color: Rgb<u8>) {
    // imageproc rejects zero-sized rectangles
    let width = (rect.width.round() as u32).max(1);
    let height = (rect.height.round() as u32).max(1);
    let outline = imageproc::rect::Rect::at(rect.x.round() as i32, rect.y.round() as i32).of_size(width, height);
    draw_hollow_rect_mut(canvas, outline, color);
}

/// Outline a region: axis rectangles directly, oriented ones edge by edge
pub fn draw_region(canvas: &mut RgbImage, region: &BoundingRegion, color: Rgb<u8>) {
    match region {
        BoundingRegion::Axis(rect) => draw_rect(canvas, rect, color),
        BoundingRegion::Oriented(oriented) => {
            let corners = oriented.corners();
            for i in 0..corners.len() {
                let (a, b) = (corners[i], corners[(i + 1) % corners.len()]);
                draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), color);
            }
        }
    }
}

/// Test image with ground truth in red and detections colored by strategy
pub fn render_outcomes(image: &DynamicImage, outcomes: &[DetectionOutcome], ground_truth: &[LabeledBox]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for gt in ground_truth {
        draw_rect(&mut canvas, &gt.rect, GROUND_TRUTH_COLOR);
    }
    for outcome in outcomes.iter().filter(|o| o.present) {
        let color = strategy_color(outcome.strategy);
        for region in &outcome.regions {
            draw_region(&mut canvas, region, color);
        }
    }
    canvas
}
