use std::fs;
use std::path::Path;

use log::warn;
use objloc_core::Rect;
use objloc_localize::LabeledBox;

use crate::error::CliResult;

/// Parse `label xmin ymin xmax ymax` lines; malformed lines are skipped with a warning.
///
/// Tokens after the fourth coordinate are ignored.
pub fn parse_ground_truth(text: &str) -> Vec<LabeledBox> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                warn!("skipping malformed annotation on line {}: {line:?}", n + 1);
            }
            parsed
        })
        .collect()
}

fn parse_line(line: &str) -> Option<LabeledBox> {
    let mut fields = line.split_whitespace();
    let label = fields.next()?;
    let mut coord = || fields.next()?.parse::<i32>().ok();
    let (x0, y0, x1, y1) = (coord()?, coord()?, coord()?, coord()?);
    Some(LabeledBox::new(
        label,
        Rect::from_corners(x0 as f32, y0 as f32, x1 as f32, y1 as f32),
    ))
}

/// Label with any leading numeric dataset prefix removed, so `004_sugar_box` and `sugar_box` agree
pub fn canonical_label(label: &str) -> &str {
    match label.split_once('_') {
        Some((prefix, rest)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => label,
    }
}

/// Annotations of one test image; a missing file means no annotations
pub fn load_ground_truth(path: &Path) -> CliResult<Vec<LabeledBox>> {
    if !path.is_file() {
        warn!("no annotations at {}", path.display());
        return Ok(Vec::new());
    }
    Ok(parse_ground_truth(&fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_boxes() {
        let boxes = parse_ground_truth("004_sugar_box 10 20 110 220\nmustard 0 0 5 5\n");
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].label, "004_sugar_box");
        assert_eq!(boxes[0].rect, Rect::new(10.0, 20.0, 100.0, 200.0));
        assert_eq!(boxes[1].rect.area(), 25.0);
    }

    #[test]
    fn test_skips_malformed_lines() {
        let text = "drill 1 2 3\n\nbox a b c d\ncan 1 2 x 4\nok 1 1 2 2";
        let boxes = parse_ground_truth(text);
        assert_eq!(boxes, vec![LabeledBox::new("ok", Rect::new(1.0, 1.0, 1.0, 1.0))]);
    }

    #[test]
    fn test_trailing_tokens_ignored() {
        let boxes = parse_ground_truth("can 1 2 3 4 5\nmug 0 0 10 10 occluded");
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].rect, Rect::new(1.0, 2.0, 2.0, 2.0));
        assert_eq!(boxes[1].label, "mug");
    }

    #[test]
    fn test_corners_in_any_order() {
        let boxes = parse_ground_truth("flipped 10 10 0 0");
        assert_eq!(boxes[0].rect, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_canonical_label() {
        assert_eq!(canonical_label("004_sugar_box"), "sugar_box");
        assert_eq!(canonical_label("sugar_box"), "sugar_box");
        assert_eq!(canonical_label("_x"), "_x");
        assert_eq!(canonical_label("drill"), "drill");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let boxes = load_ground_truth(Path::new("/nonexistent/annotations.txt")).unwrap();
        assert!(boxes.is_empty());
    }
}
