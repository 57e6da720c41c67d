use std::collections::BTreeMap;
use std::fmt;

use objloc_core::Rect;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Intersection over union of two axis-aligned rectangles
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    a.iou(b)
}

/// Rectangle tagged with an object label, used for both predictions and ground truth
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabeledBox {
    pub label: String,
    pub rect: Rect,
}

impl LabeledBox {
    pub fn new(label: impl Into<String>, rect: Rect) -> Self {
        Self {
            label: label.into(),
            rect,
        }
    }
}

/// Accumulated counters for one label
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelStats {
    pub true_positives: usize,
    pub total_ground_truths: usize,
    pub predictions: usize,
    pub iou_sum: f64,
    pub iou_count: usize,
}

impl LabelStats {
    /// Mean best IoU over scored ground truths, 0 when nothing was scored
    pub fn mean_iou(&self) -> f64 {
        if self.iou_count == 0 {
            0.0
        } else {
            self.iou_sum / self.iou_count as f64
        }
    }

    pub fn merge(&mut self, other: &LabelStats) {
        self.true_positives += other.true_positives;
        self.total_ground_truths += other.total_ground_truths;
        self.predictions += other.predictions;
        self.iou_sum += other.iou_sum;
        self.iou_count += other.iou_count;
    }
}

/// Per-label evaluation, combined across images by `merge`
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Evaluation {
    pub per_label: BTreeMap<String, LabelStats>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one image.
    ///
    /// Each ground truth takes its best-IoU prediction with the same label; it is a
    /// true positive when that IoU is strictly above `iou_threshold`. A ground truth
    /// without any same-label prediction scores IoU 0.
    pub fn score(predictions: &[LabeledBox], ground_truths: &[LabeledBox], iou_threshold: f32) -> Self {
        let mut eval = Self::new();

        for p in predictions {
            eval.per_label.entry(p.label.clone()).or_default().predictions += 1;
        }

        for gt in ground_truths {
            let best = predictions
                .iter()
                .filter(|p| p.label == gt.label)
                .map(|p| iou(&p.rect, &gt.rect))
                .fold(0.0f32, f32::max);

            let stats = eval.per_label.entry(gt.label.clone()).or_default();
            stats.total_ground_truths += 1;
            stats.iou_sum += best as f64;
            stats.iou_count += 1;
            if best > iou_threshold {
                stats.true_positives += 1;
            }
        }

        eval
    }

    pub fn merge(mut self, other: Evaluation) -> Self {
        for (label, stats) in other.per_label {
            self.per_label.entry(label).or_default().merge(&stats);
        }
        self
    }

    pub fn total(&self) -> LabelStats {
        self.per_label.values().fold(LabelStats::default(), |mut acc, s| {
            acc.merge(s);
            acc
        })
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:>8} {:>8} {:>10}", "label", "TP/GT", "preds", "mean IoU")?;
        for (label, s) in &self.per_label {
            writeln!(
                f,
                "{:<24} {:>8} {:>8} {:>10.3}",
                label,
                format!("{}/{}", s.true_positives, s.total_ground_truths),
                s.predictions,
                s.mean_iou()
            )?;
        }
        let t = self.total();
        write!(
            f,
            "{:<24} {:>8} {:>8} {:>10.3}",
            "total",
            format!("{}/{}", t.true_positives, t.total_ground_truths),
            t.predictions,
            t.mean_iou()
        )
    }
}
