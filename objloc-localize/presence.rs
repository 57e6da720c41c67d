use log::debug;
use objloc_core::{Correspondence, Descriptor};
use rayon::prelude::*;

use crate::matcher::match_descriptors;

/// Accepted correspondences between one reference view and the test image
#[derive(Debug, Clone, PartialEq)]
pub struct ViewMatches {
    pub view: usize,
    pub correspondences: Vec<Correspondence>,
}

impl ViewMatches {
    pub fn count(&self) -> usize {
        self.correspondences.len()
    }
}

/// Outcome of the presence vote across all views of one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceDecision {
    pub present: bool,
    /// `None` only when the object has no reference views
    pub best_view: Option<usize>,
    pub best_match_count: usize,
}

/// Match the test descriptors against every view; result is in view order
pub fn match_views<D>(views: &[&[D]], test: &[D], ratio: f32) -> Vec<ViewMatches>
where
    D: Descriptor + Sync,
{
    views
        .par_iter()
        .enumerate()
        .map(|(view, reference)| {
            let correspondences = match_descriptors(reference, test, ratio);
            debug!("view {}: {} good matches", view, correspondences.len());
            ViewMatches { view, correspondences }
        })
        .collect()
}

/// Presence from per-view match counts.
///
/// The first view reaching the maximum wins; presence needs strictly more than `threshold`.
pub fn decide_counts(counts: &[usize], threshold: usize) -> PresenceDecision {
    let mut best: Option<(usize, usize)> = None;
    for (view, &count) in counts.iter().enumerate() {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((view, count)),
        }
    }

    let best_match_count = best.map_or(0, |(_, c)| c);
    PresenceDecision {
        present: best.is_some() && best_match_count > threshold,
        best_view: best.map(|(v, _)| v),
        best_match_count,
    }
}

/// Match every view and vote
pub fn decide<D>(views: &[&[D]], test: &[D], ratio: f32, threshold: usize) -> PresenceDecision
where
    D: Descriptor + Sync,
{
    let counts: Vec<usize> = match_views(views, test, ratio).iter().map(ViewMatches::count).collect();
    decide_counts(&counts, threshold)
}

/// Rank views by descending match count, ties by view index, keeping at most `n`
pub fn rank_views(mut matches: Vec<ViewMatches>, n: usize) -> Vec<ViewMatches> {
    matches.sort_by(|a, b| b.count().cmp(&a.count()).then(a.view.cmp(&b.view)));
    matches.truncate(n);
    matches
}

/// The `n` best-matching views with their correspondences
pub fn top_n<D>(views: &[&[D]], test: &[D], ratio: f32, n: usize) -> Vec<ViewMatches>
where
    D: Descriptor + Sync,
{
    rank_views(match_views(views, test, ratio), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use objloc_core::FloatDescriptor;

    fn fd(v: f32) -> FloatDescriptor {
        FloatDescriptor::new(vec![v])
    }

    fn with_count(view: usize, count: usize) -> ViewMatches {
        ViewMatches {
            view,
            correspondences: (0..count).map(|i| Correspondence::new(i, i, 0.0)).collect(),
        }
    }

    #[test]
    fn test_decide_scenario() {
        let counts = [3, 4, 12, 2, 0, 7, 15, 1, 6, 9];
        let decision = decide_counts(&counts, 10);
        assert_eq!(
            decision,
            PresenceDecision {
                present: true,
                best_view: Some(6),
                best_match_count: 15,
            }
        );
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(!decide_counts(&[5, 10], 10).present);
        assert!(decide_counts(&[5, 11], 10).present);
    }

    #[test]
    fn test_threshold_boundary_from_descriptors() {
        // every reference value has its exact twin in the test set and the next one 10 away
        let test: Vec<FloatDescriptor> = (0..12).map(|i| fd(i as f32 * 10.0)).collect();
        let exactly: Vec<FloatDescriptor> = (0..10).map(|i| fd(i as f32 * 10.0)).collect();
        let one_more: Vec<FloatDescriptor> = (0..11).map(|i| fd(i as f32 * 10.0)).collect();

        let at = decide(&[exactly.as_slice()], &test, 0.75, 10);
        assert_eq!(at.best_match_count, 10);
        assert!(!at.present);

        let above = decide(&[one_more.as_slice()], &test, 0.75, 10);
        assert_eq!(above.best_match_count, 11);
        assert!(above.present);
    }

    #[test]
    fn test_ties_pick_lowest_index() {
        let decision = decide_counts(&[2, 8, 8, 1], 0);
        assert_eq!(decision.best_view, Some(1));
    }

    #[test]
    fn test_no_views() {
        let decision = decide_counts(&[], 0);
        assert!(!decision.present);
        assert_eq!(decision.best_view, None);
        assert_eq!(decision.best_match_count, 0);
    }

    #[test]
    fn test_all_zero_counts_absent() {
        let decision = decide_counts(&[0, 0], 0);
        assert!(!decision.present);
        assert_eq!(decision.best_view, Some(0));
    }

    #[test]
    fn test_rank_views_stable() {
        let matches = vec![with_count(0, 3), with_count(1, 7), with_count(2, 3), with_count(3, 7)];
        let ranked: Vec<usize> = rank_views(matches.clone(), 3).iter().map(|m| m.view).collect();
        assert_eq!(ranked, vec![1, 3, 0]);
        assert_eq!(rank_views(matches, 10).len(), 4);
    }

    #[test]
    fn test_decide_end_to_end() {
        let test = vec![fd(0.0), fd(5.0), fd(10.0), fd(100.0)];
        let strong = vec![fd(0.1), fd(5.1), fd(10.1)];
        let weak = vec![fd(2.5)];
        let views: Vec<&[FloatDescriptor]> = vec![weak.as_slice(), strong.as_slice()];

        let decision = decide(&views, &test, 0.75, 2);
        assert!(decision.present);
        assert_eq!(decision.best_view, Some(1));
        assert_eq!(decision.best_match_count, 3);

        let top = top_n(&views, &test, 0.75, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].view, 1);
    }
}
