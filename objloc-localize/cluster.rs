use objloc_core::Point2;

/// Flat-kernel mean-shift that groups converged modes and keeps the largest group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanShift {
    pub bandwidth: f32,
    pub max_iterations: usize,
    /// Shift length below which a mode counts as converged
    pub epsilon: f32,
}

impl MeanShift {
    pub fn new(bandwidth: f32) -> Self {
        Self {
            bandwidth,
            max_iterations: 100,
            epsilon: 1e-3,
        }
    }

    /// Converge one seed to its mode over the (unmoved) input points
    fn seek_mode(&self, points: &[Point2], seed: Point2) -> Point2 {
        let mut mode = seed;
        for _ in 0..self.max_iterations {
            let (mut sx, mut sy, mut count) = (0.0f64, 0.0f64, 0usize);
            for p in points {
                if p.distance(&mode) < self.bandwidth {
                    sx += p.x as f64;
                    sy += p.y as f64;
                    count += 1;
                }
            }
            if count == 0 {
                break;
            }
            let mean = Point2::new((sx / count as f64) as f32, (sy / count as f64) as f32);
            let shift = mean.distance(&mode);
            mode = mean;
            if shift < self.epsilon {
                break;
            }
        }
        mode
    }

    /// Modes of every input point, in input order
    pub fn modes(&self, points: &[Point2]) -> Vec<Point2> {
        points.iter().map(|&p| self.seek_mode(points, p)).collect()
    }

    /// Dominant spatial cluster, a subset of `points` in input order.
    ///
    /// Points whose modes lie within one bandwidth of each other (transitively) form
    /// a group; the largest group wins, ties going to the group of the earliest point.
    /// Input that already fits within one bandwidth of its centroid is returned unchanged.
    pub fn cluster(&self, points: &[Point2]) -> Vec<Point2> {
        let Some(center) = Point2::centroid(points) else {
            return Vec::new();
        };
        if points.iter().all(|p| p.distance(&center) < self.bandwidth) {
            return points.to_vec();
        }

        let modes = self.modes(points);
        let labels = group_modes(&modes, self.bandwidth);

        let mut sizes = vec![0usize; points.len()];
        for &label in &labels {
            sizes[label] += 1;
        }
        // labels are group roots; on equal size the root met first in input order wins
        let mut winner = labels[0];
        for &label in &labels {
            if sizes[label] > sizes[winner] {
                winner = label;
            }
        }

        points
            .iter()
            .zip(&labels)
            .filter(|(_, &label)| label == winner)
            .map(|(&p, _)| p)
            .collect()
    }
}

/// Union-find over modes; returns for each mode the index of its group root
fn group_modes(modes: &[Point2], bandwidth: f32) -> Vec<usize> {
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..modes.len()).collect();
    for i in 0..modes.len() {
        for j in (i + 1)..modes.len() {
            if modes[i].distance(&modes[j]) < bandwidth {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    // keep the smaller index as root
                    let (lo, hi) = if ri < rj { (ri, rj) } else { (rj, ri) };
                    parent[hi] = lo;
                }
            }
        }
    }

    (0..modes.len()).map(|i| find(&mut parent, i)).collect()
}

/// Mean-shift clustering with default iteration limits
pub fn cluster(points: &[Point2], bandwidth: f32) -> Vec<Point2> {
    MeanShift::new(bandwidth).cluster(points)
}

/// Drop points farther than `max_distance` from the centroid.
///
/// Repeats until no point is dropped, so the result is a fixed point: filtering it
/// again returns it unchanged.
pub fn filter_by_distance(points: &[Point2], max_distance: f32) -> Vec<Point2> {
    let mut current = points.to_vec();
    while let Some(center) = Point2::centroid(&current) {
        let kept: Vec<Point2> = current
            .iter()
            .copied()
            .filter(|p| p.distance(&center) <= max_distance)
            .collect();
        if kept.len() == current.len() {
            break;
        }
        current = kept;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn blob(cx: f32, cy: f32, n: usize, spread: f32) -> Vec<Point2> {
        (0..n)
            .map(|i| {
                let a = i as f32 * 2.399;
                let r = spread * ((i % 5) as f32 + 1.0) / 5.0;
                Point2::new(cx + r * a.cos(), cy + r * a.sin())
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster(&[], 10.0).is_empty());
        assert!(filter_by_distance(&[], 10.0).is_empty());
    }

    #[test]
    fn test_tight_input_unchanged() {
        let points = blob(100.0, 100.0, 12, 5.0);
        assert_eq!(cluster(&points, 20.0), points);
    }

    #[test]
    fn test_largest_mode_wins() {
        let mut points = blob(50.0, 50.0, 6, 4.0);
        let big = blob(300.0, 200.0, 15, 6.0);
        points.extend(&big);
        points.push(Point2::new(600.0, 20.0));

        let result = cluster(&points, 25.0);
        assert_eq!(result, big);
    }

    #[test]
    fn test_equal_groups_prefer_first() {
        let first = blob(0.0, 0.0, 5, 3.0);
        let second = blob(500.0, 500.0, 5, 3.0);
        let points: Vec<Point2> = first.iter().chain(second.iter()).copied().collect();
        assert_eq!(cluster(&points, 20.0), first);
    }

    #[test]
    fn test_modes_converge_to_blob_centers() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(102.0, 0.0),
        ];
        let modes = MeanShift::new(10.0).modes(&points);
        assert!((modes[0].x - 1.0).abs() < 1e-3);
        assert!((modes[3].x - 101.0).abs() < 1e-3);
    }

    #[test]
    fn test_filter_drops_far_points() {
        let mut points = blob(10.0, 10.0, 10, 3.0);
        points.push(Point2::new(400.0, 400.0));
        let filtered = filter_by_distance(&points, 50.0);
        assert_eq!(filtered.len(), 10);
        assert!(filtered.iter().all(|p| p.x < 20.0));
    }

    proptest! {
        #[test]
        fn prop_filter_subset_and_idempotent(
            coords in prop::collection::vec((-500.0f32..500.0, -500.0f32..500.0), 0..40),
            max_distance in 1.0f32..400.0,
        ) {
            let points: Vec<Point2> = coords.iter().map(|&(x, y)| Point2::new(x, y)).collect();
            let once = filter_by_distance(&points, max_distance);
            prop_assert!(once.iter().all(|p| points.contains(p)));
            prop_assert_eq!(filter_by_distance(&once, max_distance), once);
        }

        #[test]
        fn prop_cluster_subset(
            coords in prop::collection::vec((0.0f32..300.0, 0.0f32..300.0), 0..30),
            bandwidth in 5.0f32..80.0,
        ) {
            let points: Vec<Point2> = coords.iter().map(|&(x, y)| Point2::new(x, y)).collect();
            let result = cluster(&points, bandwidth);
            prop_assert!(result.len() <= points.len());
            prop_assert_eq!(result.is_empty(), points.is_empty());
            prop_assert!(result.iter().all(|p| points.contains(p)));
        }
    }
}
