use objloc_core::{Correspondence, Descriptor};

/// Nearest and second-nearest candidates for one query descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoNearest {
    pub index: usize,
    pub best: f32,
    pub second: f32,
}

/// Two nearest candidates by linear scan; `None` with fewer than two candidates.
///
/// Only strictly smaller distances replace a slot, so the first candidate in
/// scan order wins ties.
pub fn two_nearest<D: Descriptor>(query: &D, candidates: &[D]) -> Option<TwoNearest> {
    if candidates.len() < 2 {
        return None;
    }

    let mut index = 0usize;
    let mut best = f32::INFINITY;
    let mut second = f32::INFINITY;

    for (j, candidate) in candidates.iter().enumerate() {
        let d = query.distance(candidate);
        if d < best {
            second = best;
            best = d;
            index = j;
        } else if d < second {
            second = d;
        }
    }

    Some(TwoNearest { index, best, second })
}

/// Nearest-neighbour distance ratio test
#[inline]
pub fn passes_ratio_test(best: f32, second: f32, ratio: f32) -> bool {
    best < ratio * second
}

/// Match every reference descriptor against the test set, keeping unambiguous pairs.
///
/// Output is ordered by reference index.
pub fn match_descriptors<D: Descriptor>(reference: &[D], test: &[D], ratio: f32) -> Vec<Correspondence> {
    reference
        .iter()
        .enumerate()
        .filter_map(|(i, query)| {
            let nn = two_nearest(query, test)?;
            passes_ratio_test(nn.best, nn.second, ratio).then(|| Correspondence::new(i, nn.index, nn.best))
        })
        .collect()
}
