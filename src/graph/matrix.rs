use std::collections::BTreeSet;

use nalgebra::DMatrix;

use crate::config::Disagreement;
use crate::graph::{EntryList, GraphError, Uid};

/// Marks a distance nobody guessed.
pub const UNKNOWN: f64 = -1.0;

/// Relative disagreement is scaled to the order of magnitude of distances.
const RELATIVE_SCALE: f64 = 15.0;

/// Sorted union of every uid mentioned in the entry list.
pub fn node_ids(entries: &EntryList) -> Vec<Uid> {
    let mut ids = BTreeSet::new();
    for (uid, guesses) in entries {
        ids.insert(*uid);
        ids.extend(guesses.keys().copied());
    }
    ids.into_iter().collect()
}

pub fn index_of(ids: &[Uid], uid: Uid) -> Option<usize> {
    ids.binary_search(&uid).ok()
}

/// Square guess matrix over `ids`, filled for the caller and its neighbours.
pub fn guess_matrix(caller: Uid, entries: &EntryList, ids: &[Uid]) -> Result<DMatrix<f64>, GraphError> {
    let caller_guesses = entries
        .get(&caller)
        .ok_or(GraphError::MissingCaller(caller))?;

    let mut matrix = DMatrix::zeros(ids.len(), ids.len());

    let rows = std::iter::once(caller).chain(caller_guesses.keys().copied());
    for uid in rows {
        let (Some(guesses), Some(i)) = (entries.get(&uid), index_of(ids, uid)) else {
            continue;
        };

        for (j, other) in ids.iter().enumerate() {
            matrix[(i, j)] = if *other == uid {
                0.0
            } else {
                guesses.get(other).copied().unwrap_or(UNKNOWN)
            };
        }
    }

    Ok(matrix)
}

pub fn disagreement(matrix: &DMatrix<f64>, i: usize, j: usize, mode: Disagreement) -> f64 {
    let (a, b) = (matrix[(i, j)], matrix[(j, i)]);
    match mode {
        Disagreement::Absolute => (a - b).abs(),
        Disagreement::Relative => {
            let sum = (a + b).abs();
            if sum == 0.0 {
                0.0
            } else {
                (a - b).abs() / sum * RELATIVE_SCALE
            }
        }
    }
}

/// Bounds used to fill in one unknown entry.
struct MissingPath {
    upper: f64,
    lower: f64,
    upper_hop: Option<usize>,
    lower_edge: Option<(usize, usize)>,
}

fn missing_path(matrix: &DMatrix<f64>, i: usize, j: usize) -> MissingPath {
    let mut path = MissingPath {
        upper: matrix[(i, 0)] + matrix[(0, j)],
        lower: matrix[(i, 0)] + matrix[(0, j)],
        upper_hop: None,
        lower_edge: None,
    };

    for h in 0..matrix.nrows() {
        let (ih, hj) = (matrix[(i, h)], matrix[(h, j)]);

        if ih != UNKNOWN && hj != UNKNOWN && (ih + hj < path.upper || path.upper == UNKNOWN) {
            path.upper = ih + hj;
            path.upper_hop = Some(h);
        }

        if ih > 0.0 && (ih < path.lower || path.lower <= 0.0) {
            path.lower = ih;
            path.lower_edge = Some((i, h));
        }

        if hj > 0.0 && (hj < path.lower || path.lower <= 0.0) {
            path.lower = hj;
            path.lower_edge = Some((h, j));
        }
    }

    path
}

/// Replace every unknown entry with the mean of a triangle upper bound and
/// the smallest known distance touching either end.
pub fn estimate_missing_distances(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let mut estimated = matrix.clone();

    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if matrix[(i, j)] == UNKNOWN {
                let path = missing_path(matrix, i, j);
                estimated[(i, j)] = (path.upper + path.lower) / 2.0;
            }
        }
    }

    estimated
}

/// Disagreement along the paths used to estimate each unknown entry, zero
/// for known entries.
pub fn estimate_missing_weights(matrix: &DMatrix<f64>, mode: Disagreement) -> DMatrix<f64> {
    let mut weights = DMatrix::zeros(matrix.nrows(), matrix.ncols());

    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if matrix[(i, j)] != UNKNOWN {
                continue;
            }

            let path = missing_path(matrix, i, j);
            let upper = path.upper_hop.map_or(0.0, |h| {
                disagreement(matrix, i, h, mode) + disagreement(matrix, j, h, mode)
            });
            let lower = path
                .lower_edge
                .map_or(0.0, |(a, b)| disagreement(matrix, a, b, mode));

            weights[(i, j)] = upper + lower;
        }
    }

    weights
}

/// Average a matrix with its transpose.
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use crate::config::Disagreement;
    use crate::graph::{EntryList, GraphError, Guesses};

    use super::{
        disagreement, estimate_missing_distances, estimate_missing_weights, guess_matrix,
        node_ids, symmetrize, UNKNOWN,
    };

    fn entries() -> EntryList {
        let mut entries = EntryList::new();
        entries.insert(0, Guesses::from([(1, 3.0), (2, 4.0)]));
        entries.insert(1, Guesses::from([(0, 3.0)]));
        entries.insert(2, Guesses::from([(0, 4.0)]));
        entries
    }

    #[test]
    fn matrix_marks_unknown_entries() {
        let entries = entries();
        let ids = node_ids(&entries);
        assert_eq!(ids, vec![0, 1, 2]);

        let matrix = guess_matrix(0, &entries, &ids).unwrap();
        assert_eq!(matrix[(0, 1)], 3.0);
        assert_eq!(matrix[(1, 1)], 0.0);
        assert_eq!(matrix[(1, 2)], UNKNOWN);
        assert_eq!(matrix[(2, 1)], UNKNOWN);

        assert_eq!(
            guess_matrix(9, &entries, &ids).unwrap_err(),
            GraphError::MissingCaller(9)
        );
    }

    #[test]
    fn estimate_uses_triangle_bounds() {
        let entries = entries();
        let ids = node_ids(&entries);
        let matrix = guess_matrix(0, &entries, &ids).unwrap();

        // upper bound 3 + 4 through node 0, lower bound the shortest edge 3
        let estimated = estimate_missing_distances(&matrix);
        assert_eq!(estimated[(1, 2)], 5.0);
        assert_eq!(estimated[(0, 1)], 3.0);

        let weights = estimate_missing_weights(&matrix, Disagreement::Absolute);
        assert_eq!(weights[(1, 2)], 0.0);
        assert_eq!(weights[(0, 1)], 0.0);
    }

    #[test]
    fn disagreement_modes() {
        let matrix = DMatrix::from_row_slice(2, 2, &[0.0, 4.0, 2.0, 0.0]);
        assert_eq!(disagreement(&matrix, 0, 1, Disagreement::Absolute), 2.0);
        assert_eq!(disagreement(&matrix, 0, 1, Disagreement::Relative), 5.0);
        assert_eq!(disagreement(&matrix, 0, 0, Disagreement::Relative), 0.0);

        let symmetric = symmetrize(&matrix);
        assert_eq!(symmetric[(0, 1)], 3.0);
        assert_eq!(symmetric[(1, 0)], 3.0);
    }
}
