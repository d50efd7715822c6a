use nalgebra::{DMatrix, SymmetricEigen};

use crate::graph::matrix::index_of;
use crate::graph::{EntryList, GraphError, Uid};

/// Sweeps of the unweighted majorization.
pub const SWEEPS: usize = 100;

pub const MAX_ITERATIONS: usize = 100;

/// Relative stress change below which weighted majorization stops.
pub const TOLERANCE: f64 = 1e-5;

const DIMENSIONS: usize = 2;

fn inverse(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        1.0 / value
    }
}

fn norm(coordinates: &DMatrix<f64>, i: usize, j: usize) -> f64 {
    (coordinates[(i, 0)] - coordinates[(j, 0)]).hypot(coordinates[(i, 1)] - coordinates[(j, 1)])
}

/// Embed a symmetric distance matrix in the plane.
///
/// Returns one row of `(x, y)` per node.
pub fn classical_mds(distances: &DMatrix<f64>) -> Result<DMatrix<f64>, GraphError> {
    let n = distances.nrows();
    if n < 2 {
        return Err(GraphError::TooFewNodes(n));
    }

    let squared = distances.map(|d| d * d);
    let centering = DMatrix::<f64>::identity(n, n) - DMatrix::from_element(n, n, 1.0 / n as f64);
    let centered = (&centering * &squared * &centering) * -0.5;

    let eigen = SymmetricEigen::new(centered);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut coordinates = DMatrix::zeros(n, DIMENSIONS);
    for (axis, &k) in order.iter().take(DIMENSIONS).enumerate() {
        let scale = eigen.eigenvalues[k].max(0.0).sqrt();
        for i in 0..n {
            coordinates[(i, axis)] = eigen.eigenvectors[(i, k)] * scale;
        }
    }

    if coordinates.iter().all(|value| value.is_finite()) {
        Ok(coordinates)
    } else {
        Err(GraphError::NonFinite)
    }
}

/// Gauss-Seidel stress majorization using only the guesses each node made.
pub fn stress_majorization(coordinates: &mut DMatrix<f64>, ids: &[Uid], entries: &EntryList) {
    for _ in 0..SWEEPS {
        for (uid, guesses) in entries {
            let Some(i) = index_of(ids, *uid) else {
                continue;
            };

            let mut sum = [0.0; DIMENSIONS];
            let mut count = 0;
            for (other, distance) in guesses {
                let Some(j) = index_of(ids, *other) else {
                    continue;
                };

                let inv = inverse(norm(coordinates, i, j));
                for (axis, total) in sum.iter_mut().enumerate() {
                    let (xi, xj) = (coordinates[(i, axis)], coordinates[(j, axis)]);
                    *total += xj + distance * (xi - xj) * inv;
                }
                count += 1;
            }

            if count > 0 {
                for (axis, total) in sum.into_iter().enumerate() {
                    coordinates[(i, axis)] = total / count as f64;
                }
            }
        }
    }
}

/// Weighted stress `Σ_{i<j} w_ij (|x_i - x_j| - d_ij)²`.
pub fn stress(coordinates: &DMatrix<f64>, distances: &DMatrix<f64>, weights: &DMatrix<f64>) -> f64 {
    let mut total = 0.0;
    for i in 0..coordinates.nrows() {
        for j in 0..i {
            let residual = norm(coordinates, i, j) - distances[(i, j)];
            total += weights[(i, j)] * residual * residual;
        }
    }
    total
}

/// Weighted stress majorization starting from `initial`.
///
/// Returns the final layout and its total stress.
pub fn weighted_stress_majorization(
    initial: DMatrix<f64>,
    distances: &DMatrix<f64>,
    weights: &DMatrix<f64>,
) -> (DMatrix<f64>, f64) {
    let n = initial.nrows();
    let mut coordinates = initial;
    let mut previous = stress(&coordinates, distances, weights);

    let mut iteration = 0;
    let mut change = f64::INFINITY;
    while iteration < MAX_ITERATIONS && change > TOLERANCE {
        iteration += 1;

        for axis in 0..DIMENSIONS {
            for i in 0..n {
                let xi = coordinates[(i, axis)];
                let mut numerator = 0.0;
                let mut denominator = 0.0;

                for j in 0..n {
                    if i == j {
                        continue;
                    }

                    let weight = weights[(i, j)];
                    let xj = coordinates[(j, axis)];
                    let inv = inverse(norm(&coordinates, i, j));

                    denominator += weight;
                    numerator += weight * (xj + distances[(i, j)] * (xi - xj) * inv);
                }

                if denominator > 0.0 {
                    coordinates[(i, axis)] = numerator / denominator;
                }
            }
        }

        let current = stress(&coordinates, distances, weights);
        change = if previous == 0.0 {
            0.0
        } else {
            (previous - current).abs() / previous
        };
        previous = current;
    }

    (coordinates, previous)
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use crate::graph::{EntryList, GraphError, Guesses};

    use super::{classical_mds, norm, stress, stress_majorization, weighted_stress_majorization};

    fn triangle() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[0.0, 3.0, 4.0, 3.0, 0.0, 5.0, 4.0, 5.0, 0.0])
    }

    #[test]
    fn mds_recovers_euclidean_distances() {
        let distances = triangle();
        let coordinates = classical_mds(&distances).unwrap();

        for i in 0..3 {
            for j in 0..3 {
                assert!((norm(&coordinates, i, j) - distances[(i, j)]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn mds_needs_two_nodes() {
        let distances = DMatrix::zeros(1, 1);
        assert_eq!(classical_mds(&distances).unwrap_err(), GraphError::TooFewNodes(1));
    }

    #[test]
    fn majorization_keeps_consistent_layout() {
        let distances = triangle();
        let mut coordinates = classical_mds(&distances).unwrap();

        let mut entries = EntryList::new();
        entries.insert(0, Guesses::from([(1, 3.0), (2, 4.0)]));
        entries.insert(1, Guesses::from([(0, 3.0), (2, 5.0)]));
        entries.insert(2, Guesses::from([(0, 4.0), (1, 5.0)]));

        stress_majorization(&mut coordinates, &[0, 1, 2], &entries);
        assert!((norm(&coordinates, 0, 1) - 3.0).abs() < 1e-3);
        assert!((norm(&coordinates, 1, 2) - 5.0).abs() < 1e-3);
    }

    #[test]
    fn weighted_majorization_lowers_stress() {
        let distances = triangle();
        let weights = DMatrix::from_element(3, 3, 1.0);
        let start = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.5, 0.5, 2.0]);

        let before = stress(&start, &distances, &weights);
        let (_, after) = weighted_stress_majorization(start, &distances, &weights);
        assert!(after < before);
    }
}
