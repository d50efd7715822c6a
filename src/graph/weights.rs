use nalgebra::DMatrix;

use crate::config::WeightScheme;
use crate::graph::matrix::disagreement;
use crate::graph::WeightParams;

/// Spring weight of every link in the layout.
///
/// `guesses` is the raw (unsymmetrised, estimated) guess matrix and `missing`
/// the disagreement accumulated while estimating unknown entries.
pub fn weight_matrix(guesses: &DMatrix<f64>, missing: &DMatrix<f64>, params: &WeightParams) -> DMatrix<f64> {
    let n = guesses.nrows();

    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            return 1.0;
        }

        let dis = if missing[(i, j)] != 0.0 {
            missing[(i, j)]
        } else {
            disagreement(guesses, i, j, params.disagreement)
        };
        let direct = (guesses[(i, j)] + guesses[(j, i)]) / 2.0;
        let pre = params.bias + params.separation * direct + params.discrepancy * dis;

        match params.scheme {
            WeightScheme::Absolute => (-pre).exp(),
            WeightScheme::Fractional => pre.powf(-params.alpha),
        }
    })
}
