//! Collaborative layout of a neighbourhood from shared distance guesses.
//!
//! An agent collects its own guesses and the guesses of its neighbours into
//! an [`EntryList`], embeds all of them in the plane and reads corrected
//! distances back from the layout.
mod layout;
mod matrix;
mod weights;

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use thiserror::Error;

use crate::config::{Disagreement, Parameters, WeightScheme};

pub type Uid = u32;

/// Guessed distance per neighbour uid.
pub type Guesses = BTreeMap<Uid, f64>;

/// Guesses of every participant, keyed by the uid that made them.
pub type EntryList = BTreeMap<Uid, Guesses>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("caller {0} is not part of the entry list")]
    MissingCaller(Uid),

    #[error("a layout needs at least two nodes, got {0}")]
    TooFewNodes(usize),

    #[error("layout has non-finite coordinates")]
    NonFinite,
}

/// Tuning of the weighted layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightParams {
    pub alpha: f64,
    pub bias: f64,
    pub separation: f64,
    pub discrepancy: f64,
    pub scheme: WeightScheme,
    pub disagreement: Disagreement,
    pub stress_min: f64,
    pub stress_max: f64,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self::from_parameters(&Parameters::default())
    }
}

impl WeightParams {
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            alpha: parameters.alpha,
            bias: parameters.weight_bias,
            separation: parameters.weight_separation,
            discrepancy: parameters.weight_discrepancy,
            scheme: parameters.weights,
            disagreement: parameters.delta,
            stress_min: parameters.thresh_stress_min,
            stress_max: parameters.thresh_stress_max,
        }
    }

    /// Whether a layout with this average stress may replace the guesses.
    /// Negative thresholds are unset.
    pub fn accepts(&self, stress: f64) -> bool {
        let above_min = self.stress_min < 0.0 || stress > self.stress_min;
        let below_max = self.stress_max < 0.0 || stress < self.stress_max;
        above_min && below_max
    }
}

/// Drop guesses about uids that have no entry of their own.
pub fn sanitize(entries: &EntryList) -> EntryList {
    entries
        .iter()
        .map(|(uid, guesses)| {
            let known = guesses
                .iter()
                .filter(|(other, _)| entries.contains_key(other))
                .map(|(other, distance)| (*other, *distance))
                .collect();
            (*uid, known)
        })
        .collect()
}

/// Node coordinates in the plane.
#[derive(Debug, Clone)]
pub struct Layout {
    ids: Vec<Uid>,
    coordinates: DMatrix<f64>,
}

impl Layout {
    pub fn position(&self, uid: Uid) -> Option<(f64, f64)> {
        let i = matrix::index_of(&self.ids, uid)?;
        Some((self.coordinates[(i, 0)], self.coordinates[(i, 1)]))
    }

    pub fn distance(&self, a: Uid, b: Uid) -> Option<f64> {
        let (ax, ay) = self.position(a)?;
        let (bx, by) = self.position(b)?;
        Some((ax - bx).hypot(ay - by))
    }

    /// Layout distance from `caller` to every uid it guessed.
    fn distances_from(&self, caller: Uid, entries: &EntryList) -> Result<Guesses, GraphError> {
        let guesses = entries
            .get(&caller)
            .ok_or(GraphError::MissingCaller(caller))?;

        guesses
            .keys()
            .map(|neighbor| match self.distance(caller, *neighbor) {
                Some(distance) if distance.is_finite() => Ok((*neighbor, distance)),
                _ => Err(GraphError::NonFinite),
            })
            .collect()
    }
}

/// Fill, symmetrise and embed the guess matrix of `caller`.
fn initial_layout(
    caller: Uid,
    entries: &EntryList,
) -> Result<(Vec<Uid>, DMatrix<f64>, DMatrix<f64>), GraphError> {
    let ids = matrix::node_ids(entries);
    let raw = matrix::guess_matrix(caller, entries, &ids)?;
    let coordinates = layout::classical_mds(&matrix::symmetrize(
        &matrix::estimate_missing_distances(&raw),
    ))?;
    Ok((ids, raw, coordinates))
}

/// Layout of the neighbourhood refined by unweighted stress majorization.
pub fn ormds_layout(caller: Uid, entries: &EntryList) -> Result<Layout, GraphError> {
    let entries = sanitize(entries);
    let (ids, _, mut coordinates) = initial_layout(caller, &entries)?;
    layout::stress_majorization(&mut coordinates, &ids, &entries);

    Ok(Layout { ids, coordinates })
}

/// Distances from `caller` to its neighbours after laying out the
/// neighbourhood.
pub fn ormds(caller: Uid, entries: &EntryList) -> Result<Guesses, GraphError> {
    let sanitized = sanitize(entries);
    ormds_layout(caller, &sanitized)?.distances_from(caller, &sanitized)
}

/// Layout refined by stress majorization and then weighted stress
/// majorization, with its total stress.
pub fn weighted_layout(
    caller: Uid,
    entries: &EntryList,
    params: &WeightParams,
) -> Result<(Layout, f64), GraphError> {
    let entries = sanitize(entries);
    let (ids, raw, mut initial) = initial_layout(caller, &entries)?;
    layout::stress_majorization(&mut initial, &ids, &entries);

    let estimated = matrix::estimate_missing_distances(&raw);
    let missing = matrix::estimate_missing_weights(&raw, params.disagreement);
    let weights = weights::weight_matrix(&estimated, &missing, params);
    let (coordinates, stress) =
        layout::weighted_stress_majorization(initial, &matrix::symmetrize(&estimated), &weights);

    if !coordinates.iter().all(|value| value.is_finite()) {
        return Err(GraphError::NonFinite);
    }

    Ok((Layout { ids, coordinates }, stress))
}

/// Weighted layout distances from `caller` and the average stress per
/// neighbour. When the stress gate rejects the layout, the caller's own
/// guesses come back unchanged.
pub fn weighted_ormds(
    caller: Uid,
    entries: &EntryList,
    params: &WeightParams,
) -> Result<(Guesses, f64), GraphError> {
    let sanitized = sanitize(entries);
    let (layout, stress) = weighted_layout(caller, &sanitized, params)?;

    let neighbors = sanitized.get(&caller).map_or(0, |guesses| guesses.len());
    let average = if neighbors == 0 {
        0.0
    } else {
        stress / neighbors as f64
    };

    if params.accepts(average) {
        Ok((layout.distances_from(caller, &sanitized)?, average))
    } else {
        let original = sanitized
            .get(&caller)
            .cloned()
            .ok_or(GraphError::MissingCaller(caller))?;
        Ok((original, average))
    }
}
