//! Collaborative refinement of an agent's initial guesses.
//!
//! Every stage reads the initial guesses of the agent and of its neighbours
//! and returns the agent's refined guesses. Failed layouts fall back to the
//! initial guesses.
use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::{self, EntryList, GraphError, Guesses, Uid, WeightParams};
use crate::simulation::Agent;

/// Smallest clique that is worth its own layout.
const MIN_CLIQUE_SIZE: usize = 4;

fn agent(agents: &[Agent], uid: Uid) -> &Agent {
    &agents[uid as usize]
}

/// My guesses plus the guesses of each of my neighbours.
fn neighborhood(agents: &[Agent], me: &Agent) -> EntryList {
    let mut entries = EntryList::new();
    entries.insert(me.uid, me.initial.clone());
    for &neighbor in &me.neighbors {
        entries.insert(neighbor, agent(agents, neighbor).initial.clone());
    }
    entries
}

fn fall_back(me: &Agent, stage: &str, err: GraphError) -> Guesses {
    debug!(agent = me.uid, stage, %err, "layout failed, keeping initial guesses");
    me.initial.clone()
}

/// Mean of my guess and my neighbour's guess of me.
pub fn average_out(agents: &[Agent], me: &Agent) -> Guesses {
    me.neighbors
        .iter()
        .filter_map(|&neighbor| {
            let mine = *me.initial.get(&neighbor)?;
            let theirs = agent(agents, neighbor)
                .initial
                .get(&me.uid)
                .copied()
                .unwrap_or(mine);
            Some((neighbor, (mine + theirs) / 2.0))
        })
        .collect()
}

pub fn one_round_stress_majorization(agents: &[Agent], me: &Agent) -> Guesses {
    if me.neighbors.len() <= 1 {
        return me.initial.clone();
    }

    match graph::ormds(me.uid, &neighborhood(agents, me)) {
        Ok(guesses) => guesses,
        Err(err) => fall_back(me, "OneRoundStressMajorization", err),
    }
}

/// Weighted layout of the neighbourhood and its average stress, or nothing
/// when there are too few neighbours to bother.
pub fn weighted(agents: &[Agent], me: &Agent, params: &WeightParams) -> Option<(Guesses, f64)> {
    if me.neighbors.len() <= 2 {
        return None;
    }

    match graph::weighted_ormds(me.uid, &neighborhood(agents, me), params) {
        Ok(result) => Some(result),
        Err(err) => Some((fall_back(me, "weightedORMDS", err), 0.0)),
    }
}

/// Index of the attempt that moved furthest from the baseline, summing
/// relative deltas over the baseline's neighbours.
fn highest_difference(baseline: &Guesses, attempts: &[Guesses]) -> Option<usize> {
    let mut worst = None;
    let mut highest = f64::NEG_INFINITY;

    for (index, attempt) in attempts.iter().enumerate() {
        let difference: f64 = baseline
            .iter()
            .filter_map(|(neighbor, a)| {
                let b = attempt.get(neighbor)?;
                let mean = (a + b) / 2.0;
                (mean != 0.0).then(|| ((a - b) / mean).abs())
            })
            .sum();

        if difference > highest {
            highest = difference;
            worst = Some(index);
        }
    }

    worst
}

fn try_drop_neighbor(me: &Agent, entries: &EntryList, params: &WeightParams) -> Result<Guesses, GraphError> {
    let (baseline, _) = graph::weighted_ormds(me.uid, entries, params)?;

    let mut attempts = me
        .neighbors
        .iter()
        .map(|neighbor| {
            let mut without = entries.clone();
            without.remove(neighbor);
            graph::weighted_ormds(me.uid, &without, params).map(|(guesses, _)| guesses)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some(worst) = highest_difference(&baseline, &attempts) else {
        return Ok(baseline);
    };

    let dropped = me.neighbors[worst];
    let mut guesses = attempts.swap_remove(worst);
    if let Some(&initial) = me.initial.get(&dropped) {
        guesses.insert(dropped, initial);
    }

    Ok(guesses)
}

/// Weighted layout without the neighbour that distorts it most. That
/// neighbour keeps its initial guess.
pub fn weighted_drop_neighbor(agents: &[Agent], me: &Agent, params: &WeightParams) -> Guesses {
    if me.neighbors.len() <= 1 {
        return me.initial.clone();
    }

    match try_drop_neighbor(me, &neighborhood(agents, me), params) {
        Ok(guesses) => guesses,
        Err(err) => fall_back(me, "weightedORMDS_drop", err),
    }
}

fn try_drop_link(me: &Agent, entries: &EntryList, params: &WeightParams) -> Result<Guesses, GraphError> {
    let (baseline, _) = graph::weighted_ormds(me.uid, entries, params)?;

    let mut attempts = Vec::new();
    for (index, a) in me.neighbors.iter().enumerate() {
        for b in &me.neighbors[index + 1..] {
            let mut without = entries.clone();
            if let Some(guesses) = without.get_mut(a) {
                guesses.remove(b);
            }
            if let Some(guesses) = without.get_mut(b) {
                guesses.remove(a);
            }
            attempts.push(graph::weighted_ormds(me.uid, &without, params)?.0);
        }
    }

    match highest_difference(&baseline, &attempts) {
        Some(worst) => Ok(attempts.swap_remove(worst)),
        None => Ok(baseline),
    }
}

/// Weighted layout without the neighbour-to-neighbour link that distorts it
/// most.
pub fn weighted_drop_link(agents: &[Agent], me: &Agent, params: &WeightParams) -> Guesses {
    if me.neighbors.len() <= 1 {
        return me.initial.clone();
    }

    match try_drop_link(me, &neighborhood(agents, me), params) {
        Ok(guesses) => guesses,
        Err(err) => fall_back(me, "weightedORMDS_dropLink", err),
    }
}

/// Grow a clique from `members` by `candidate`, then greedily by whoever in
/// `potential` is adjacent to everyone so far. A branch only reports the
/// members it started with, so the last member of a chain is never counted.
fn grow_clique(agents: &[Agent], members: &[Uid], candidate: Uid, mut potential: Vec<Uid>) -> Vec<Uid> {
    let mut clique = members.to_vec();
    clique.push(candidate);

    let adjacent = &agent(agents, candidate).neighbors;
    potential.retain(|uid| adjacent.contains(uid));

    let look_through: Vec<Uid> = potential
        .iter()
        .copied()
        .filter(|uid| !clique.contains(uid))
        .collect();

    let mut largest = members.to_vec();
    for &next in &look_through {
        let grown = grow_clique(agents, &clique, next, potential.clone());
        let size = grown.len();
        if size > largest.len() {
            largest = grown;
        }

        // more than half of the candidates is as good as it gets
        if size as f64 > (look_through.len() as f64 + 1.0) / 2.0 {
            break;
        }
    }

    largest
}

/// Largest clique found through me and each neighbour, per member.
fn max_cliques(agents: &[Agent], me: &Agent) -> BTreeMap<Uid, Vec<Uid>> {
    let mut best: BTreeMap<Uid, Vec<Uid>> = BTreeMap::new();

    for &neighbor in &me.neighbors {
        let clique = grow_clique(agents, &[me.uid], neighbor, me.neighbors.clone());
        for &member in &clique {
            let entry = best.entry(member).or_default();
            if entry.len() < clique.len() {
                *entry = clique.clone();
            }
        }
    }

    best
}

/// Lay out each large clique I share with a neighbour on its own and take
/// that neighbour's distance from it.
pub fn clique(agents: &[Agent], me: &Agent) -> Guesses {
    let mut guesses = me.initial.clone();
    if me.neighbors.len() <= 2 {
        return guesses;
    }

    let cliques = max_cliques(agents, me);
    for &neighbor in &me.neighbors {
        let Some(members) = cliques.get(&neighbor) else {
            continue;
        };
        if members.len() < MIN_CLIQUE_SIZE {
            continue;
        }

        let entries: EntryList = members
            .iter()
            .map(|&member| {
                let known = &agent(agents, member).initial;
                let inner: Guesses = members
                    .iter()
                    .filter(|&&other| other != member)
                    .filter_map(|other| known.get(other).map(|distance| (*other, *distance)))
                    .collect();
                (member, inner)
            })
            .collect();

        match graph::ormds(me.uid, &entries) {
            Ok(distances) => {
                if let Some(&distance) = distances.get(&neighbor) {
                    guesses.insert(neighbor, distance);
                }
            }
            Err(err) => {
                debug!(agent = me.uid, neighbor, %err, "clique layout failed");
            }
        }
    }

    guesses
}

#[cfg(test)]
mod tests {
    use crate::graph::{Guesses, WeightParams};
    use crate::simulation::{Agent, PhonePosition, Role};

    use super::{
        average_out, clique, highest_difference, max_cliques, one_round_stress_majorization,
        weighted, weighted_drop_link, weighted_drop_neighbor,
    };

    /// Fully connected agents on the given points guessing exact distances,
    /// except where `skew` says otherwise.
    fn crowd(points: &[(f64, f64)], skew: &[(u32, u32, f64)]) -> Vec<Agent> {
        let mut agents: Vec<Agent> = points
            .iter()
            .enumerate()
            .map(|(uid, (x, y))| {
                Agent::new(uid as u32, uid as u32, *x, *y, 30.0, PhonePosition::InHand, Role::Benign)
            })
            .collect();

        for i in 0..agents.len() {
            for j in 0..agents.len() {
                if i != j {
                    let distance = agents[i].distance_to(&agents[j]);
                    agents[i].add_neighbor(j as u32);
                    agents[i].initial.insert(j as u32, distance);
                }
            }
        }

        for &(from, to, distance) in skew {
            agents[from as usize].initial.insert(to, distance);
        }

        agents
    }

    const SQUARE: [(f64, f64); 5] = [(0.0, 0.0), (3.0, 0.0), (0.0, 4.0), (3.0, 4.0), (1.5, 2.0)];

    #[test]
    fn average_with_neighbor_view() {
        let agents = crowd(&SQUARE[..2], &[(1, 0, 5.0)]);
        let averaged = average_out(&agents, &agents[0]);
        assert_eq!(averaged, Guesses::from([(1, 4.0)]));
    }

    #[test]
    fn exact_neighborhood_is_stable() {
        let agents = crowd(&SQUARE, &[]);
        let me = &agents[0];

        let refined = one_round_stress_majorization(&agents, me);
        assert!((refined[&3] - 5.0).abs() < 1e-3);

        let (refined, stress) = weighted(&agents, me, &WeightParams::default()).unwrap();
        assert!(stress < 1e-6);
        assert!((refined[&1] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn few_neighbors_skip_layouts() {
        let agents = crowd(&SQUARE[..3], &[]);
        assert!(weighted(&agents, &agents[0], &WeightParams::default()).is_none());
        assert_eq!(clique(&agents, &agents[0]), agents[0].initial);

        let agents = crowd(&SQUARE[..2], &[]);
        assert_eq!(
            one_round_stress_majorization(&agents, &agents[0]),
            agents[0].initial
        );
        assert_eq!(
            weighted_drop_neighbor(&agents, &agents[0], &WeightParams::default()),
            agents[0].initial
        );
    }

    #[test]
    fn pick_most_disruptive_attempt() {
        let baseline = Guesses::from([(1, 4.0), (2, 4.0)]);
        let attempts = vec![
            Guesses::from([(1, 4.0), (2, 5.0)]),
            Guesses::from([(1, 2.0), (2, 6.0)]),
            Guesses::from([(1, 4.0)]),
        ];
        assert_eq!(highest_difference(&baseline, &attempts), Some(1));
        assert_eq!(highest_difference(&baseline, &[]), None);
    }

    #[test]
    fn dropped_neighbor_keeps_initial_guess() {
        let agents = crowd(&SQUARE, &[(1, 0, 20.0), (0, 1, 20.0)]);
        let me = &agents[0];

        let refined = weighted_drop_neighbor(&agents, me, &WeightParams::default());
        assert_eq!(refined.len(), me.neighbors.len());
        assert!(refined.values().all(|distance| distance.is_finite()));

        let refined = weighted_drop_link(&agents, me, &WeightParams::default());
        assert_eq!(refined.len(), me.neighbors.len());
    }

    #[test]
    fn cliques_span_connected_crowd() {
        let agents = crowd(&SQUARE, &[]);
        let cliques = max_cliques(&agents, &agents[0]);
        assert_eq!(cliques[&1], vec![0, 1, 2, 3]);
        assert_eq!(cliques[&4].len(), 4);

        let refined = clique(&agents, &agents[0]);
        assert!((refined[&3] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn four_people_are_too_few_for_a_clique_layout() {
        let agents = crowd(&SQUARE[..4], &[(0, 3, 9.0)]);
        let cliques = max_cliques(&agents, &agents[0]);
        assert!(cliques.values().all(|members| members.len() == 3));

        assert_eq!(clique(&agents, &agents[0]), agents[0].initial);
    }
}
