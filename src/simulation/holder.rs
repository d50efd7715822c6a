use rand::Rng;
use tracing::{debug, trace};

use crate::files::PrecompiledDistances;
use crate::graph::{Guesses, Uid, WeightParams};
use crate::metrics::{Metrics, Part, Record};
use crate::simulation::adversary::malicious_guess;
use crate::simulation::refine;
use crate::simulation::{Agent, DistanceSource, PhonePosition, Role, Strategy};

/// Longest range of any agent, and the side of a sector.
pub const AGENT_MAX_RANGE: f64 = 30.0;

/// Sector coordinates `(column, row)`.
pub type SectorId = (usize, usize);

/// Refinement stages enabled for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stages {
    pub average_out: bool,
    pub stress_majorization: bool,
    pub clique_mds: bool,
    pub weighted: bool,
    pub drop_neighbor: bool,
    pub drop_link: bool,
}

/// Everything a round needs besides the population itself.
pub struct RoundContext<'a> {
    pub source: &'a DistanceSource,
    pub stages: Stages,
    pub weights: WeightParams,
    pub symmetric: bool,
    pub drop_rate: f64,
    pub time: u64,
}

/// How malicious identities are spread over the population.
#[derive(Debug, Clone, Copy)]
pub struct Adversaries {
    pub identities: u32,
    pub malicious: u32,
    pub sybil_multiplier: u32,
    pub strategy: Strategy,
}

#[derive(Debug, Default)]
struct Sector {
    agents: Vec<Uid>,
}

/// The population of a scene, bucketed into square sectors so neighbour
/// discovery only looks at nearby agents.
#[derive(Debug)]
pub struct AgentHolder {
    agents: Vec<Agent>,
    sectors: Vec<Sector>,
    columns: usize,
    rows: usize,
    adversaries: Adversaries,
    identities: u32,
    malicious_identities: u32,
}

fn sector_count(bound: f64) -> usize {
    if bound.is_finite() && bound > 0.0 {
        ((bound / AGENT_MAX_RANGE).ceil() as usize).max(1)
    } else {
        1
    }
}

fn sector_index(coordinate: f64, count: usize) -> usize {
    if coordinate.is_finite() && coordinate > 0.0 {
        ((coordinate / AGENT_MAX_RANGE) as usize).min(count - 1)
    } else {
        0
    }
}

impl AgentHolder {
    pub fn new(x_bound: f64, y_bound: f64, adversaries: Adversaries) -> Self {
        let columns = sector_count(x_bound);
        let rows = sector_count(y_bound);

        Self {
            agents: Vec::new(),
            sectors: (0..columns * rows).map(|_| Sector::default()).collect(),
            columns,
            rows,
            adversaries,
            identities: 0,
            malicious_identities: 0,
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn active(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|agent| agent.is_active())
    }

    pub fn benign(&self) -> impl Iterator<Item = &Agent> {
        self.active().filter(|agent| !agent.is_malicious())
    }

    pub fn malicious(&self) -> impl Iterator<Item = &Agent> {
        self.active().filter(|agent| agent.is_malicious())
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    /// Add the person with the next scene id. Decides whether they are
    /// malicious so that exactly the configured number of identities are,
    /// and creates one agent per Sybil identity for them.
    ///
    /// Returns whether the identity is malicious.
    pub fn add_identity<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        x: f64,
        y: f64,
        range: f64,
        position: PhonePosition,
    ) -> bool {
        let scene_id = self.identities;
        let remaining = self.adversaries.identities.saturating_sub(self.identities);
        let malicious_left = self
            .adversaries
            .malicious
            .saturating_sub(self.malicious_identities);

        let malicious = if remaining == 0 {
            malicious_left > 0
        } else {
            rng.gen::<f64>() < f64::from(malicious_left) / f64::from(remaining)
        };
        self.identities += 1;

        if malicious {
            self.malicious_identities += 1;
            for _ in 0..self.adversaries.sybil_multiplier {
                let uid = self.agents.len() as Uid;
                self.agents.push(Agent::new(
                    uid,
                    scene_id,
                    x,
                    y,
                    range,
                    position,
                    Role::Malicious(self.adversaries.strategy),
                ));
            }
        } else {
            let uid = self.agents.len() as Uid;
            self.agents
                .push(Agent::new(uid, scene_id, x, y, range, position, Role::Benign));
        }

        malicious
    }

    pub fn sector_of(&self, x: f64, y: f64) -> SectorId {
        (sector_index(x, self.columns), sector_index(y, self.rows))
    }

    fn sector(&self, (column, row): SectorId) -> &Sector {
        &self.sectors[column * self.rows + row]
    }

    /// The sector itself and its eight neighbours, wrapping around the
    /// field edges.
    pub fn adjacent_sectors(&self, (column, row): SectorId) -> Vec<SectorId> {
        let mut adjacent = Vec::with_capacity(9);
        for dx in [self.columns - 1, 0, 1] {
            for dy in [self.rows - 1, 0, 1] {
                let sector = ((column + dx) % self.columns, (row + dy) % self.rows);
                if !adjacent.contains(&sector) {
                    adjacent.push(sector);
                }
            }
        }
        adjacent
    }

    pub fn fit_into_sectors(&mut self) {
        for sector in &mut self.sectors {
            sector.agents.clear();
        }

        for i in 0..self.agents.len() {
            if !self.agents[i].is_active() {
                self.agents[i].sector = None;
                continue;
            }

            let id = self.sector_of(self.agents[i].x, self.agents[i].y);
            self.agents[i].sector = Some(id);
            self.sectors[id.0 * self.rows + id.1]
                .agents
                .push(self.agents[i].uid);
        }
    }

    pub fn reset_for_round(&mut self) {
        for agent in &mut self.agents {
            agent.reset_for_round();
        }
    }

    fn link(&mut self, from: Uid, to: Uid) {
        self.agents[from as usize].add_neighbor(to);
    }

    /// Neighbours are agents within range. With `symmetric` both have to be
    /// in range of each other and the link goes both ways.
    pub fn find_neighbors_by_locality(&mut self, symmetric: bool) {
        let mut links = Vec::new();

        for me in self.active() {
            let Some(sector) = me.sector else {
                continue;
            };

            for id in self.adjacent_sectors(sector) {
                for &other in &self.sector(id).agents {
                    if other == me.uid {
                        continue;
                    }

                    let them = &self.agents[other as usize];
                    let distance = me.distance_to(them);
                    if symmetric {
                        if distance < me.range && distance < them.range {
                            links.push((me.uid, other));
                        }
                    } else if distance < me.range {
                        links.push((me.uid, other));
                    }
                }
            }
        }

        for (from, to) in links {
            self.link(from, to);
        }
    }

    /// Neighbours are pairs with a recorded prediction close to `time`.
    pub fn find_neighbors_by_dataset(&mut self, distances: &PrecompiledDistances, time: u64, symmetric: bool) {
        let mut links = Vec::new();

        for me in self.active() {
            for them in self.active() {
                if me.uid != them.uid
                    && distances.are_neighbors(time, me.scene_id, them.scene_id, symmetric)
                {
                    links.push((me.uid, them.uid));
                }
            }
        }

        for (from, to) in links {
            self.link(from, to);
            if symmetric {
                self.link(to, from);
            }
        }
    }

    /// Lose each link with probability `rate`.
    pub fn drop_neighbors<R: Rng + ?Sized>(&mut self, rng: &mut R, rate: f64, symmetric: bool) {
        if rate <= 0.0 {
            return;
        }

        for i in 0..self.agents.len() {
            let me = self.agents[i].uid;
            let dropped: Vec<Uid> = self.agents[i]
                .neighbors
                .iter()
                .copied()
                .filter(|_| rng.gen::<f64>() < rate)
                .collect();

            for other in dropped {
                self.agents[i].remove_neighbor(other);
                if symmetric {
                    self.agents[other as usize].remove_neighbor(me);
                }
            }
        }
    }

    fn record(&self, metrics: &mut Metrics, me: &Agent, guesses: &Guesses, part: Part, stress: f64) {
        for &neighbor in &me.neighbors {
            if let Some(&guess) = guesses.get(&neighbor) {
                metrics.push(Record::new(
                    me,
                    &self.agents[neighbor as usize],
                    guess,
                    metrics.round(),
                    part,
                    stress,
                ));
            }
        }
    }

    fn initial_guesses<R: Rng + ?Sized>(&mut self, context: &RoundContext<'_>, rng: &mut R, malicious: bool) {
        let indices: Vec<usize> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, agent)| agent.is_active() && agent.is_malicious() == malicious)
            .map(|(i, _)| i)
            .collect();

        for i in indices {
            let me = &self.agents[i];
            let guesses: Guesses = me
                .neighbors
                .iter()
                .map(|&uid| {
                    let neighbor = &self.agents[uid as usize];
                    let mut honest =
                        || context.source.guess(&mut *rng, me, neighbor, context.time, context.symmetric);

                    let guess = match me.role {
                        Role::Benign => honest(),
                        Role::Malicious(strategy) => malicious_guess(strategy, me, neighbor, honest),
                    };
                    (uid, guess)
                })
                .collect();

            self.agents[i].initial = guesses;
        }
    }

    /// Run `stage` for every active agent and record its guesses. Agents the
    /// stage skips keep their initial guesses, and so do malicious agents in
    /// the weighted layout.
    fn apply_stage<F>(&mut self, metrics: &mut Metrics, part: Part, stage: F)
    where
        F: Fn(&[Agent], &Agent) -> Option<(Guesses, f64)>,
    {
        let outcomes: Vec<(usize, Option<(Guesses, f64)>)> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, agent)| agent.is_active())
            .map(|(i, agent)| {
                if agent.is_malicious() && part == Part::WeightedOrmds {
                    (i, None)
                } else {
                    (i, stage(&self.agents, agent))
                }
            })
            .collect();

        for (i, outcome) in outcomes {
            match outcome {
                Some((guesses, stress)) => {
                    self.record(metrics, &self.agents[i], &guesses, part, stress);
                    self.agents[i].final_guesses = guesses;
                }
                None => {
                    self.agents[i].final_guesses = self.agents[i].initial.clone();
                }
            }
        }

        trace!(%part, records = metrics.len(), "stage finished");
    }

    /// Make initial guesses, record them and run the enabled refinement
    /// stages in order.
    pub fn start_round<R: Rng + ?Sized>(&mut self, context: &RoundContext<'_>, rng: &mut R, metrics: &mut Metrics) {
        self.initial_guesses(context, rng, false);
        self.initial_guesses(context, rng, true);

        for me in self.benign() {
            self.record(metrics, me, &me.initial, Part::InitialGuess, 0.0);
        }

        let stages = context.stages;
        let weights = context.weights;

        if stages.average_out {
            self.apply_stage(metrics, Part::AverageOut, |agents, me| {
                Some((refine::average_out(agents, me), 0.0))
            });
        }

        if stages.stress_majorization {
            self.apply_stage(metrics, Part::OneRoundStressMajorization, |agents, me| {
                Some((refine::one_round_stress_majorization(agents, me), 0.0))
            });
        }

        if stages.clique_mds {
            self.apply_stage(metrics, Part::CliqueMds, |agents, me| {
                Some((refine::clique(agents, me), 0.0))
            });
        }

        if stages.weighted {
            self.apply_stage(metrics, Part::WeightedOrmds, |agents, me| {
                refine::weighted(agents, me, &weights)
            });
        }

        if stages.drop_neighbor {
            self.apply_stage(metrics, Part::WeightedOrmdsDrop, |agents, me| {
                Some((refine::weighted_drop_neighbor(agents, me, &weights), 0.0))
            });
        }

        if stages.drop_link {
            self.apply_stage(metrics, Part::WeightedOrmdsDropLink, |agents, me| {
                Some((refine::weighted_drop_link(agents, me, &weights), 0.0))
            });
        }

        debug!(
            active = self.active().count(),
            records = metrics.len(),
            "round finished"
        );
    }
}
