use anyhow::{bail, Result};
use rand::Rng;
use tracing::{debug, warn};

use crate::config::Parameters;
use crate::files::SceneFile;
use crate::metrics::Metrics;
use crate::simulation::holder::{Adversaries, AgentHolder, RoundContext, AGENT_MAX_RANGE};
use crate::simulation::PhonePosition;

/// Largest step per axis and round of the random walk.
pub const WALK_STEP: f64 = 3.0;

/// Random ranges are drawn from `[MIN_RANGE_SHARE, 1) * AGENT_MAX_RANGE`.
pub const MIN_RANGE_SHARE: f64 = 0.7;

enum Script {
    Random { bounds: f64 },
    File(SceneFile),
}

/// Places the population and moves it from round to round, either by a
/// random walk or as scripted by a scene file.
pub struct SceneBuilder {
    script: Script,
    holder: AgentHolder,
    round: u32,
    total_rounds: u32,
    time: u64,
}

impl SceneBuilder {
    /// Random population spread uniformly over the field.
    pub fn random<R: Rng + ?Sized>(parameters: &Parameters, rng: &mut R) -> Self {
        let bounds = parameters.bounds;
        let mut holder = AgentHolder::new(
            bounds,
            bounds,
            Adversaries {
                identities: parameters.population,
                malicious: parameters.num_malicious,
                sybil_multiplier: parameters.sybil_multiplier,
                strategy: parameters.malicious_strategy,
            },
        );

        for _ in 0..parameters.population {
            let x = rng.gen::<f64>() * bounds;
            let y = rng.gen::<f64>() * bounds;
            let range = (rng.gen::<f64>() * (1.0 - MIN_RANGE_SHARE) + MIN_RANGE_SHARE) * AGENT_MAX_RANGE;
            let position = PhonePosition::random(rng);
            holder.add_identity(rng, x, y, range, position);
        }

        debug!(agents = holder.agents().len(), "built random scene");

        Self {
            script: Script::Random { bounds },
            holder,
            round: 0,
            total_rounds: parameters.number_of_rounds,
            time: 0,
        }
    }

    /// Population as declared by a scene file, placed at round 0.
    pub fn from_file<R: Rng + ?Sized>(scene: SceneFile, parameters: &Parameters, rng: &mut R) -> Result<Self> {
        let identities = scene.agent_count();
        if parameters.num_malicious > identities {
            bail!(
                "'numMalicious' ({}) exceeds the {identities} people of the scene",
                parameters.num_malicious
            );
        }

        let (x_bound, y_bound) = scene.area.unwrap_or((parameters.bounds, parameters.bounds));
        let mut holder = AgentHolder::new(
            x_bound,
            y_bound,
            Adversaries {
                identities,
                malicious: parameters.num_malicious,
                sybil_multiplier: parameters.sybil_multiplier,
                strategy: parameters.malicious_strategy,
            },
        );

        for id in 0..identities {
            let template = scene.agents.get(&id);
            let range = template.map_or(0.0, |template| template.range);
            let position = match template.and_then(|template| template.position) {
                Some(position) => position,
                None => PhonePosition::random(rng),
            };
            let (x, y) = scene.location(0, id).unwrap_or((f64::NAN, f64::NAN));
            holder.add_identity(rng, x, y, range, position);
        }

        let total_rounds = scene.round_count();
        debug!(
            agents = holder.agents().len(),
            rounds = total_rounds,
            "built scene from file"
        );

        Ok(Self {
            script: Script::File(scene),
            holder,
            round: 0,
            total_rounds,
            time: 0,
        })
    }

    pub fn holder(&self) -> &AgentHolder {
        &self.holder
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn has_next_round(&self) -> bool {
        self.round < self.total_rounds
    }

    fn update_locations<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        match &self.script {
            Script::Random { bounds } => {
                if self.round == 0 {
                    return;
                }

                for agent in self.holder.agents_mut() {
                    let x = (agent.x + WALK_STEP * 2.0 * (rng.gen::<f64>() - 0.5)).rem_euclid(*bounds);
                    let y = (agent.y + WALK_STEP * 2.0 * (rng.gen::<f64>() - 0.5)).rem_euclid(*bounds);
                    agent.set_coordinates(x, y);
                }
            }
            Script::File(scene) => {
                let Some(frame) = scene.rounds.get(&self.round) else {
                    warn!(round = self.round, "scene has no frame for round, everyone is absent");
                    for agent in self.holder.agents_mut() {
                        agent.set_coordinates(f64::NAN, f64::NAN);
                    }
                    return;
                };

                if let Some(time) = frame.time {
                    self.time = time;
                }

                for agent in self.holder.agents_mut() {
                    let (x, y) = frame
                        .locations
                        .get(&agent.scene_id)
                        .copied()
                        .flatten()
                        .unwrap_or((f64::NAN, f64::NAN));
                    agent.set_coordinates(x, y);
                }
            }
        }
    }

    /// Move everyone, discover neighbours and play one round.
    pub fn run_round<R: Rng + ?Sized>(&mut self, context: &RoundContext<'_>, rng: &mut R, metrics: &mut Metrics) {
        self.update_locations(rng);

        self.holder.reset_for_round();
        self.holder.fit_into_sectors();
        match context.source.precompiled() {
            Some(distances) => {
                self.holder
                    .find_neighbors_by_dataset(distances, self.time, context.symmetric)
            }
            None => self.holder.find_neighbors_by_locality(context.symmetric),
        }
        self.holder
            .drop_neighbors(rng, context.drop_rate, context.symmetric);

        let context = RoundContext {
            time: self.time,
            ..*context
        };
        self.holder.start_round(&context, rng, metrics);

        self.round += 1;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::Parameters;
    use crate::files::SceneFile;
    use crate::graph::WeightParams;
    use crate::metrics::{Metrics, Part};
    use crate::simulation::holder::{RoundContext, Stages};
    use crate::simulation::DistanceSource;

    use super::SceneBuilder;

    fn context(source: &DistanceSource) -> RoundContext<'_> {
        RoundContext {
            source,
            stages: Stages::default(),
            weights: WeightParams::default(),
            symmetric: true,
            drop_rate: 0.0,
            time: 0,
        }
    }

    #[test]
    fn random_scene_walks_within_bounds() {
        let parameters = Parameters {
            population: 50,
            num_malicious: 5,
            number_of_rounds: 3,
            bounds: 60.0,
            ..Parameters::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut scene = SceneBuilder::random(&parameters, &mut rng);
        assert_eq!(scene.holder().agents().len(), 50);
        assert_eq!(scene.holder().malicious().count(), 5);
        assert!(scene
            .holder()
            .agents()
            .iter()
            .all(|agent| (21.0..30.0).contains(&agent.range)));

        let source = DistanceSource::Rand;
        let mut metrics = Metrics::new(scene.total_rounds());
        while scene.has_next_round() {
            metrics.set_round(scene.round());
            scene.run_round(&context(&source), &mut rng, &mut metrics);
        }

        assert_eq!(scene.round(), 3);
        assert!(!metrics.is_empty());
        assert!(scene.holder().agents().iter().all(|agent| {
            agent.is_active() && (0.0..60.0).contains(&agent.x) && (0.0..60.0).contains(&agent.y)
        }));
    }

    #[test]
    fn file_scene_follows_frames() {
        let scene = SceneFile::parse(
            "30 30 area
initialize:
agent 0:
16 range
INHAND phone
agent 1:
16 range
SHIRTPOCKET phone

round 0: time 500
0 1 1
1 4 5
round 1: time 900
0 1 1
1 nan nan
",
        )
        .unwrap();

        let parameters = Parameters::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut builder = SceneBuilder::from_file(scene, &parameters, &mut rng).unwrap();
        assert_eq!(builder.total_rounds(), 2);

        let source = DistanceSource::Rand;
        let mut metrics = Metrics::new(2);
        builder.run_round(&context(&source), &mut rng, &mut metrics);
        assert_eq!(builder.time(), 500);
        assert_eq!(metrics.select().by_part(Part::InitialGuess).len(), 2);
        assert!(metrics
            .records()
            .iter()
            .all(|record| record.true_distance == 5.0));

        metrics.set_round(1);
        builder.run_round(&context(&source), &mut rng, &mut metrics);
        assert_eq!(builder.time(), 900);
        assert!(!builder.holder().agents()[1].is_active());
        assert!(metrics.select().by_round(1).is_empty());
        assert!(!builder.has_next_round());
    }

    #[test]
    fn too_many_malicious_for_scene() {
        let scene = SceneFile::parse("round 0:\n0 1 1\n").unwrap();
        let parameters = Parameters {
            num_malicious: 3,
            ..Parameters::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        assert!(SceneBuilder::from_file(scene, &parameters, &mut rng).is_err());
    }
}
