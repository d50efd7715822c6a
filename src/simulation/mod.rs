//! Agent-based simulation of collaborative distance estimation.
pub mod adversary;
mod agent;
pub mod holder;
pub mod measure;
mod position;
pub mod refine;
mod scene;

use anyhow::Result;
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::Parameters;
use crate::files::SceneFile;
use crate::graph::WeightParams;
use crate::metrics::Metrics;

pub use adversary::{Strategy, CONTACT_CUTOFF};
pub use agent::{Agent, Role};
pub use holder::{AgentHolder, RoundContext, SectorId, Stages};
pub use measure::{DistanceMeasure, DistanceSource};
pub use position::PhonePosition;
pub use scene::SceneBuilder;

impl Stages {
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            average_out: parameters.average_out,
            stress_majorization: parameters.stress_majorization,
            clique_mds: parameters.clique_mds,
            weighted: parameters.weighted_springs,
            drop_neighbor: parameters.stress_maj_drop_neighbor,
            drop_link: parameters.stress_maj_drop_link,
        }
    }
}

/// One complete run: a scene, its distance source and everything recorded.
pub struct Simulation {
    scene: SceneBuilder,
    source: DistanceSource,
    metrics: Metrics,
    rng: StdRng,
    stages: Stages,
    weights: WeightParams,
    symmetric: bool,
    drop_rate: f64,
}

impl Simulation {
    /// Load the distance source and build the scene. All randomness of the
    /// run derives from `rngSeed`.
    pub fn new(parameters: &Parameters) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(parameters.rng_seed);
        let source = DistanceSource::load(parameters, &mut rng)?;

        let scene = match &parameters.setting {
            Some(path) => SceneBuilder::from_file(SceneFile::load(path)?, parameters, &mut rng)?,
            None => SceneBuilder::random(parameters, &mut rng),
        };

        info!(
            agents = scene.holder().agents().len(),
            rounds = scene.total_rounds(),
            measure = %source.measure(),
            "simulation ready"
        );

        Ok(Self {
            metrics: Metrics::new(scene.total_rounds()),
            scene,
            source,
            rng,
            stages: Stages::from_parameters(parameters),
            weights: WeightParams::from_parameters(parameters),
            symmetric: parameters.symmetric,
            drop_rate: parameters.drop_rate,
        })
    }

    pub fn total_rounds(&self) -> u32 {
        self.scene.total_rounds()
    }

    /// Play every remaining round, ticking `bar` once per round.
    pub fn run(&mut self, bar: &ProgressBar) {
        while self.scene.has_next_round() {
            let round = self.scene.round();
            self.metrics.set_round(round);

            let context = RoundContext {
                source: &self.source,
                stages: self.stages,
                weights: self.weights,
                symmetric: self.symmetric,
                drop_rate: self.drop_rate,
                time: self.scene.time(),
            };
            self.scene.run_round(&context, &mut self.rng, &mut self.metrics);

            debug!(round, records = self.metrics.len(), "round done");
            bar.inc(1);
        }

        info!(records = self.metrics.len(), "simulation finished");
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn holder(&self) -> &AgentHolder {
        self.scene.holder()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indicatif::ProgressBar;

    use crate::config::Parameters;
    use crate::metrics::Part;
    use crate::simulation::DistanceMeasure;

    use super::Simulation;

    fn parameters() -> Parameters {
        Parameters {
            population: 40,
            bounds: 40.0,
            number_of_rounds: 2,
            distance_measure: DistanceMeasure::Rand,
            average_out: true,
            ..Parameters::default()
        }
    }

    #[test]
    fn same_seed_same_records() {
        let mut first = Simulation::new(&parameters()).unwrap();
        first.run(&ProgressBar::hidden());

        let mut second = Simulation::new(&parameters()).unwrap();
        second.run(&ProgressBar::hidden());

        assert!(!first.metrics().is_empty());
        assert_eq!(first.metrics().records(), second.metrics().records());
        assert_eq!(
            first.metrics().parts(),
            vec![Part::InitialGuess, Part::AverageOut, Part::WeightedOrmds]
        );
    }

    #[test]
    fn runs_scene_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pair.txt");
        fs::write(
            &path,
            "initialize:\nagent 0:\n16 range\nagent 1:\n16 range\nround 0:\n0 0 0\n1 3 4\n",
        )
        .unwrap();

        let parameters = Parameters {
            setting: Some(path),
            ..parameters()
        };
        let mut simulation = Simulation::new(&parameters).unwrap();
        assert_eq!(simulation.total_rounds(), 1);
        simulation.run(&ProgressBar::hidden());

        let initial = simulation.metrics().select().by_part(Part::InitialGuess);
        assert_eq!(initial.len(), 2);
        assert!(initial.iter().all(|record| record.true_distance == 5.0));
    }

    #[test]
    fn missing_model_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let parameters = Parameters {
            distance_measure: DistanceMeasure::Ml,
            data_location: dir.path().to_path_buf(),
            ..parameters()
        };
        assert!(Simulation::new(&parameters).is_err());
    }
}
