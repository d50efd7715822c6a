use std::fmt;

use crate::graph::Uid;
use crate::simulation::{Agent, SectorId, CONTACT_CUTOFF};

/// Stage of a round that produced a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Part {
    InitialGuess,
    AverageOut,
    OneRoundStressMajorization,
    CliqueMds,
    WeightedOrmds,
    WeightedOrmdsDrop,
    WeightedOrmdsDropLink,
}

impl Part {
    /// All parts in the order they run within a round.
    pub const ALL: [Part; 7] = [
        Part::InitialGuess,
        Part::AverageOut,
        Part::OneRoundStressMajorization,
        Part::CliqueMds,
        Part::WeightedOrmds,
        Part::WeightedOrmdsDrop,
        Part::WeightedOrmdsDropLink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Part::InitialGuess => "initialGuess",
            Part::AverageOut => "averageOut",
            Part::OneRoundStressMajorization => "OneRoundStressMajorization",
            Part::CliqueMds => "cliqueMDS",
            Part::WeightedOrmds => "weightedORMDS",
            Part::WeightedOrmdsDrop => "weightedORMDS_drop",
            Part::WeightedOrmdsDropLink => "weightedORMDS_dropLink",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One distance guess of an agent together with the truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub true_distance: f64,
    pub guessed_distance: f64,
    pub correct: bool,
    pub recorder: Uid,
    pub neighbor: Uid,
    pub neighbor_count: usize,
    pub x: f64,
    pub y: f64,
    pub sector: Option<SectorId>,
    pub round: u32,
    pub part: Part,
    pub average_stress: f64,
}

impl Record {
    pub fn new(
        recorder: &Agent,
        neighbor: &Agent,
        guessed_distance: f64,
        round: u32,
        part: Part,
        average_stress: f64,
    ) -> Self {
        let true_distance = recorder.distance_to(neighbor);

        Self {
            true_distance,
            guessed_distance,
            correct: (true_distance <= CONTACT_CUTOFF) == (guessed_distance <= CONTACT_CUTOFF),
            recorder: recorder.uid,
            neighbor: neighbor.uid,
            neighbor_count: recorder.neighbors.len(),
            x: recorder.x,
            y: recorder.y,
            sector: recorder.sector,
            round,
            part,
            average_stress,
        }
    }

    /// `true - guess`
    pub fn error(&self) -> f64 {
        self.true_distance - self.guessed_distance
    }

    pub fn abs_error(&self) -> f64 {
        self.error().abs()
    }
}
