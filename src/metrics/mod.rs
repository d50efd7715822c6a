mod record;
mod stats;

use crate::graph::Uid;
use crate::simulation::SectorId;

pub use record::{Part, Record};

/// Every record produced during a simulation.
#[derive(Debug, Default)]
pub struct Metrics {
    records: Vec<Record>,
    round: u32,
    total_rounds: u32,
}

impl Metrics {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            records: Vec::new(),
            round: 0,
            total_rounds,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn set_round(&mut self, round: u32) {
        self.round = round;
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Store a record and report whether its guess was on the right side of
    /// the contact cutoff.
    pub fn push(&mut self, record: Record) -> bool {
        let correct = record.correct;
        self.records.push(record);
        correct
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn select(&self) -> Selection<'_> {
        self.records.iter().collect()
    }

    /// Parts that produced at least one record, in round order.
    pub fn parts(&self) -> Vec<Part> {
        Part::ALL
            .into_iter()
            .filter(|part| self.records.iter().any(|record| record.part == *part))
            .collect()
    }
}

/// A filtered view on records.
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    records: Vec<&'a Record>,
}

impl<'a> FromIterator<&'a Record> for Selection<'a> {
    fn from_iter<I: IntoIterator<Item = &'a Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> Selection<'a> {
    fn retain<F>(mut self, keep: F) -> Self
    where
        F: Fn(&Record) -> bool,
    {
        self.records.retain(|record| keep(record));
        self
    }

    pub fn by_recorder(self, uid: Uid) -> Self {
        self.retain(|record| record.recorder == uid)
    }

    pub fn by_neighbor(self, uid: Uid) -> Self {
        self.retain(|record| record.neighbor == uid)
    }

    pub fn by_sector(self, sector: SectorId) -> Self {
        self.retain(|record| record.sector == Some(sector))
    }

    pub fn by_round(self, round: u32) -> Self {
        self.retain(|record| record.round == round)
    }

    pub fn by_part(self, part: Part) -> Self {
        self.retain(|record| record.part == part)
    }

    /// Records with `min < true distance < max`.
    pub fn by_true_distance(self, min: f64, max: f64) -> Self {
        self.retain(|record| record.true_distance > min && record.true_distance < max)
    }

    /// Records with `min < guessed distance < max`.
    pub fn by_guessed_distance(self, min: f64, max: f64) -> Self {
        self.retain(|record| record.guessed_distance > min && record.guessed_distance < max)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + '_ {
        self.records.iter().copied()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::simulation::{Agent, PhonePosition, Role};

    use super::{Metrics, Part, Record};

    pub fn record(true_distance: f64, guess: f64, part: Part) -> Record {
        let me = Agent::new(0, 0, 0.0, 0.0, 30.0, PhonePosition::InHand, Role::Benign);
        let other = Agent::new(
            1,
            1,
            true_distance,
            0.0,
            30.0,
            PhonePosition::InHand,
            Role::Benign,
        );
        Record::new(&me, &other, guess, 0, part, 0.0)
    }

    #[test]
    fn filters_compose() {
        let mut metrics = Metrics::new(2);
        assert!(metrics.push(record(2.0, 3.0, Part::InitialGuess)));
        assert!(!metrics.push(record(8.0, 3.0, Part::InitialGuess)));
        metrics.set_round(1);
        let mut late = record(5.0, 5.0, Part::WeightedOrmds);
        late.round = metrics.round();
        metrics.push(late);

        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics.select().by_part(Part::InitialGuess).len(), 2);
        assert_eq!(metrics.select().by_round(1).len(), 1);
        assert_eq!(
            metrics
                .select()
                .by_part(Part::InitialGuess)
                .by_true_distance(1.0, 8.0)
                .len(),
            1
        );
        assert_eq!(metrics.select().by_guessed_distance(3.0, 6.0).len(), 1);
        assert_eq!(metrics.select().by_recorder(0).by_neighbor(1).len(), 3);
        assert!(metrics.select().by_sector((0, 0)).is_empty());
        assert_eq!(
            metrics.parts(),
            vec![Part::InitialGuess, Part::WeightedOrmds]
        );
    }
}
