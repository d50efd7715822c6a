use crate::graph::{Guesses, Uid};
use crate::simulation::{PhonePosition, SectorId, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Benign,
    Malicious(Strategy),
}

/// A simulated person carrying a phone.
///
/// Sybil identities of one malicious person share a `scene_id` and a
/// location but each has its own `uid`.
#[derive(Debug, Clone)]
pub struct Agent {
    pub uid: Uid,
    pub scene_id: u32,
    pub x: f64,
    pub y: f64,
    pub range: f64,
    pub position: PhonePosition,
    pub role: Role,
    pub sector: Option<SectorId>,
    pub neighbors: Vec<Uid>,
    pub initial: Guesses,
    pub final_guesses: Guesses,
    active: bool,
}

impl Agent {
    pub fn new(
        uid: Uid,
        scene_id: u32,
        x: f64,
        y: f64,
        range: f64,
        position: PhonePosition,
        role: Role,
    ) -> Self {
        let mut agent = Self {
            uid,
            scene_id,
            x: f64::NAN,
            y: f64::NAN,
            range,
            position,
            role,
            sector: None,
            neighbors: Vec::new(),
            initial: Guesses::new(),
            final_guesses: Guesses::new(),
            active: false,
        };
        agent.set_coordinates(x, y);
        agent
    }

    /// Move the agent. Non-finite coordinates take it out of the round.
    pub fn set_coordinates(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.active = x.is_finite() && y.is_finite();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_malicious(&self) -> bool {
        matches!(self.role, Role::Malicious(_))
    }

    pub fn distance_to(&self, other: &Agent) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn add_neighbor(&mut self, uid: Uid) {
        if uid != self.uid && !self.neighbors.contains(&uid) {
            self.neighbors.push(uid);
        }
    }

    pub fn remove_neighbor(&mut self, uid: Uid) {
        self.neighbors.retain(|neighbor| *neighbor != uid);
    }

    pub fn reset_for_round(&mut self) {
        self.sector = None;
        self.neighbors.clear();
        self.initial.clear();
        self.final_guesses.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::PhonePosition;

    use super::{Agent, Role};

    #[test]
    fn inactive_without_coordinates() {
        let mut agent = Agent::new(0, 0, 1.0, f64::NAN, 10.0, PhonePosition::InHand, Role::Benign);
        assert!(!agent.is_active());

        agent.set_coordinates(3.0, 4.0);
        assert!(agent.is_active());

        let other = Agent::new(1, 1, 0.0, 0.0, 10.0, PhonePosition::InHand, Role::Benign);
        assert_eq!(agent.distance_to(&other), 5.0);
    }

    #[test]
    fn neighbors_are_unique() {
        let mut agent = Agent::new(0, 0, 0.0, 0.0, 10.0, PhonePosition::InHand, Role::Benign);
        agent.add_neighbor(1);
        agent.add_neighbor(1);
        agent.add_neighbor(0);
        agent.add_neighbor(2);
        assert_eq!(agent.neighbors, vec![1, 2]);

        agent.remove_neighbor(1);
        assert_eq!(agent.neighbors, vec![2]);

        agent.initial.insert(2, 4.0);
        agent.reset_for_round();
        assert!(agent.neighbors.is_empty());
        assert!(agent.initial.is_empty());
    }
}
