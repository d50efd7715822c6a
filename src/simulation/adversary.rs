use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ParseNameError;
use crate::simulation::Agent;

/// Distance below which two people count as a contact.
pub const CONTACT_CUTOFF: f64 = 6.0;

/// Margin added when mirroring a guess around the cutoff.
pub const FUDGE_FACTOR: f64 = 0.1;

pub const UNDER_GUESS: f64 = 1.0;

pub const OVER_GUESS: f64 = 15.0;

/// How a malicious agent reports its distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Claim to be close to everyone.
    #[serde(rename = "close")]
    UnderGuess,

    /// Claim to be far from everyone.
    #[serde(rename = "far")]
    OverGuess,

    /// Flip every benign decision around the contact cutoff.
    #[serde(rename = "nDCFBreak")]
    NdcfBreak,
}

impl FromStr for Strategy {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "close" | "underGuess" => Ok(Self::UnderGuess),
            "far" | "overGuess" => Ok(Self::OverGuess),
            "nDCFBreak" => Ok(Self::NdcfBreak),
            _ => Err(ParseNameError::new("malicious strategy", s)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnderGuess => write!(f, "close"),
            Self::OverGuess => write!(f, "far"),
            Self::NdcfBreak => write!(f, "nDCFBreak"),
        }
    }
}

/// Reflect a benign guess to the other side of the contact cutoff.
pub fn mirror_guess(guess: f64) -> f64 {
    if guess <= CONTACT_CUTOFF {
        CONTACT_CUTOFF + (CONTACT_CUTOFF - guess) + FUDGE_FACTOR
    } else {
        (CONTACT_CUTOFF - (guess - CONTACT_CUTOFF) - FUDGE_FACTOR).max(0.0)
    }
}

/// Distance a malicious agent reports for `neighbor`.
///
/// `honest` yields the measurement the attacker would make if it played
/// fair and is only evaluated where a strategy needs it.
pub fn malicious_guess<F>(strategy: Strategy, me: &Agent, neighbor: &Agent, honest: F) -> f64
where
    F: FnOnce() -> f64,
{
    match strategy {
        Strategy::UnderGuess => UNDER_GUESS,
        Strategy::OverGuess => OVER_GUESS,
        Strategy::NdcfBreak => {
            if neighbor.scene_id == me.scene_id {
                0.0
            } else if neighbor.is_malicious() {
                honest()
            } else {
                match neighbor.initial.get(&me.uid) {
                    Some(&guess) => mirror_guess(guess),
                    None => honest(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::{Agent, PhonePosition, Role};

    use super::{malicious_guess, mirror_guess, Strategy};

    fn agent(uid: u32, scene_id: u32, role: Role) -> Agent {
        Agent::new(uid, scene_id, 0.0, 0.0, 20.0, PhonePosition::InHand, role)
    }

    #[test]
    fn mirror_around_cutoff() {
        assert!((mirror_guess(2.0) - 10.1).abs() < 1e-9);
        assert!((mirror_guess(6.0) - 6.1).abs() < 1e-9);
        assert!((mirror_guess(9.0) - 2.9).abs() < 1e-9);
        assert_eq!(mirror_guess(30.0), 0.0);
    }

    #[test]
    fn fixed_strategies_ignore_measurement() {
        let me = agent(0, 0, Role::Malicious(Strategy::UnderGuess));
        let other = agent(1, 1, Role::Benign);

        assert_eq!(
            malicious_guess(Strategy::UnderGuess, &me, &other, || 4.0),
            1.0
        );
        assert_eq!(
            malicious_guess(Strategy::OverGuess, &me, &other, || 4.0),
            15.0
        );
    }

    #[test]
    fn ndcf_break_cases() {
        let strategy = Strategy::NdcfBreak;
        let me = agent(0, 0, Role::Malicious(strategy));
        let sybil = agent(1, 0, Role::Malicious(strategy));
        let accomplice = agent(2, 1, Role::Malicious(strategy));
        let mut victim = agent(3, 2, Role::Benign);
        let stranger = agent(4, 3, Role::Benign);

        assert_eq!(malicious_guess(strategy, &me, &sybil, || 4.0), 0.0);
        assert_eq!(malicious_guess(strategy, &me, &accomplice, || 4.0), 4.0);
        assert_eq!(malicious_guess(strategy, &me, &stranger, || 4.0), 4.0);

        victim.initial.insert(0, 3.0);
        let guess = malicious_guess(strategy, &me, &victim, || 4.0);
        assert!((guess - 9.1).abs() < 1e-9);
    }
}
