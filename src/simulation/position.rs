use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::config::ParseNameError;

/// Where a person carries their phone. Affects the recorded RSSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhonePosition {
    FrontPantsPocket,
    InHand,
    ShirtPocket,
}

impl PhonePosition {
    pub const ALL: [PhonePosition; 3] = [
        PhonePosition::FrontPantsPocket,
        PhonePosition::InHand,
        PhonePosition::ShirtPocket,
    ];

    pub fn id(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PhonePosition::FrontPantsPocket => "FRONTPANTSPOCKET",
            PhonePosition::InHand => "INHAND",
            PhonePosition::ShirtPocket => "SHIRTPOCKET",
        }
    }

    /// Index of the unordered pair `{self, other}` among all position pairs.
    pub fn combination(self, other: PhonePosition) -> usize {
        let (lo, hi) = if self.id() <= other.id() {
            (self.id(), other.id())
        } else {
            (other.id(), self.id())
        };

        Self::ALL.len() * lo + hi - (lo * lo + lo) / 2
    }

    /// Both positions of a pair ordered by id.
    pub fn ordered(self, other: PhonePosition) -> (PhonePosition, PhonePosition) {
        if self.id() <= other.id() {
            (self, other)
        } else {
            (other, self)
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl FromStr for PhonePosition {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|position| position.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseNameError::new("phone position", s))
    }
}

impl fmt::Display for PhonePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
