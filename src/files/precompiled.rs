use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context as ErrorContext, Result};
use tracing::debug;

/// Largest gap in milliseconds between a requested time and a recorded
/// prediction that still counts as a match.
pub const TIME_TOLERANCE_MS: u64 = 22_500;

/// Distance predictions recorded from real devices.
///
/// The CSV columns are `time,receiver,broadcaster,prediction`, times in
/// milliseconds and receiver / broadcaster as scene ids.
#[derive(Debug, Default)]
pub struct PrecompiledDistances {
    table: HashMap<u32, HashMap<u32, BTreeMap<u64, f64>>>,
}

impl PrecompiledDistances {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| {
            format!("Could not read precompiled distances '{}'", path.display())
        })?;

        Self::parse(&content)
            .with_context(|| format!("Invalid precompiled distances '{}'", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut distances = Self::default();

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.contains("time") {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [time, receiver, broadcaster, prediction] = fields.as_slice() else {
                bail!("line {}: expected 4 columns, got {}", number + 1, fields.len());
            };

            distances.insert(
                time.parse()
                    .with_context(|| format!("line {}: invalid time '{time}'", number + 1))?,
                receiver
                    .parse()
                    .with_context(|| format!("line {}: invalid receiver", number + 1))?,
                broadcaster
                    .parse()
                    .with_context(|| format!("line {}: invalid broadcaster", number + 1))?,
                prediction
                    .parse()
                    .with_context(|| format!("line {}: invalid prediction", number + 1))?,
            );
        }

        debug!(receivers = distances.table.len(), "parsed precompiled distances");
        Ok(distances)
    }

    pub fn insert(&mut self, time: u64, receiver: u32, broadcaster: u32, prediction: f64) {
        self.table
            .entry(receiver)
            .or_default()
            .entry(broadcaster)
            .or_default()
            .insert(time, prediction);
    }

    fn closest(&self, time: u64, receiver: u32, broadcaster: u32) -> Option<f64> {
        let times = self.table.get(&receiver)?.get(&broadcaster)?;

        let before = times.range(..=time).next_back();
        let after = times.range(time..).next();

        let (recorded, prediction) = match (before, after) {
            (Some(b), Some(a)) => {
                if time.abs_diff(*b.0) <= time.abs_diff(*a.0) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        if time.abs_diff(*recorded) > TIME_TOLERANCE_MS {
            None
        } else {
            Some(*prediction)
        }
    }

    /// Prediction of `receiver` for `broadcaster` recorded closest to `time`.
    ///
    /// Falls back to the reverse direction when `symmetric` is set.
    pub fn lookup(&self, time: u64, receiver: u32, broadcaster: u32, symmetric: bool) -> Option<f64> {
        match self.closest(time, receiver, broadcaster) {
            Some(prediction) => Some(prediction),
            None if symmetric => self.closest(time, broadcaster, receiver),
            None => None,
        }
    }

    pub fn are_neighbors(&self, time: u64, receiver: u32, broadcaster: u32, symmetric: bool) -> bool {
        self.lookup(time, receiver, broadcaster, symmetric)
            .map_or(false, |prediction| !prediction.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::PrecompiledDistances;

    const CSV: &str = "time,receiver,broadcaster,prediction
1000,1,2,3.5
30000,1,2,4.5
5000,3,1,7.25
";

    #[test]
    fn closest_time_wins() {
        let distances = PrecompiledDistances::parse(CSV).unwrap();
        assert_eq!(distances.lookup(0, 1, 2, false), Some(3.5));
        assert_eq!(distances.lookup(20000, 1, 2, false), Some(4.5));
        assert_eq!(distances.lookup(60000, 1, 2, false), None);
    }

    #[test]
    fn symmetric_fallback() {
        let distances = PrecompiledDistances::parse(CSV).unwrap();
        assert_eq!(distances.lookup(5000, 1, 3, false), None);
        assert_eq!(distances.lookup(5000, 1, 3, true), Some(7.25));
        assert!(distances.are_neighbors(5000, 1, 3, true));
        assert!(!distances.are_neighbors(5000, 1, 3, false));
    }

    #[test]
    fn reject_malformed_rows() {
        assert!(PrecompiledDistances::parse("1,2,3").is_err());
        assert!(PrecompiledDistances::parse("1,a,3,4.0").is_err());
    }
}
