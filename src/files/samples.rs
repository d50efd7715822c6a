use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context as ErrorContext, Result};
use rand::Rng;
use tracing::debug;

use crate::simulation::measure::{nearest_range, nearest_range_index, RANGES};
use crate::simulation::PhonePosition;

/// Number of RSSI values kept per file.
pub const RESERVOIR_SIZE: usize = 1000;

/// File holding the RSSI recordings of one position pair at one range.
pub fn rssi_file_name(range: u32, a: PhonePosition, b: PhonePosition) -> String {
    let (lo, hi) = a.ordered(b);
    format!("{range}-{lo}-{hi}.txt")
}

/// File holding the inverse CDF of the distance model for one range.
pub fn inverse_cdf_file_name(range: u32) -> String {
    format!("{range}inverseCDF.csv")
}

fn parse_rssi(line: &str) -> Option<i32> {
    let digits: String = line
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().ok()
}

/// Reservoir samples of recorded RSSI values, keyed by position pair and
/// range bucket.
#[derive(Debug, Default)]
pub struct RssiPool {
    samples: HashMap<(usize, usize), Vec<i32>>,
}

impl RssiPool {
    pub fn load<R: Rng + ?Sized>(dir: &Path, rng: &mut R) -> Result<Self> {
        let mut pool = Self::default();

        for a in PhonePosition::ALL {
            for b in PhonePosition::ALL.into_iter().filter(|b| a.id() <= b.id()) {
                for (range_index, range) in RANGES.into_iter().enumerate() {
                    let path = dir.join(rssi_file_name(range, a, b));
                    let file = File::open(&path).with_context(|| {
                        format!("Could not open RSSI samples '{}'", path.display())
                    })?;

                    let mut reservoir = Vec::with_capacity(RESERVOIR_SIZE);
                    let mut count = 0;
                    for line in BufReader::new(file).lines() {
                        let line = line.with_context(|| {
                            format!("Could not read RSSI samples '{}'", path.display())
                        })?;
                        let Some(rssi) = parse_rssi(&line) else {
                            continue;
                        };

                        if count < RESERVOIR_SIZE {
                            reservoir.push(rssi);
                        } else {
                            let slot = rng.gen_range(0..=count);
                            if slot < RESERVOIR_SIZE {
                                reservoir[slot] = rssi;
                            }
                        }
                        count += 1;
                    }

                    debug!(path = %path.display(), count, "loaded RSSI samples");
                    pool.insert(a, b, range_index, reservoir);
                }
            }
        }

        Ok(pool)
    }

    pub fn insert(
        &mut self,
        a: PhonePosition,
        b: PhonePosition,
        range_index: usize,
        samples: Vec<i32>,
    ) {
        self.samples
            .insert((a.combination(b), range_index), samples);
    }

    /// Draw one recorded RSSI value for two phones `distance` feet apart.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        a: PhonePosition,
        b: PhonePosition,
        distance: f64,
    ) -> Option<i32> {
        let samples = self
            .samples
            .get(&(a.combination(b), nearest_range_index(distance)))?;

        if samples.is_empty() {
            None
        } else {
            Some(samples[rng.gen_range(0..samples.len())])
        }
    }
}

/// Inverse cumulative distribution of guessed distances per range bucket.
#[derive(Debug, Default)]
pub struct InverseCdf {
    tables: BTreeMap<u32, Vec<f64>>,
}

impl InverseCdf {
    pub fn load(dir: &Path) -> Result<Self> {
        let mut cdf = Self::default();

        for range in RANGES {
            let path = dir.join(inverse_cdf_file_name(range));
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read inverse CDF '{}'", path.display()))?;

            let row = content
                .lines()
                .next()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| {
                    value.parse::<f64>().with_context(|| {
                        format!("Invalid value '{value}' in '{}'", path.display())
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            cdf.insert(range, row);
        }

        Ok(cdf)
    }

    pub fn insert(&mut self, range: u32, table: Vec<f64>) {
        self.tables.insert(range, table);
    }

    /// Draw a guessed distance for a true distance.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, distance: f64) -> Option<f64> {
        let table = self.tables.get(&nearest_range(distance))?;

        if table.is_empty() {
            None
        } else {
            Some(table[rng.gen_range(0..table.len())])
        }
    }
}
