use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ParseNameError, Parameters};
use crate::files::{InverseCdf, PrecompiledDistances, RssiPool};
use crate::simulation::Agent;

/// Distances (ft) at which RSSI and model data was recorded.
pub const RANGES: [u32; 8] = [3, 4, 5, 6, 8, 10, 12, 15];

/// Samples averaged into one ping.
pub const PING_SAMPLES: i64 = 600;

/// Largest relative error of the random measure.
pub const RAND_ERROR_BOUND: f64 = 0.5;

/// Index of the recorded range closest to `distance`.
pub fn nearest_range_index(distance: f64) -> usize {
    RANGES
        .windows(2)
        .position(|pair| distance <= f64::from(pair[0] + pair[1]) / 2.0)
        .unwrap_or(RANGES.len() - 1)
}

pub fn nearest_range(distance: f64) -> u32 {
    RANGES[nearest_range_index(distance)]
}

/// Linear fit from RSSI to distance in feet.
pub fn rssi_to_distance(rssi: i32) -> f64 {
    -0.14 * f64::from(rssi) - 1.8722
}

/// Which model produces an agent's initial guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMeasure {
    #[serde(rename = "RSSI")]
    Rssi,

    #[serde(rename = "Rand")]
    Rand,

    #[serde(rename = "ML")]
    Ml,

    #[serde(rename = "MLRSSIHybrid")]
    MlRssiHybrid,

    #[serde(rename = "DATASET")]
    Dataset,
}

impl FromStr for DistanceMeasure {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSSI" => Ok(Self::Rssi),
            "Rand" => Ok(Self::Rand),
            "ML" => Ok(Self::Ml),
            "MLRSSIHybrid" => Ok(Self::MlRssiHybrid),
            "DATASET" => Ok(Self::Dataset),
            _ => Err(ParseNameError::new("distance measure", s)),
        }
    }
}

impl fmt::Display for DistanceMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rssi => "RSSI",
            Self::Rand => "Rand",
            Self::Ml => "ML",
            Self::MlRssiHybrid => "MLRSSIHybrid",
            Self::Dataset => "DATASET",
        };
        write!(f, "{name}")
    }
}

/// A distance measure together with the data it draws from.
#[derive(Debug)]
pub enum DistanceSource {
    Rssi(RssiPool),
    Rand,
    Ml(InverseCdf),
    Hybrid(RssiPool, InverseCdf),
    Dataset(PrecompiledDistances),
}

impl DistanceSource {
    /// Load only the data files the configured measure needs.
    pub fn load<R: Rng + ?Sized>(parameters: &Parameters, rng: &mut R) -> Result<Self> {
        let rssi_pool = |rng: &mut R| match &parameters.rssi_samples {
            Some(dir) => RssiPool::load(dir, rng),
            None => bail!("No 'rssiSamples' folder configured"),
        };

        let source = match parameters.distance_measure {
            DistanceMeasure::Rssi => Self::Rssi(rssi_pool(rng)?),
            DistanceMeasure::Rand => Self::Rand,
            DistanceMeasure::Ml => Self::Ml(InverseCdf::load(&parameters.data_location)?),
            DistanceMeasure::MlRssiHybrid => Self::Hybrid(
                rssi_pool(rng)?,
                InverseCdf::load(&parameters.data_location)?,
            ),
            DistanceMeasure::Dataset => match &parameters.precompiled_distances {
                Some(path) => Self::Dataset(PrecompiledDistances::load(path)?),
                None => bail!("No 'PrecompiledDistances' file configured"),
            },
        };

        info!(measure = %source.measure(), "loaded distance source");
        Ok(source)
    }

    pub fn measure(&self) -> DistanceMeasure {
        match self {
            Self::Rssi(_) => DistanceMeasure::Rssi,
            Self::Rand => DistanceMeasure::Rand,
            Self::Ml(_) => DistanceMeasure::Ml,
            Self::Hybrid(_, _) => DistanceMeasure::MlRssiHybrid,
            Self::Dataset(_) => DistanceMeasure::Dataset,
        }
    }

    pub fn precompiled(&self) -> Option<&PrecompiledDistances> {
        match self {
            Self::Dataset(distances) => Some(distances),
            _ => None,
        }
    }

    /// Averaged RSSI of `neighbor` as heard by `me`.
    fn ping<R: Rng + ?Sized>(
        pool: &RssiPool,
        rng: &mut R,
        me: &Agent,
        neighbor: &Agent,
        distance: f64,
    ) -> Option<i32> {
        let mut total: i64 = 0;
        for _ in 0..PING_SAMPLES {
            total += i64::from(pool.sample(rng, me.position, neighbor.position, distance)?);
        }

        i32::try_from(total / PING_SAMPLES).ok()
    }

    /// Initial distance guess of `me` for `neighbor`, clamped at zero.
    pub fn guess<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        me: &Agent,
        neighbor: &Agent,
        time: u64,
        symmetric: bool,
    ) -> f64 {
        let distance = me.distance_to(neighbor);

        let guess = match self {
            Self::Rssi(pool) => Self::ping(pool, rng, me, neighbor, distance)
                .map_or(f64::NAN, rssi_to_distance),
            Self::Rand => distance * (1.0 + rng.gen_range(-RAND_ERROR_BOUND..=RAND_ERROR_BOUND)),
            Self::Ml(cdf) => cdf.sample(rng, distance).unwrap_or(f64::NAN),
            Self::Hybrid(pool, cdf) => {
                let rssi = Self::ping(pool, rng, me, neighbor, distance)
                    .map_or(f64::NAN, rssi_to_distance);
                let model = cdf.sample(rng, distance).unwrap_or(f64::NAN);
                (rssi + model) / 2.0
            }
            Self::Dataset(distances) => distances
                .lookup(time, me.scene_id, neighbor.scene_id, symmetric)
                .unwrap_or(f64::NAN),
        };

        if !guess.is_finite() {
            warn!(
                recorder = me.uid,
                neighbor = neighbor.uid,
                distance,
                measure = %self.measure(),
                "non-finite distance guess"
            );
        }

        // NaN survives the clamp and marks the guess as unusable
        if guess < 0.0 {
            0.0
        } else {
            guess
        }
    }
}
