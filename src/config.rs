use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context as ErrorContext, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::simulation::{DistanceMeasure, Strategy};

/// Unrecognised textual name for one of the enumerated parameter values.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
}

impl ParseNameError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// How the pre-weight of a link is turned into a spring weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// `exp(-pre)`
    Absolute,

    /// `pre^-alpha`
    Fractional,
}

impl FromStr for WeightScheme {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute" => Ok(Self::Absolute),
            "fractional" => Ok(Self::Fractional),
            _ => Err(ParseNameError::new("weight scheme", s)),
        }
    }
}

impl fmt::Display for WeightScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Fractional => write!(f, "fractional"),
        }
    }
}

/// How the disagreement between `d_ij` and `d_ji` is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disagreement {
    Absolute,
    Relative,
}

impl FromStr for Disagreement {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute" => Ok(Self::Absolute),
            "relative" => Ok(Self::Relative),
            _ => Err(ParseNameError::new("disagreement measure", s)),
        }
    }
}

impl fmt::Display for Disagreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Relative => write!(f, "relative"),
        }
    }
}

/// Parameter keys in the order they appear in the summary CSV.
pub const KEYS: [&str; 31] = [
    "setting",
    "bounds",
    "numberOfRounds",
    "population",
    "alpha",
    "weightBias",
    "weightDiscrepancy",
    "weightSeparation",
    "weights",
    "threshStressMin",
    "threshStressMax",
    "delta",
    "numMalicious",
    "maliciousStrategy",
    "sybilMultiplier",
    "averageOut",
    "stressMajorization",
    "cliqueMDS",
    "weightedSprings",
    "stressMajDropNeighbor",
    "stressMajDropLink",
    "writeOutputHeader",
    "output",
    "fullOutput",
    "dataLocation",
    "rssiSamples",
    "rngSeed",
    "distanceMeasure",
    "PrecompiledDistances",
    "symmetric",
    "dropRate",
];

/// Keys of older parameter files that configure the graphical interface.
/// They are accepted and have no effect.
pub const IGNORED_KEYS: [&str; 1] = ["visualsON"];

/// Everything a simulation run can be configured with.
///
/// Parameters are read from an optional TOML file and then overridden with
/// `key=value` pairs from the command line. Empty strings for the optional
/// paths mean "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Parameters {
    pub setting: Option<PathBuf>,
    pub bounds: f64,
    pub number_of_rounds: u32,
    pub population: u32,
    pub alpha: f64,
    pub weight_bias: f64,
    pub weight_discrepancy: f64,
    pub weight_separation: f64,
    pub weights: WeightScheme,
    pub thresh_stress_min: f64,
    pub thresh_stress_max: f64,
    pub delta: Disagreement,
    pub num_malicious: u32,
    pub malicious_strategy: Strategy,
    pub sybil_multiplier: u32,
    pub average_out: bool,
    pub stress_majorization: bool,
    #[serde(rename = "cliqueMDS")]
    pub clique_mds: bool,
    pub weighted_springs: bool,
    pub stress_maj_drop_neighbor: bool,
    pub stress_maj_drop_link: bool,
    pub write_output_header: bool,
    pub output: PathBuf,
    pub full_output: Option<PathBuf>,
    pub data_location: PathBuf,
    pub rssi_samples: Option<PathBuf>,
    pub rng_seed: u64,
    pub distance_measure: DistanceMeasure,
    #[serde(rename = "PrecompiledDistances")]
    pub precompiled_distances: Option<PathBuf>,
    pub symmetric: bool,
    pub drop_rate: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            setting: None,
            bounds: 500.0,
            number_of_rounds: 20,
            population: 1000,
            alpha: 2.66,
            weight_bias: 8.95,
            weight_discrepancy: 0.32,
            weight_separation: 0.26,
            weights: WeightScheme::Absolute,
            thresh_stress_min: -1.0,
            thresh_stress_max: -1.0,
            delta: Disagreement::Absolute,
            num_malicious: 0,
            malicious_strategy: Strategy::UnderGuess,
            sybil_multiplier: 1,
            average_out: false,
            stress_majorization: false,
            clique_mds: false,
            weighted_springs: true,
            stress_maj_drop_neighbor: false,
            stress_maj_drop_link: false,
            write_output_header: false,
            output: PathBuf::from("outputResults.csv"),
            full_output: None,
            data_location: PathBuf::from("CDFs/"),
            rssi_samples: None,
            rng_seed: 1337,
            distance_measure: DistanceMeasure::Ml,
            precompiled_distances: None,
            symmetric: true,
            drop_rate: 0.0,
        }
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| anyhow!("Invalid value '{value}' for parameter '{key}': {err}"))
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_default()
}

impl Parameters {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let parameters_str = fs::read_to_string(path)
            .with_context(|| format!("Could not read parameter file '{}'", path.display()))?;

        let mut table: toml::Table = toml::from_str(&parameters_str)
            .with_context(|| format!("Invalid parameter file '{}'", path.display()))?;
        for key in IGNORED_KEYS {
            table.remove(key);
        }

        let mut parameters: Parameters = toml::Value::Table(table)
            .try_into()
            .with_context(|| format!("Invalid parameter file '{}'", path.display()))?;

        parameters.normalize_paths();
        Ok(parameters)
    }

    // TOML has no null, so optional paths may arrive as empty strings
    fn normalize_paths(&mut self) {
        for path in [
            &mut self.setting,
            &mut self.full_output,
            &mut self.rssi_samples,
            &mut self.precompiled_distances,
        ] {
            if path.as_ref().map_or(false, |p| p.as_os_str().is_empty()) {
                *path = None;
            }
        }
    }

    /// Set a single parameter from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "setting" => self.setting = optional_path(value),
            "bounds" => self.bounds = parse(key, value)?,
            "numberOfRounds" => self.number_of_rounds = parse(key, value)?,
            "population" => self.population = parse(key, value)?,
            "alpha" => self.alpha = parse(key, value)?,
            "weightBias" => self.weight_bias = parse(key, value)?,
            "weightDiscrepancy" => self.weight_discrepancy = parse(key, value)?,
            "weightSeparation" => self.weight_separation = parse(key, value)?,
            "weights" => self.weights = parse(key, value)?,
            "threshStressMin" => self.thresh_stress_min = parse(key, value)?,
            "threshStressMax" => self.thresh_stress_max = parse(key, value)?,
            "delta" => self.delta = parse(key, value)?,
            "numMalicious" => self.num_malicious = parse(key, value)?,
            "maliciousStrategy" => self.malicious_strategy = parse(key, value)?,
            "sybilMultiplier" => self.sybil_multiplier = parse(key, value)?,
            "averageOut" => self.average_out = parse(key, value)?,
            "stressMajorization" => self.stress_majorization = parse(key, value)?,
            "cliqueMDS" => self.clique_mds = parse(key, value)?,
            "weightedSprings" => self.weighted_springs = parse(key, value)?,
            "stressMajDropNeighbor" => self.stress_maj_drop_neighbor = parse(key, value)?,
            "stressMajDropLink" => self.stress_maj_drop_link = parse(key, value)?,
            "writeOutputHeader" => self.write_output_header = parse(key, value)?,
            "output" => self.output = PathBuf::from(value.trim()),
            "fullOutput" => self.full_output = optional_path(value),
            "dataLocation" => self.data_location = PathBuf::from(value.trim()),
            "rssiSamples" => self.rssi_samples = optional_path(value),
            "rngSeed" => self.rng_seed = parse(key, value)?,
            "distanceMeasure" => self.distance_measure = parse(key, value)?,
            "PrecompiledDistances" => self.precompiled_distances = optional_path(value),
            "symmetric" => self.symmetric = parse(key, value)?,
            "dropRate" => self.drop_rate = parse(key, value)?,
            _ if IGNORED_KEYS.contains(&key) => debug!(key, value, "ignoring parameter"),
            _ => bail!("parameter not recognized: {key}"),
        }

        Ok(())
    }

    /// Apply `key=value` overrides in order.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<()> {
        for pair in overrides {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected a 'key=value' parameter, got '{pair}'"))?;
            self.set(key.trim(), value)?;
        }

        Ok(())
    }

    /// Check that the parameters describe a runnable simulation.
    pub fn validate(&self) -> Result<()> {
        if !(self.bounds.is_finite() && self.bounds > 0.0) {
            bail!("'bounds' must be a positive number, got {}", self.bounds);
        }

        if self.sybil_multiplier < 1 {
            bail!("'sybilMultiplier' must be at least 1");
        }

        if !(0.0..=1.0).contains(&self.drop_rate) {
            bail!("'dropRate' must be within [0, 1], got {}", self.drop_rate);
        }

        if self.setting.is_none() && self.num_malicious > self.population {
            bail!(
                "'numMalicious' ({}) exceeds 'population' ({})",
                self.num_malicious,
                self.population
            );
        }

        match self.distance_measure {
            DistanceMeasure::Rssi | DistanceMeasure::MlRssiHybrid if self.rssi_samples.is_none() => {
                bail!(
                    "Distance measure '{}' needs 'rssiSamples' to point at the RSSI sample folder",
                    self.distance_measure
                )
            }
            DistanceMeasure::Dataset if self.precompiled_distances.is_none() => {
                bail!("Distance measure 'DATASET' needs 'PrecompiledDistances' to be set")
            }
            _ => (),
        }

        Ok(())
    }

    /// Key and value of every parameter, in summary column order.
    pub fn columns(&self) -> Vec<(&'static str, String)> {
        let values = [
            display_path(&self.setting),
            self.bounds.to_string(),
            self.number_of_rounds.to_string(),
            self.population.to_string(),
            self.alpha.to_string(),
            self.weight_bias.to_string(),
            self.weight_discrepancy.to_string(),
            self.weight_separation.to_string(),
            self.weights.to_string(),
            self.thresh_stress_min.to_string(),
            self.thresh_stress_max.to_string(),
            self.delta.to_string(),
            self.num_malicious.to_string(),
            self.malicious_strategy.to_string(),
            self.sybil_multiplier.to_string(),
            self.average_out.to_string(),
            self.stress_majorization.to_string(),
            self.clique_mds.to_string(),
            self.weighted_springs.to_string(),
            self.stress_maj_drop_neighbor.to_string(),
            self.stress_maj_drop_link.to_string(),
            self.write_output_header.to_string(),
            self.output.display().to_string(),
            display_path(&self.full_output),
            self.data_location.display().to_string(),
            display_path(&self.rssi_samples),
            self.rng_seed.to_string(),
            self.distance_measure.to_string(),
            display_path(&self.precompiled_distances),
            self.symmetric.to_string(),
            self.drop_rate.to_string(),
        ];

        KEYS.into_iter().zip(values).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use crate::simulation::{DistanceMeasure, Strategy};

    use super::{Disagreement, Parameters, WeightScheme, KEYS};

    #[test]
    fn set_known_keys() {
        let mut parameters = Parameters::default();
        parameters.set("population", "42").unwrap();
        parameters.set("weights", "fractional").unwrap();
        parameters.set("delta", "relative").unwrap();
        parameters.set("maliciousStrategy", "nDCFBreak").unwrap();
        parameters.set("distanceMeasure", "Rand").unwrap();
        parameters.set("cliqueMDS", "true").unwrap();
        parameters.set("setting", "").unwrap();

        assert_eq!(parameters.population, 42);
        assert_eq!(parameters.weights, WeightScheme::Fractional);
        assert_eq!(parameters.delta, Disagreement::Relative);
        assert_eq!(parameters.malicious_strategy, Strategy::NdcfBreak);
        assert_eq!(parameters.distance_measure, DistanceMeasure::Rand);
        assert!(parameters.clique_mds);
        assert_eq!(parameters.setting, None);
    }

    #[test]
    fn reject_unknown_key_and_bad_value() {
        let mut parameters = Parameters::default();

        let err = parameters.set("colour", "blue").unwrap_err();
        assert_eq!(err.to_string(), "parameter not recognized: colour");

        assert!(parameters.set("bounds", "wide").is_err());
        assert!(parameters.set("weights", "heavy").is_err());
    }

    #[test]
    fn visuals_switch_is_ignored() {
        let mut parameters = Parameters::default();
        parameters.set("visualsON", "true").unwrap();
        assert_eq!(parameters, Parameters::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "visualsON = true\npopulation = 12").unwrap();
        let parameters = Parameters::from_toml_file(file.path()).unwrap();
        assert_eq!(parameters.population, 12);
    }

    #[test]
    fn overrides_need_equals_sign() {
        let mut parameters = Parameters::default();
        parameters
            .apply_overrides(&["bounds=120", "rngSeed = 9"])
            .unwrap();
        assert_eq!(parameters.bounds, 120.0);
        assert_eq!(parameters.rng_seed, 9);

        assert!(parameters.apply_overrides(&["bounds"]).is_err());
    }

    #[test]
    fn validate_measure_prerequisites() {
        let mut parameters = Parameters::default();
        assert!(parameters.validate().is_ok());

        parameters.distance_measure = DistanceMeasure::Rssi;
        assert!(parameters.validate().is_err());
        parameters.rssi_samples = Some(PathBuf::from("rssi"));
        assert!(parameters.validate().is_ok());

        parameters.distance_measure = DistanceMeasure::Dataset;
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.drop_rate = 1.5;
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.sybil_multiplier = 0;
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn columns_follow_key_order() {
        let columns = Parameters::default().columns();
        assert_eq!(columns.len(), KEYS.len());
        assert_eq!(columns[0], ("setting", String::new()));
        assert_eq!(columns[1], ("bounds", "500".to_string()));
        assert_eq!(columns[27], ("distanceMeasure", "ML".to_string()));
    }

    #[test]
    fn read_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            population = 50
            numMalicious = 5
            maliciousStrategy = "far"
            cliqueMDS = true
            fullOutput = ""
            distanceMeasure = "Rand"
            "#
        )
        .unwrap();

        let parameters = Parameters::from_toml_file(file.path()).unwrap();
        assert_eq!(parameters.population, 50);
        assert_eq!(parameters.num_malicious, 5);
        assert_eq!(parameters.malicious_strategy, Strategy::OverGuess);
        assert!(parameters.clique_mds);
        assert_eq!(parameters.full_output, None);
        assert_eq!(parameters.bounds, 500.0);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "colour = \"blue\"").unwrap();
        assert!(Parameters::from_toml_file(file.path()).is_err());
    }
}
