use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context as ErrorContext, Result};
use regex::Regex;
use thiserror::Error;

use crate::simulation::PhonePosition;

const NUMBER: &str = r"-?\d+(?:\.\d*)?";

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("line {line}: '{text}' outside of a 'round <n>:' section")]
    OutsideRound { line: usize, text: String },

    #[error("line {line}: '{text}' appears before any 'agent <id>:' line")]
    OutsideAgent { line: usize, text: String },

    #[error("line {line}: unknown phone position '{name}'")]
    UnknownPosition { line: usize, name: String },

    #[error("line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Range and phone position of a person, as declared in `initialize:`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentTemplate {
    pub range: f64,
    pub position: Option<PhonePosition>,
}

/// Locations of everyone during one round. `None` means the person is
/// absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundFrame {
    pub time: Option<u64>,
    pub locations: BTreeMap<u32, Option<(f64, f64)>>,
}

/// A scripted scene.
///
/// ```text
/// 1 minutes
/// 40 25 area
///
/// initialize:
/// agent 0:
/// 16 range
/// INHAND phone
///
/// round 0: time 1000
/// 0 3.5 7.25
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneFile {
    pub minutes: Option<f64>,
    pub area: Option<(f64, f64)>,
    pub agents: BTreeMap<u32, AgentTemplate>,
    pub rounds: BTreeMap<u32, RoundFrame>,
}

struct Patterns {
    minutes: Regex,
    area: Regex,
    section: Regex,
    agent: Regex,
    range: Regex,
    phone: Regex,
    location: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            minutes: Regex::new(&format!(r"^\s*({NUMBER})\s+minutes"))?,
            area: Regex::new(&format!(r"^\s*({NUMBER})\s+({NUMBER})\s+area"))?,
            section: Regex::new(r"^\s*(?:(initialize)|round\s+(\d+))\s*:(?:\s*time\s+(\d+))?")?,
            agent: Regex::new(r"^\s*agent\s+(\d+)\s*:")?,
            range: Regex::new(&format!(r"^\s*({NUMBER})\s+range"))?,
            phone: Regex::new(r"^\s*(\w+)\s+phone")?,
            location: Regex::new(&format!(
                r"^\s*(\d+)\s+({NUMBER}|(?i:nan))\s+({NUMBER}|(?i:nan))"
            ))?,
        })
    }
}

#[derive(Clone, Copy)]
enum Section {
    Header,
    Initialize,
    Round(u32),
}

fn number<T: std::str::FromStr>(line: usize, value: &str) -> Result<T, SceneError> {
    value.parse().map_err(|_| SceneError::InvalidNumber {
        line,
        value: value.to_string(),
    })
}

fn coordinate(line: usize, value: &str) -> Result<Option<f64>, SceneError> {
    if value.eq_ignore_ascii_case("nan") {
        Ok(None)
    } else {
        number(line, value).map(Some)
    }
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read scene file '{}'", path.display()))?;

        Self::parse(&content).with_context(|| format!("Invalid scene file '{}'", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self, SceneError> {
        let patterns = Patterns::new()?;
        let mut scene = Self::default();
        let mut section = Section::Header;
        let mut agent: Option<u32> = None;

        for (index, text) in content.lines().enumerate() {
            let line = index + 1;
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            if let Some(captures) = patterns.minutes.captures(text) {
                scene.minutes = Some(number(line, &captures[1])?);
            } else if let Some(captures) = patterns.area.captures(text) {
                scene.area = Some((number(line, &captures[1])?, number(line, &captures[2])?));
            } else if let Some(captures) = patterns.section.captures(text) {
                section = match captures.get(2) {
                    Some(round) => {
                        let round = number(line, round.as_str())?;
                        let frame = scene.rounds.entry(round).or_default();
                        if let Some(time) = captures.get(3) {
                            frame.time = Some(number(line, time.as_str())?);
                        }
                        Section::Round(round)
                    }
                    None => Section::Initialize,
                };
            } else if let Some(captures) = patterns.agent.captures(text) {
                let id = number(line, &captures[1])?;
                scene.agents.entry(id).or_insert(AgentTemplate {
                    range: 0.0,
                    position: None,
                });
                agent = Some(id);
            } else if let Some(captures) = patterns.range.captures(text) {
                let template = agent
                    .and_then(|id| scene.agents.get_mut(&id))
                    .ok_or_else(|| SceneError::OutsideAgent {
                        line,
                        text: text.to_string(),
                    })?;
                template.range = number(line, &captures[1])?;
            } else if let Some(captures) = patterns.phone.captures(text) {
                let name = &captures[1];
                let position = name
                    .parse::<PhonePosition>()
                    .map_err(|_| SceneError::UnknownPosition {
                        line,
                        name: name.to_string(),
                    })?;
                let template = agent
                    .and_then(|id| scene.agents.get_mut(&id))
                    .ok_or_else(|| SceneError::OutsideAgent {
                        line,
                        text: text.to_string(),
                    })?;
                template.position = Some(position);
            } else if let Some(captures) = patterns.location.captures(text) {
                let Section::Round(round) = section else {
                    return Err(SceneError::OutsideRound {
                        line,
                        text: text.to_string(),
                    });
                };

                let id = number(line, &captures[1])?;
                let x = coordinate(line, &captures[2])?;
                let y = coordinate(line, &captures[3])?;
                scene
                    .rounds
                    .entry(round)
                    .or_default()
                    .locations
                    .insert(id, x.zip(y));
            }
        }

        Ok(scene)
    }

    /// Number of rounds, up to and including the last numbered one.
    pub fn round_count(&self) -> u32 {
        self.rounds.keys().next_back().map_or(0, |last| last + 1)
    }

    /// Number of people, up to and including the highest id mentioned.
    pub fn agent_count(&self) -> u32 {
        let declared = self.agents.keys().next_back().copied();
        let located = self
            .rounds
            .values()
            .filter_map(|frame| frame.locations.keys().next_back().copied())
            .max();

        declared.max(located).map_or(0, |last| last + 1)
    }

    pub fn location(&self, round: u32, id: u32) -> Option<(f64, f64)> {
        self.rounds.get(&round)?.locations.get(&id).copied().flatten()
    }
}

impl fmt::Display for SceneFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(minutes) = self.minutes {
            writeln!(f, "{minutes} minutes")?;
        }
        if let Some((x, y)) = self.area {
            writeln!(f, "{x} {y} area")?;
        }

        writeln!(f)?;
        writeln!(f, "initialize:")?;
        for (id, template) in &self.agents {
            writeln!(f)?;
            writeln!(f, "agent {id}:")?;
            writeln!(f, "{} range", template.range)?;
            if let Some(position) = template.position {
                writeln!(f, "{position} phone")?;
            }
        }

        for (round, frame) in &self.rounds {
            writeln!(f)?;
            match frame.time {
                Some(time) => writeln!(f, "round {round}: time {time}")?,
                None => writeln!(f, "round {round}:")?,
            }
            for (id, location) in &frame.locations {
                match location {
                    Some((x, y)) => writeln!(f, "{id} {x} {y}")?,
                    None => writeln!(f, "{id} nan nan")?,
                }
            }
        }

        Ok(())
    }
}
