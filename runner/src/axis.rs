use crate::config::ConfigErrors;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Axis as written in the configuration, either an explicit list or a range
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum AxisConfig {
    Values(Vec<u32>),
    Range {
        start: u32,
        stop: u32,
        #[serde(default)]
        step: Option<u32>,
        #[serde(default)]
        multiplier: Option<u32>,
    },
}

/// Validated sweep axis of thread or task counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axis {
    /// `start..=stop` in steps of `step`, the upper bound is inclusive
    Linear { start: u32, stop: u32, step: u32 },
    /// `start, start * multiplier, ...` up to and including `stop`
    Geometric {
        start: u32,
        stop: u32,
        multiplier: u32,
    },
    Values(Vec<u32>),
}

impl TryFrom<&AxisConfig> for Axis {
    type Error = ConfigErrors;

    fn try_from(config: &AxisConfig) -> Result<Self, Self::Error> {
        match config {
            AxisConfig::Values(values) => {
                if values.is_empty() {
                    return Err(ConfigErrors::InvalidAxis("value list is empty".into()));
                }
                if values.contains(&0) {
                    return Err(ConfigErrors::InvalidAxis("values must be positive".into()));
                }

                let unique = values.iter().copied().unique().collect_vec();
                if unique.len() != values.len() {
                    warn!(values = ?values, "Axis contains duplicate values, only the first occurrence is kept");
                }

                Ok(Self::Values(unique))
            }
            AxisConfig::Range {
                start,
                stop,
                step,
                multiplier,
            } => {
                if *start == 0 {
                    return Err(ConfigErrors::InvalidAxis("start must be positive".into()));
                }

                match multiplier {
                    Some(0) => Err(ConfigErrors::InvalidAxis(
                        "multiplier must be positive".into(),
                    )),
                    Some(multiplier) if *multiplier > 1 => {
                        if step.is_some() {
                            warn!("Axis has both step and multiplier, step is ignored");
                        }

                        Ok(Self::Geometric {
                            start: *start,
                            stop: *stop,
                            multiplier: *multiplier,
                        })
                    }
                    _ => match step.unwrap_or(1) {
                        0 => Err(ConfigErrors::InvalidAxis("step must be positive".into())),
                        step => Ok(Self::Linear {
                            start: *start,
                            stop: *stop,
                            step,
                        }),
                    },
                }
            }
        }
    }
}

impl Axis {
    pub fn values(&self) -> Vec<u32> {
        match self {
            Self::Linear { start, stop, step } => {
                (*start..=*stop).step_by(*step as usize).collect()
            }
            Self::Geometric {
                start,
                stop,
                multiplier,
            } => {
                let mut values = Vec::new();
                let mut current = Some(*start);

                while let Some(value) = current.filter(|value| value <= stop) {
                    values.push(value);
                    current = value.checked_mul(*multiplier);
                }

                values
            }
            Self::Values(values) => values.clone(),
        }
    }
}
