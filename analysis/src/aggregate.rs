use crate::run::SuccessfulRun;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// How a single run's metric matches are reduced to one value
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// the last match in the output
    Last,
    /// arithmetic mean of all matches
    #[default]
    Mean,
}

impl Selection {
    pub fn select(self, values: &[f64]) -> Option<f64> {
        match self {
            Self::Last => values.last().copied(),
            Self::Mean => mean(values),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Where metrics of a run come from, implemented by whoever knows the scheduler's
/// artifact naming and the metric pattern
pub trait MetricSource {
    type Error: Display;

    /// location of the output artifact written for `run`
    fn locate(&self, run: &SuccessfulRun) -> PathBuf;

    /// all metric values found in `artifact`, possibly none
    fn extract(&self, artifact: &Path) -> Result<Vec<f64>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
    /// number of runs the value was averaged from
    pub samples: usize,
}

/// One averaged value per distinct label, in the order labels were first seen
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregatedSeries {
    points: Vec<SeriesPoint>,
}

impl AggregatedSeries {
    /// Group `(label, value)` samples by label and average them.
    pub fn from_samples<I, S>(samples: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut sums: Vec<(String, f64, usize)> = Vec::new();

        for (label, value) in samples {
            let label = label.into();

            match positions.get(&label) {
                Some(&position) => {
                    let entry = &mut sums[position];
                    entry.1 += value;
                    entry.2 += 1;
                }
                None => {
                    positions.insert(label.clone(), sums.len());
                    sums.push((label, value, 1));
                }
            }
        }

        Self {
            points: sums
                .into_iter()
                .map(|(label, sum, samples)| SeriesPoint {
                    label,
                    value: sum / samples as f64,
                    samples,
                })
                .collect(),
        }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&SeriesPoint> {
        self.points.iter().find(|point| point.label == label)
    }

    /// `(label, value)` pairs as handed to reporting
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.points
            .iter()
            .map(|point| (point.label.as_str(), point.value))
    }
}

/// Everything extracted for a single successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSample {
    pub job_id: String,
    pub label: String,
    pub workspace: PathBuf,
    pub artifact: PathBuf,
    pub values: Vec<f64>,
    pub selected: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    pub samples: Vec<RunSample>,
    pub series: AggregatedSeries,
}

/// Extract the metric of every run and average repetitions per label.
///
/// Runs whose extraction fails or yields nothing are skipped with a warning, a
/// label without any surviving run is absent from the series.
pub fn aggregate<'a, I, S>(runs: I, selection: Selection, source: &S) -> Aggregation
where
    I: IntoIterator<Item = &'a SuccessfulRun>,
    S: MetricSource + ?Sized,
{
    let samples: Vec<RunSample> = runs
        .into_iter()
        .filter_map(|run| {
            let artifact = source.locate(run);

            let values = match source.extract(&artifact) {
                Ok(values) => values,
                Err(error) => {
                    warn!(
                        job_id = %run.job_id,
                        label = %run.label,
                        "Failed to extract metric, run is skipped: {error}"
                    );

                    return None;
                }
            };

            let selected = selection.select(&values);
            if selected.is_none() {
                warn!(
                    job_id = %run.job_id,
                    label = %run.label,
                    artifact = ?artifact,
                    "No metric value matched, run is skipped"
                );
            } else {
                debug!(job_id = %run.job_id, label = %run.label, values = ?values, "Extracted metric");
            }

            Some(RunSample {
                job_id: run.job_id.clone(),
                label: run.label.clone(),
                workspace: run.workspace.clone(),
                artifact,
                values,
                selected,
            })
        })
        .collect();

    let series = AggregatedSeries::from_samples(
        samples
            .iter()
            .filter_map(|sample| sample.selected.map(|value| (sample.label.clone(), value))),
    );

    Aggregation { samples, series }
}
