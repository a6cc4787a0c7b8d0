use crate::{config::SweepConfig, sweep::kind::SweepKind};
use chrono::{DateTime, Utc};
use hpcsweep_analysis::{
    scaling, sweet_spot, AggregatedSeries, Aggregation, Objective, RunSample, ScalingPoint,
    SeriesPoint,
};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Failed to write report {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Final result of a sweep, handed to logging, the report file and the database
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub sweep: String,
    pub metric_label: String,
    pub host: String,
    pub created: DateTime<Utc>,
    pub comment: Option<String>,
    pub objective: Objective,
    pub runs: Vec<RunSample>,
    pub series: AggregatedSeries,
    pub best: Option<SeriesPoint>,
    pub scaling: Vec<ScalingPoint>,
    pub sweet_spot: Option<ScalingPoint>,
}

fn hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(error) => {
            warn!(error = ?error, "Failed to retrieve hostname");
            "unknown".to_owned()
        }
    }
}

impl SweepReport {
    pub fn new(
        config: &SweepConfig,
        kind: &SweepKind,
        aggregation: Aggregation,
        comment: Option<String>,
    ) -> Self {
        let objective = config.test.objective;
        let best = objective.best(&aggregation.series).cloned();

        let scaling = if kind.is_scalability() {
            scaling(&aggregation.series, objective)
        } else {
            Vec::new()
        };
        let sweet_spot = sweet_spot(&scaling).cloned();

        Self {
            sweep: config.test.sweep.to_string(),
            metric_label: config.test.metric_label.clone(),
            host: hostname(),
            created: Utc::now(),
            comment,
            objective,
            runs: aggregation.samples,
            series: aggregation.series,
            best,
            scaling,
            sweet_spot,
        }
    }

    pub fn log_summary(&self) {
        if self.series.is_empty() {
            warn!("No usable results for {} sweep", self.sweep);
            return;
        }

        info!(
            "Results of {} sweep on {} ({})",
            self.sweep, self.host, self.metric_label
        );
        for point in self.series.points() {
            info!(
                "  {:>32} {:>14.6} ({} samples)",
                point.label, point.value, point.samples
            );
        }

        if let Some(best) = &self.best {
            info!("Best: {} with {}", best.label, best.value);
        }

        if !self.scaling.is_empty() {
            info!("{:>10} {:>10} {:>10}", "units", "speedup", "efficiency");
            for point in self.scaling.iter() {
                info!(
                    "{:>10} {:>10.3} {:>10.3}",
                    point.units, point.speedup, point.efficiency
                );
            }
        }

        if let Some(point) = &self.sweet_spot {
            info!(
                "Sweet spot at {} with efficiency {:.3}",
                point.units, point.efficiency
            );
        }
    }

    pub fn to_yaml(&self) -> Result<String, ReportError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write_yaml(&self, path: &Path) -> Result<(), ReportError> {
        fs::write(path, self.to_yaml()?).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Wrote report to {path:?}");

        Ok(())
    }
}
