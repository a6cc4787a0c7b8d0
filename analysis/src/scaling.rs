use crate::aggregate::{AggregatedSeries, SeriesPoint};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Parallel efficiency may drop by this fraction before a point stops being worth it
pub const EFFICIENCY_DROP: f64 = 0.2;

/// Whether smaller metric values are better (runtimes) or larger ones (throughput)
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Minimize,
    Maximize,
}

impl Objective {
    /// best point of the series, ties resolve to the first one seen
    pub fn best<'a>(&self, series: &'a AggregatedSeries) -> Option<&'a SeriesPoint> {
        series.points().iter().fold(None, |best, point| match best {
            Some(current) if !self.improves(point.value, current.value) => Some(current),
            _ => Some(point),
        })
    }

    fn improves(&self, candidate: f64, current: f64) -> bool {
        match self {
            Self::Minimize => candidate < current,
            Self::Maximize => candidate > current,
        }
    }

    fn speedup(&self, reference: f64, value: f64) -> f64 {
        match self {
            Self::Minimize => reference / value,
            Self::Maximize => value / reference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingPoint {
    /// threads or tasks used for this point
    pub units: f64,
    pub value: f64,
    pub speedup: f64,
    pub efficiency: f64,
}

/// Speedup and parallel efficiency relative to the first point of a scalability series.
///
/// Labels have to be numeric (thread/task counts); a series with non numeric labels
/// has no scaling and yields an empty result.
pub fn scaling(series: &AggregatedSeries, objective: Objective) -> Vec<ScalingPoint> {
    let mut parsed = Vec::with_capacity(series.len());

    for point in series.points() {
        match point.label.parse::<f64>() {
            Ok(units) if units > 0.0 => parsed.push((units, point.value)),
            _ => {
                warn!(label = %point.label, "Label is not a unit count, no scaling computed");

                return Vec::new();
            }
        }
    }

    let Some(&(reference_units, reference)) = parsed.first() else {
        return Vec::new();
    };

    parsed
        .into_iter()
        .map(|(units, value)| {
            let speedup = objective.speedup(reference, value);

            ScalingPoint {
                units,
                value,
                speedup,
                efficiency: speedup * reference_units / units,
            }
        })
        .collect()
}

/// Last point before the parallel efficiency first drops below `1 - EFFICIENCY_DROP`
pub fn sweet_spot(points: &[ScalingPoint]) -> Option<&ScalingPoint> {
    let mut last = points.first()?;

    for point in points.iter().skip(1) {
        if point.efficiency < 1.0 - EFFICIENCY_DROP {
            break;
        }
        last = point;
    }

    Some(last)
}
