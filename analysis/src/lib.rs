pub mod aggregate;
pub mod run;
pub mod scaling;

pub use aggregate::{
    aggregate, AggregatedSeries, Aggregation, MetricSource, RunSample, Selection, SeriesPoint,
};
pub use run::SuccessfulRun;
pub use scaling::{scaling, sweet_spot, Objective, ScalingPoint};
