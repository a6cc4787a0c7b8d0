use crate::{
    config::{ConfigErrors, SweepConfig},
    mpi::MpiVendor,
    sweep::environment::Overrides,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tracing::warn;

/// Sweep type tag of the configuration
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SweepType {
    #[serde(alias = "flags")]
    CompilerFlags,
    #[serde(alias = "omp")]
    OmpScalability,
    #[serde(alias = "mpi")]
    MpiScalability,
    #[serde(alias = "collectives", alias = "mpi_collectives")]
    MpiCollective,
}

impl Display for SweepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CompilerFlags => "compiler_flags",
            Self::OmpScalability => "omp_scalability",
            Self::MpiScalability => "mpi_scalability",
            Self::MpiCollective => "mpi_collective",
        })
    }
}

/// One value of the swept axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPoint {
    /// name of the point in the aggregated series
    pub label: String,
    /// makes workspace and job script names unique
    pub postfix: String,
    pub overrides: Overrides,
}

/// Resolved sweep with its axis, each kind knows how to turn axis values into points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepKind {
    CompilerFlags { flags: Vec<String> },
    Threads { counts: Vec<u32> },
    Tasks { counts: Vec<u32>, cores_per_node: u32 },
    Collectives { vendor: MpiVendor },
}

impl SweepKind {
    /// Resolve axis values and, for collective sweeps, the MPI vendor
    pub fn resolve(config: &SweepConfig) -> Result<Self, ConfigErrors> {
        let test = &config.test;

        Ok(match test.sweep {
            SweepType::CompilerFlags => {
                let flags = test.compiler_flags.iter().cloned().unique().collect_vec();
                if flags.len() != test.compiler_flags.len() {
                    warn!(flags = ?test.compiler_flags, "Compiler flags contain duplicates, only the first occurrence is kept");
                }

                Self::CompilerFlags { flags }
            }
            SweepType::OmpScalability => Self::Threads {
                counts: test.thread_axis()?.values(),
            },
            SweepType::MpiScalability => Self::Tasks {
                counts: test.task_axis()?.values(),
                cores_per_node: config.batch.max_cores_per_node.max(1),
            },
            SweepType::MpiCollective => Self::Collectives {
                vendor: MpiVendor::resolve(&test.compile_command, &config.batch.launcher)?,
            },
        })
    }

    /// short name used in postfixes and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompilerFlags { .. } => "flags",
            Self::Threads { .. } => "omp",
            Self::Tasks { .. } => "mpi",
            Self::Collectives { .. } => "col_flags",
        }
    }

    pub fn is_scalability(&self) -> bool {
        matches!(self, Self::Threads { .. } | Self::Tasks { .. })
    }

    pub fn total(&self) -> usize {
        match self {
            Self::CompilerFlags { flags } => flags.len(),
            Self::Threads { counts } | Self::Tasks { counts, .. } => counts.len(),
            Self::Collectives { vendor } => vendor.point_count(),
        }
    }

    pub fn points(&self) -> Box<dyn Iterator<Item = SweepPoint> + '_> {
        let name = self.name();

        match self {
            Self::CompilerFlags { flags } => {
                Box::new(flags.iter().enumerate().map(move |(idx, flag)| SweepPoint {
                    label: flag.clone(),
                    postfix: format!("_{name}_{idx}"),
                    overrides: Overrides {
                        compiler_flags: Some(flag.clone()),
                        ..Overrides::default()
                    },
                }))
            }
            Self::Threads { counts } => Box::new(counts.iter().map(move |threads| SweepPoint {
                label: threads.to_string(),
                postfix: format!("_{name}_{threads}"),
                overrides: Overrides {
                    envars: vec![("OMP_NUM_THREADS".to_owned(), threads.to_string())],
                    cpus: Some(*threads),
                    ..Overrides::default()
                },
            })),
            Self::Tasks {
                counts,
                cores_per_node,
            } => Box::new(counts.iter().map(move |tasks| SweepPoint {
                label: tasks.to_string(),
                postfix: format!("_{name}_{tasks}"),
                overrides: Overrides {
                    ntasks: Some(*tasks),
                    nodes: Some(tasks.div_ceil(*cores_per_node)),
                    ..Overrides::default()
                },
            })),
            Self::Collectives { vendor } => {
                let vendor = *vendor;
                Box::new(vendor.collectives().iter().flat_map(move |collective| {
                    (vendor.lower_bound()..=collective.max).map(move |value| SweepPoint {
                        label: format!("{}_{value}", collective.name),
                        postfix: format!("_{name}_{}_{value}", collective.name),
                        overrides: vendor.overrides(collective, value),
                    })
                }))
            }
        }
    }
}
