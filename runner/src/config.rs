use crate::{
    axis::{Axis, AxisConfig},
    sweep::kind::SweepType,
};
use globset::Glob;
use itertools::Itertools;
use hpcsweep_analysis::{Objective, Selection};
use hpcsweep_ingest::{IngestError, MetricPattern, PollSettings};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read configuration {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Axis is invalid: {0}")]
    InvalidAxis(String),
    #[error("Sweep `{0}` requires test_setup.{1}")]
    MissingAxis(&'static str, &'static str),
    #[error("Metric pattern is invalid: {0}")]
    InvalidPattern(#[from] IngestError),
    #[error("Cannot determine the MPI vendor of `{0}` from the wrapper name or the launcher")]
    UnknownMpiVendor(String),
}

/// Complete description of one sweep, read once at startup
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    // environment modules loaded in every job script
    #[serde(default)]
    pub modules: Vec<String>,
    // resource request and launcher, the base every sweep point overrides
    #[serde(alias = "batch_data")]
    pub batch: BatchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(alias = "test_setup")]
    pub test: TestSetup,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default, alias = "db")]
    pub database: Option<DatabaseConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_script_base_name")]
    pub script_base_name: String,
    #[serde(default)]
    pub executable_options: String,
    #[serde(default = "default_launcher")]
    pub launcher: String,
    #[serde(default = "one")]
    pub nodes: u32,
    #[serde(default = "one")]
    pub ntasks: u32,
    #[serde(default = "one")]
    pub cpus: u32,
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default)]
    pub time: TimeLimit,
    #[serde(default = "default_max_cores_per_node")]
    pub max_cores_per_node: u32,
    // exported in the job script in the written order, values may be any scalar
    #[serde(default)]
    pub envars: serde_yaml::Mapping,
}

/// Wall clock limit, either plain minutes or any format sbatch understands
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum TimeLimit {
    Minutes(u64),
    Formatted(String),
}

impl Default for TimeLimit {
    fn default() -> Self {
        Self::Minutes(1)
    }
}

impl Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes(minutes) => write!(f, "{minutes}"),
            Self::Formatted(limit) => f.write_str(limit),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum SchedulerConfig {
    Slurm {
        #[serde(default = "default_sbatch")]
        sbatch: String,
        // `null` disables the accounting fallback for terminal states
        #[serde(default = "default_sacct")]
        sacct: Option<String>,
        // sbatch output is kept in this file inside the workspace
        #[serde(default = "default_submit_log")]
        log_name: String,
    },
    /// run job scripts directly on this machine, mostly useful for testing a setup
    Local {
        #[serde(default = "default_shell")]
        shell: String,
        // seconds
        #[serde(default)]
        timeout: Option<u64>,
    },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::Slurm {
            sbatch: default_sbatch(),
            sacct: default_sacct(),
            log_name: default_submit_log(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TestSetup {
    #[serde(rename = "type", alias = "sweep")]
    pub sweep: SweepType,
    #[serde(alias = "compiler")]
    pub compile_command: String,
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    #[serde(alias = "path_to_src")]
    pub source_path: PathBuf,
    #[serde(default = "yes")]
    pub recompile: bool,
    #[serde(alias = "exec_name")]
    pub executable_name: String,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(alias = "perf_regex")]
    pub metric_pattern: String,
    #[serde(default = "default_metric_label", alias = "perf_label")]
    pub metric_label: String,
    // coerced to at least one, see `TestSetup::repetitions`
    #[serde(default = "default_repetitions", alias = "num_repetitions")]
    pub repetitions: i64,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub threads: Option<AxisConfig>,
    // older configurations, `[start, stop]` without `stop`
    #[serde(default)]
    pub thread_range: Option<[u32; 2]>,
    #[serde(default)]
    pub tasks: Option<AxisConfig>,
    // terminal states that make a repetition unusable in addition to CANCELLED
    #[serde(default)]
    pub exclude_states: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    // seconds to wait for a job's output to show up
    #[serde(default = "default_max_wait")]
    pub max_wait: u64,
    // milliseconds between two checks
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_wait: default_max_wait(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl IngestConfig {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            max_wait: Duration::from_secs(self.max_wait),
            interval: Duration::from_millis(self.poll_interval),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    // relative paths are resolved against the current directory
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    // globs relative to the source directory that are not copied
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl BatchConfig {
    /// environment variables in configuration order with scalars rendered as strings
    pub fn envars(&self) -> Vec<(String, String)> {
        self.envars
            .iter()
            .map(|(name, value)| (scalar_to_string(name), scalar_to_string(value)))
            .collect()
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(value) => value.to_string(),
        serde_yaml::Value::Number(value) => value.to_string(),
        serde_yaml::Value::String(value) => value.clone(),
        other => serde_yaml::to_string(other)
            .map(|rendered| rendered.trim().to_owned())
            .unwrap_or_default(),
    }
}

impl TestSetup {
    /// number of repetitions per sweep point, never less than one
    pub fn repetitions(&self) -> usize {
        usize::try_from(self.repetitions).unwrap_or(0).max(1)
    }

    pub fn thread_axis(&self) -> Result<Axis, ConfigErrors> {
        match (&self.threads, self.thread_range) {
            (Some(threads), _) => Axis::try_from(threads),
            (None, Some([start, stop])) => Axis::try_from(&AxisConfig::Range {
                start,
                stop: stop.saturating_sub(1),
                step: None,
                multiplier: None,
            }),
            (None, None) => Err(ConfigErrors::MissingAxis("omp_scalability", "threads")),
        }
    }

    pub fn task_axis(&self) -> Result<Axis, ConfigErrors> {
        self.tasks
            .as_ref()
            .ok_or(ConfigErrors::MissingAxis("mpi_scalability", "tasks"))
            .and_then(Axis::try_from)
    }

    pub fn metric_pattern(&self) -> Result<MetricPattern, ConfigErrors> {
        Ok(MetricPattern::new(&self.metric_pattern)?)
    }
}

impl FromStr for SweepConfig {
    type Err = ConfigErrors;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl SweepConfig {
    /// Read a YAML configuration, JSON documents are valid YAML and work as well
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        fs::read_to_string(path)
            .map_err(|source| ConfigErrors::Read {
                path: path.to_path_buf(),
                source,
            })?
            .parse()
    }

    /// Validate everything that can be checked before the first job is submitted.
    ///
    /// All problems are logged instead of stopping at the first one, returns
    /// whether any error was found.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if self.test.repetitions < 1 {
            warn!(
                "test_setup.repetitions ({}) is invalid, using a single repetition",
                self.test.repetitions
            );
            self.test.repetitions = 1;
        }

        if let Err(e) = self.test.metric_pattern() {
            error!("test_setup.metric_pattern: {e}");
            contains_error = true;
        }

        if self.test.executable_name.trim().is_empty() {
            error!("test_setup.executable_name must not be empty");
            contains_error = true;
        }

        if self.batch.script_base_name.trim().is_empty() {
            error!("batch.script_base_name must not be empty");
            contains_error = true;
        }

        for (name, value) in [
            ("nodes", self.batch.nodes),
            ("ntasks", self.batch.ntasks),
            ("cpus", self.batch.cpus),
            ("max_cores_per_node", self.batch.max_cores_per_node),
        ] {
            if value == 0 {
                error!("batch.{name} must be at least 1");
                contains_error = true;
            }
        }

        if self.test.recompile && !self.test.source_path.is_dir() {
            error!(
                "test_setup.source_path ({}) is not a directory, nothing to recompile",
                self.test.source_path.display()
            );
            contains_error = true;
        } else if !self.test.recompile
            && !self
                .test
                .source_path
                .join(&self.test.executable_name)
                .is_file()
        {
            warn!(
                "Executable {} not found in {}, jobs are going to fail",
                self.test.executable_name,
                self.test.source_path.display()
            );
        }

        match self.test.sweep {
            SweepType::CompilerFlags => {
                if self.test.compiler_flags.is_empty() {
                    error!("test_setup.compiler_flags is empty, there is nothing to sweep");
                    contains_error = true;
                }
                if self.test.compiler_flags.iter().duplicates().next().is_some() {
                    warn!(flags = ?self.test.compiler_flags, "test_setup.compiler_flags contains duplicates, only the first occurrence is swept");
                }
                if !self.test.recompile {
                    warn!("Sweeping compiler flags without test_setup.recompile has no effect on the binary");
                }
            }
            SweepType::OmpScalability => {
                if self.test.threads.is_some() && self.test.thread_range.is_some() {
                    warn!("test_setup.thread_range is ignored, test_setup.threads is set");
                }
                contains_error |= check_axis("threads", self.test.thread_axis());
            }
            SweepType::MpiScalability => {
                contains_error |= check_axis("tasks", self.test.task_axis());
            }
            SweepType::MpiCollective => {}
        }

        for pattern in self.workspace.exclude.iter() {
            if let Err(e) = Glob::new(pattern) {
                error!("workspace.exclude contains an invalid glob {pattern}: {e}");
                contains_error = true;
            }
        }

        for state in self.test.exclude_states.iter_mut() {
            *state = state.trim().to_uppercase();
        }

        contains_error
    }
}

fn check_axis(name: &str, axis: Result<Axis, ConfigErrors>) -> bool {
    match axis {
        Ok(axis) if axis.values().is_empty() => {
            error!("test_setup.{name} does not contain any value");
            true
        }
        Ok(_) => false,
        Err(e) => {
            error!("test_setup.{name}: {e}");
            true
        }
    }
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

fn default_script_base_name() -> String {
    "job".to_owned()
}

fn default_launcher() -> String {
    "srun".to_owned()
}

fn default_partition() -> String {
    "thin".to_owned()
}

fn default_max_cores_per_node() -> u32 {
    128
}

fn default_sbatch() -> String {
    "sbatch".to_owned()
}

fn default_sacct() -> Option<String> {
    Some("sacct".to_owned())
}

fn default_submit_log() -> String {
    "output.log".to_owned()
}

fn default_shell() -> String {
    "bash".to_owned()
}

fn default_metric_label() -> String {
    "time, [s]".to_owned()
}

fn default_repetitions() -> i64 {
    1
}

fn default_max_wait() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    500
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("wrk")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("hpcsweep.db")
}

#[cfg(test)]
mod config_test;
