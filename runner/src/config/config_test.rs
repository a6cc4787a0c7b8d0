use super::*;
use std::fs;

const LEGACY_JSON: &str = r#"{
    "modules": ["gcc/11.2", "openmpi/4.1"],
    "batch_data": {
        "script_base_name": "bench",
        "executable_options": "-n 4096",
        "launcher": "srun",
        "nodes": 1,
        "ntasks": 1,
        "time": 10,
        "envars": {"OMP_PROC_BIND": "close", "OMP_PLACES": "cores", "KMP_BLOCKTIME": 0}
    },
    "test_setup": {
        "type": "omp_scalability",
        "compile_command": "g++ -fopenmp dot_test.cpp -o dot_test",
        "compiler_flags": ["-O2", "-O3 -march=native"],
        "path_to_src": "/does/not/exist",
        "recompile": false,
        "exec_name": "dot_test",
        "perf_regex": "Elapsed time: .*",
        "perf_label": "time, [s]",
        "num_repetitions": 3,
        "threads": {"start": 1, "stop": 16, "multiplier": 2}
    }
}"#;

fn minimal(extra_test: &str) -> String {
    format!(
        r#"
batch: {{}}
test_setup:
  type: omp_scalability
  compile_command: mpicc
  source_path: /does/not/exist
  recompile: false
  executable_name: app
  metric_pattern: "Time: .*"
  threads: [1, 2]
{extra_test}
"#
    )
}

#[test]
pub fn legacy_json_is_accepted() {
    let config: SweepConfig = LEGACY_JSON.parse().unwrap();

    assert_eq!(config.modules, vec!["gcc/11.2", "openmpi/4.1"]);
    assert_eq!(config.batch.script_base_name, "bench");
    assert_eq!(config.batch.time, TimeLimit::Minutes(10));
    assert_eq!(config.batch.partition, "thin");
    assert_eq!(config.test.sweep, SweepType::OmpScalability);
    assert_eq!(config.test.repetitions(), 3);
    assert_eq!(
        config.test.thread_axis().unwrap().values(),
        vec![1, 2, 4, 8, 16]
    );
    assert_eq!(config.scheduler, SchedulerConfig::default());
    assert!(config.test.exclude_states.is_empty());
    assert!(config.database.is_none());

    // envars keep the written order and are rendered as plain strings
    assert_eq!(
        config.batch.envars(),
        vec![
            ("OMP_PROC_BIND".to_owned(), "close".to_owned()),
            ("OMP_PLACES".to_owned(), "cores".to_owned()),
            ("KMP_BLOCKTIME".to_owned(), "0".to_owned()),
        ]
    );
}

#[test]
pub fn unknown_sweep_type_is_rejected() {
    let content = minimal("").replace("omp_scalability", "io_scalability");

    match content.parse::<SweepConfig>() {
        Err(ConfigErrors::Parse(error)) => {
            assert!(error.to_string().contains("io_scalability"), "{error}")
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
pub fn unknown_fields_are_rejected() {
    assert!(minimal("  threadz: [1]").parse::<SweepConfig>().is_err());
}

#[test]
pub fn repetitions_are_coerced() {
    for (value, expected) in [("0", 1), ("-4", 1), ("1", 1), ("5", 5)] {
        let config: SweepConfig = minimal(&format!("  repetitions: {value}"))
            .parse()
            .unwrap();

        assert_eq!(config.test.repetitions(), expected, "repetitions: {value}");
    }

    let mut config: SweepConfig = minimal("  repetitions: 0").parse().unwrap();
    assert!(!config.preflight_checks());
    assert_eq!(config.test.repetitions, 1);
}

#[test]
pub fn local_scheduler_and_time_format() {
    let content = format!(
        "{}\nscheduler:\n  name: local\n  timeout: 60\n",
        minimal("").replace("batch: {}", "batch: {time: \"01:30:00\"}")
    );
    let config: SweepConfig = content.parse().unwrap();

    assert_eq!(
        config.scheduler,
        SchedulerConfig::Local {
            shell: "bash".to_owned(),
            timeout: Some(60),
        }
    );
    assert_eq!(config.batch.time.to_string(), "01:30:00");
}

#[test]
pub fn preflight_collects_errors() {
    let mut config: SweepConfig = minimal("  tasks: {start: 0, stop: 4}")
        .replace("type: omp_scalability", "type: mpi_scalability")
        .replace("\"Time: .*\"", "\"Time: (\"")
        .parse()
        .unwrap();

    assert!(config.preflight_checks());
}

#[test]
pub fn preflight_requires_the_swept_axis() {
    let mut config: SweepConfig = minimal("")
        .replace("type: omp_scalability", "type: mpi_scalability")
        .parse()
        .unwrap();

    assert!(config.preflight_checks());
    assert!(matches!(
        config.test.task_axis(),
        Err(ConfigErrors::MissingAxis("mpi_scalability", "tasks"))
    ));
}

#[test]
pub fn preflight_checks_sources_when_recompiling() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("main.cpp"), "int main() {}").unwrap();

    let content = minimal("")
        .replace("recompile: false", "recompile: true")
        .replace("/does/not/exist", &source.path().to_string_lossy());
    let mut config: SweepConfig = content.parse().unwrap();
    assert!(!config.preflight_checks());

    let mut missing: SweepConfig = minimal("")
        .replace("recompile: false", "recompile: true")
        .parse()
        .unwrap();
    assert!(missing.preflight_checks());
}

#[test]
pub fn excluded_states_are_normalized() {
    let mut config: SweepConfig = minimal("  exclude_states: [cancelled, ' failed']")
        .parse()
        .unwrap();

    assert!(!config.preflight_checks());
    assert_eq!(config.test.exclude_states, vec!["CANCELLED", "FAILED"]);
}

#[test]
pub fn dependent_envars_keep_their_order() {
    let config: SweepConfig = minimal("")
        .replace(
            "batch: {}",
            "batch:\n  envars:\n    ROOT: /opt/app\n    DATA: $ROOT/data\n    BIN: $ROOT/bin",
        )
        .parse()
        .unwrap();

    let names: Vec<_> = config
        .batch
        .envars()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["ROOT", "DATA", "BIN"]);
}

#[test]
pub fn legacy_thread_range_excludes_stop() {
    let mut config: SweepConfig = minimal("  thread_range: [1, 5]")
        .replace("  threads: [1, 2]\n", "")
        .parse()
        .unwrap();

    assert!(config.test.threads.is_none());
    assert_eq!(config.test.thread_axis().unwrap().values(), vec![1, 2, 3, 4]);
    assert!(!config.preflight_checks());

    let mut empty: SweepConfig = minimal("  thread_range: [4, 4]")
        .replace("  threads: [1, 2]\n", "")
        .parse()
        .unwrap();
    assert!(empty.preflight_checks());
}

#[test]
pub fn threads_take_precedence_over_thread_range() {
    let config: SweepConfig = minimal("  thread_range: [1, 64]").parse().unwrap();

    assert_eq!(config.test.thread_axis().unwrap().values(), vec![1, 2]);
}

#[test]
pub fn load_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        SweepConfig::load(&dir.path().join("missing.yaml")),
        Err(ConfigErrors::Read { .. })
    ));

    let path = dir.path().join("config.json");
    fs::write(&path, LEGACY_JSON).unwrap();
    assert!(SweepConfig::load(&path).is_ok());
}
