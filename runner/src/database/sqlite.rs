use super::{ConnectionError, SQL_SCHEMA, SQL_SCHEMA_NUMBER};
use crate::report::SweepReport;
use hpcsweep_analysis::Objective;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, error, info};

impl From<rusqlite::Error> for ConnectionError {
    fn from(error: rusqlite::Error) -> Self {
        ConnectionError::SQLite(error)
    }
}

#[derive(Debug)]
pub struct SweepStore {
    connection: Connection,
}

impl SweepStore {
    pub fn open(path: &Path) -> Result<Self, ConnectionError> {
        let connection = Connection::open(path)?;
        debug!("Opened SQLite database {path:?}");

        Ok(Self { connection })
    }

    pub fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.connection.execute(table, []) {
                Ok(_) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    /// Insert the sweep with all its runs and series points in one transaction
    pub fn store(&self, report: &SweepReport) -> Result<i64, ConnectionError> {
        let mut tx = self.connection.unchecked_transaction()?;
        tx.set_drop_behavior(rusqlite::DropBehavior::Rollback);

        let objective = match report.objective {
            Objective::Minimize => "minimize",
            Objective::Maximize => "maximize",
        };
        let sweep: i64 = tx
            .prepare_cached(
                "insert into sweeps
                 (kind, metric_label, objective, host, created, comment)
                 values (?, ?, ?, ?, ?, ?) returning id",
            )?
            .query_row(
                params![
                    report.sweep,
                    report.metric_label,
                    objective,
                    report.host,
                    report.created.to_rfc3339(),
                    report.comment
                ],
                |row| row.get(0),
            )?;
        info!(id = sweep, "Created sweep entry");

        for run in report.runs.iter() {
            tx.prepare_cached(
                "insert into runs
                 (sweep, job_id, label, workspace, artifact, matches, selected)
                 values (?, ?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                sweep,
                run.job_id,
                run.label,
                run.workspace.to_string_lossy().as_ref(),
                run.artifact.to_string_lossy().as_ref(),
                run.values.len() as i64,
                run.selected
            ])?;
        }

        for (position, point) in report.series.points().iter().enumerate() {
            // scaling is either empty or has one entry per series point
            let scaling = report.scaling.get(position);

            tx.prepare_cached(
                "insert into points
                 (sweep, position, label, value, samples, speedup, efficiency)
                 values (?, ?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                sweep,
                position as i64,
                point.label,
                point.value,
                point.samples as i64,
                scaling.map(|scaling| scaling.speedup),
                scaling.map(|scaling| scaling.efficiency)
            ])?;
        }

        tx.commit()?;
        info!(
            "Stored {} runs and {} points",
            report.runs.len(),
            report.series.len()
        );

        Ok(sweep)
    }

    pub fn close(mut self) -> Result<(), ConnectionError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

            if counter == 3 {
                error!("Giving up on closing the SQLite connection");

                return Err(ConnectionError::SQLite(error));
            }
        }

        debug!("Closed SQLite connection");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SweepConfig,
        database::persist,
        sweep::kind::SweepKind,
    };
    use hpcsweep_analysis::{AggregatedSeries, Aggregation, RunSample};
    use std::path::PathBuf;

    fn report() -> SweepReport {
        let config: SweepConfig = r#"
batch: {}
test_setup:
  type: omp_scalability
  compile_command: gcc
  source_path: /does/not/exist
  recompile: false
  executable_name: app
  metric_pattern: "Time: .*"
  threads: [1, 2]
"#
        .parse()
        .unwrap();

        let sample = |job_id: &str, label: &str, value: f64| RunSample {
            job_id: job_id.to_owned(),
            label: label.to_owned(),
            workspace: PathBuf::from(format!("/wrk/run_omp_{label}")),
            artifact: PathBuf::from(format!("/wrk/run_omp_{label}/slurm-{job_id}.out")),
            values: vec![value],
            selected: Some(value),
        };
        let samples = vec![sample("1", "1", 4.0), sample("2", "2", 2.5), sample("3", "2", 1.5)];
        let series = AggregatedSeries::from_samples(
            samples
                .iter()
                .map(|sample| (sample.label.clone(), sample.values[0])),
        );

        SweepReport::new(
            &config,
            &SweepKind::Threads { counts: vec![1, 2] },
            Aggregation { samples, series },
            Some("nightly".to_owned()),
        )
    }

    #[test]
    fn store_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpcsweep.db");

        let first = persist(&path, &report()).unwrap();
        let second = persist(&path, &report()).unwrap();
        assert_ne!(first, second);

        let mut store = SweepStore::open(&path).unwrap();
        store.init().unwrap();

        let runs: i64 = store
            .connection
            .query_row(
                "select count(*) from runs where sweep = ?",
                [second],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(runs, 3);

        let points: Vec<(String, f64, i64, Option<f64>)> = store
            .connection
            .prepare("select label, value, samples, speedup from points where sweep = ? order by position")
            .unwrap()
            .query_map([second], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            points,
            vec![
                ("1".to_owned(), 4.0, 1, Some(1.0)),
                ("2".to_owned(), 2.0, 2, Some(2.0)),
            ]
        );

        let comment: Option<String> = store
            .connection
            .query_row("select comment from sweeps where id = ?", [first], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(comment.as_deref(), Some("nightly"));

        store.close().unwrap();
    }
}
