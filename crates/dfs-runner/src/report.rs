//! CSV result logs.
//!
//! Two files per sweep, both named after the run id so successive sweeps
//! never overwrite each other:
//!
//! - `results_<prefix>_<run>.csv`: one row per configuration
//! - `<prefix>_<run>.csv`: one row per evaluated polling interval
//!
//! Rows are flushed as they are written; an interrupted sweep keeps every
//! completed row.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dfs_common::error::{Classify, Severity};
use dfs_common::models::{RunResult, TestConfiguration};
use thiserror::Error;

use crate::evaluator::IntervalReport;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("cannot create report file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

impl Classify for ReportError {
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

const RESULT_COLUMNS: [&str; 9] = [
    "max_tp_mbps",
    "expected_tp_mbps",
    "test_id",
    "epoch_time",
    "time",
    "initial_channel",
    "final_channel",
    "pass_fail",
    "reasons",
];

const DETAIL_COLUMNS: [&str; 8] = [
    "tp_mbps",
    "expected_tp_mbps",
    "test_id",
    "epoch_time",
    "time",
    "monitor",
    "pass_fail",
    "deltas",
];

fn header(columns: &[&str]) -> Vec<String> {
    TestConfiguration::KEY_HEADERS
        .iter()
        .chain(columns)
        .map(|s| s.to_string())
        .collect()
}

fn timestamp(at: DateTime<Utc>) -> [String; 2] {
    [
        at.timestamp().to_string(),
        at.format("%Y-%m-%d-%H:%M:%S").to_string(),
    ]
}

pub struct ResultsWriter {
    results: csv::Writer<File>,
    detail: csv::Writer<File>,
    results_path: PathBuf,
    detail_path: PathBuf,
}

impl ResultsWriter {
    pub fn create(dir: &Path, prefix: &str, run_id: &str) -> Result<Self, ReportError> {
        std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let results_path = dir.join(format!("results_{prefix}_{run_id}.csv"));
        let detail_path = dir.join(format!("{prefix}_{run_id}.csv"));

        let mut results = open(&results_path)?;
        results.write_record(header(&RESULT_COLUMNS))?;
        results.flush().map_err(|source| ReportError::Io {
            path: results_path.clone(),
            source,
        })?;
        let mut detail = open(&detail_path)?;
        detail.write_record(header(&DETAIL_COLUMNS))?;
        detail.flush().map_err(|source| ReportError::Io {
            path: detail_path.clone(),
            source,
        })?;

        tracing::info!(
            results = %results_path.display(),
            detail = %detail_path.display(),
            "writing results"
        );
        Ok(Self {
            results,
            detail,
            results_path,
            detail_path,
        })
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn detail_path(&self) -> &Path {
        &self.detail_path
    }

    pub fn write_result(&mut self, result: &RunResult) -> Result<(), ReportError> {
        let mut row = result.config.key_values();
        row.push(format!("{:.3}", result.best_throughput_mbps));
        row.push(format!("{:.3}", result.expected_throughput_mbps));
        row.push(result.test_id.clone());
        row.extend(timestamp(result.finished_at));
        row.push(result.initial_channel.to_string());
        row.push(result.final_channel.to_string());
        row.push(result.verdict.to_string());
        row.push(result.reasons.join("; "));
        self.results.write_record(&row)?;
        self.results.flush().map_err(|source| ReportError::Io {
            path: self.results_path.clone(),
            source,
        })
    }

    pub fn write_interval(
        &mut self,
        config: &TestConfiguration,
        test_id: &str,
        expected_mbps: f64,
        report: &IntervalReport,
    ) -> Result<(), ReportError> {
        let mut row = config.key_values();
        row.push(format!("{:.3}", report.throughput_mbps));
        row.push(format!("{expected_mbps:.3}"));
        row.push(test_id.to_string());
        row.extend(timestamp(Utc::now()));
        row.push(format!("interval {} @ {}s", report.index, report.at.as_secs()));
        row.push(if report.passed { "PASS" } else { "FAIL" }.to_string());
        row.push(
            report
                .deltas
                .iter()
                .map(|(name, delta)| format!("{name}:{delta}"))
                .collect::<Vec<_>>()
                .join(" "),
        );
        self.detail.write_record(&row)?;
        self.detail.flush().map_err(|source| ReportError::Io {
            path: self.detail_path.clone(),
            source,
        })
    }
}

fn open(path: &Path) -> Result<csv::Writer<File>, ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Writer::from_writer(file))
}
