//! Per-run score exports
//!
//! One CSV of aggregate scores and one JSON file of full financial
//! assessments per run date, written under the configured output
//! directory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use crate::pipeline::RunSummary;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write export file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to serialize export: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Paths written by one export.
#[derive(Debug)]
pub struct ExportPaths {
    pub scores_csv: PathBuf,
    pub assessments_json: PathBuf,
}

#[derive(Serialize)]
struct ScoreRow<'a> {
    as_of_date: NaiveDate,
    supplier_id: &'a str,
    c1: i32,
    c2: i32,
    c3: i32,
    financial_score: Option<i32>,
    global_score: i32,
    risk_level: String,
    confidence: f64,
    alerted: bool,
}

pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write the run's scores and assessments for the given date.
    pub fn export(
        &self,
        summary: &RunSummary,
        as_of_date: NaiveDate,
    ) -> Result<ExportPaths, ExportError> {
        let scores_csv = self.dir.join(format!("scores_{}.csv", as_of_date));
        let assessments_json = self.dir.join(format!("assessments_{}.json", as_of_date));

        self.write_scores_csv(&scores_csv, summary)?;
        self.write_assessments_json(&assessments_json, summary)?;

        tracing::info!(
            scores = %scores_csv.display(),
            assessments = %assessments_json.display(),
            rows = summary.results.len(),
            "Exported run results"
        );

        Ok(ExportPaths {
            scores_csv,
            assessments_json,
        })
    }

    fn write_scores_csv(&self, path: &Path, summary: &RunSummary) -> Result<(), ExportError> {
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        for result in &summary.results {
            let a = &result.aggregate;
            writer.serialize(ScoreRow {
                as_of_date: a.as_of_date,
                supplier_id: &a.supplier_id,
                c1: a.c1,
                c2: a.c2,
                c3: a.c3,
                financial_score: a.financial_score,
                global_score: a.global_score,
                risk_level: a.risk_level.to_string(),
                confidence: result.assessment.confidence,
                alerted: result.alert_sent,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_assessments_json(&self, path: &Path, summary: &RunSummary) -> Result<(), ExportError> {
        let assessments: Vec<_> = summary.results.iter().map(|r| &r.assessment).collect();
        let json = serde_json::to_string_pretty(&assessments)?;
        fs::write(path, json)?;
        Ok(())
    }
}
