use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use crate::analysis::types::AnalysisReport;
use crate::monitoring::FailureReport;

/// Double-quoted CSV field; embedded quotes become single quotes.
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "'"))
}

/// Append-only CSV journal of analysis reports and failures.
pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create CSV log: {}", log_path))?;

            writeln!(
                file,
                "timestamp,request_id,symbol,contract,ticks,win_label,win_pct,loss_label,loss_pct,compared"
            )?;
        }

        Ok(Self { log_path })
    }

    /// Log one completed analysis
    pub fn log_report(&self, report: &AnalysisReport) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        writeln!(
            file,
            "{},{},{},{},{},{},{:.2},{},{:.2},{}",
            Utc::now().to_rfc3339(),
            report.request_id,
            quoted(&report.symbol),
            report.contract.kind,
            report.tick_count,
            quoted(&report.result.win_label),
            report.result.win_probability,
            quoted(&report.result.loss_label),
            report.result.loss_probability,
            report.result.total_count
        )?;

        Ok(())
    }

    /// Log a failed request or session failure
    pub fn log_failure(&self, failure: &FailureReport) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        let request_id = failure
            .request_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        writeln!(
            file,
            "{},{},EVENT,{},,,,,,{}",
            Utc::now().to_rfc3339(),
            request_id,
            failure.kind,
            quoted(&failure.cause)
        )?;

        Ok(())
    }
}
