use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;
use crate::analysis::types::{AnalysisReport, AnalysisResult, DigitDistribution};
use crate::monitoring::logger::CsvLogger;
use crate::monitoring::{ConnectionStatus, LogEntry, LogLevel, Notice};

/// Uniform share of a single digit; cells above it are marked `+`.
const DIGIT_BASELINE_PCT: f64 = 10.0;

pub fn format_status(status: &ConnectionStatus) -> String {
    if status.online {
        format!(
            "ONLINE  {}",
            status.account_label.as_deref().unwrap_or("")
        )
    } else {
        "OFFLINE SYSTEM OFFLINE".to_string()
    }
}

pub fn format_log(entry: &LogEntry) -> String {
    let tag = match entry.level {
        LogLevel::Info => "info",
        LogLevel::Success => " ok ",
        LogLevel::Warn => "warn",
        LogLevel::Error => "FAIL",
    };
    format!("[{}] [{}] {}", entry.at.format("%H:%M:%S"), tag, entry.message)
}

/// Report header line; the newest tick's server time is appended when known.
pub fn format_header(report: &AnalysisReport) -> String {
    let mut header = format!(
        "{} | {} ticks | {}",
        report.symbol, report.tick_count, report.contract.kind
    );
    if let Some(at) = report.last_tick_epoch.and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0)) {
        header.push_str(&format!(" | as of {}", at.format("%H:%M:%S UTC")));
    }
    header
}

pub fn format_result(result: &AnalysisResult) -> String {
    format!(
        "{} vs {} Probability\n  {}: {:.2}%   {}: {:.2}%",
        result.win_label,
        result.loss_label,
        result.win_label,
        result.win_probability,
        result.loss_label,
        result.loss_probability
    )
}

pub fn format_distribution(dist: &DigitDistribution) -> String {
    let header: Vec<String> = (0..10).map(|d| format!("{:>7}", d)).collect();
    let cells: Vec<String> = dist
        .percentages
        .iter()
        .map(|pct| {
            let mark = if *pct > DIGIT_BASELINE_PCT { '+' } else { '-' };
            format!("{:>6.1}{}", pct, mark)
        })
        .collect();

    format!(
        "Last Digit Distribution (Total Ticks: {})\n{}\n{}",
        dist.total,
        header.join(""),
        cells.join("")
    )
}

/// Drain notices to stdout (and the CSV journal, when enabled) until every
/// sender is gone.
pub async fn run(mut rx: mpsc::UnboundedReceiver<Notice>, journal: Option<CsvLogger>) {
    while let Some(notice) = rx.recv().await {
        match notice {
            Notice::Status(status) => println!("== {}", format_status(&status)),
            Notice::Log(entry) => println!("{}", format_log(&entry)),
            Notice::Report(report) => {
                println!("\n{}", format_header(&report));
                println!("{}", format_result(&report.result));
                if let Some(dist) = &report.distribution {
                    println!("{}", format_distribution(dist));
                }
                println!();

                if let Some(journal) = &journal {
                    if let Err(e) = journal.log_report(&report) {
                        warn!("Failed to journal report: {}", e);
                    }
                }
            }
            Notice::Failure(failure) => {
                if let Some(journal) = &journal {
                    if let Err(e) = journal.log_failure(&failure) {
                        warn!("Failed to journal failure: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_result_two_decimals() {
        let result = AnalysisResult {
            win_label: "OVER 4".to_string(),
            win_probability: 100.0 / 3.0,
            loss_label: "UNDER 4".to_string(),
            loss_probability: 200.0 / 3.0,
            win_count: 1,
            total_count: 3,
        };
        let text = format_result(&result);
        assert!(text.starts_with("OVER 4 vs UNDER 4 Probability"));
        assert!(text.contains("OVER 4: 33.33%"));
        assert!(text.contains("UNDER 4: 66.67%"));
    }

    #[test]
    fn test_format_distribution_marks_baseline() {
        let mut percentages = [0.0; 10];
        percentages[5] = 60.0;
        percentages[1] = 40.0;
        let dist = DigitDistribution {
            counts: [0, 2, 0, 0, 0, 3, 0, 0, 0, 0],
            percentages,
            total: 5,
        };
        let text = format_distribution(&dist);
        assert!(text.starts_with("Last Digit Distribution (Total Ticks: 5)"));
        assert!(text.contains("60.0+"));
        assert!(text.contains("0.0-"));
    }

    #[test]
    fn test_format_header_with_tick_time() {
        let mut report = AnalysisReport {
            request_id: 1,
            symbol: "R_100".to_string(),
            contract: crate::analysis::types::ContractSpec::even_odd(),
            tick_count: 2,
            last_tick_epoch: Some(3_661),
            result: AnalysisResult {
                win_label: "EVEN".to_string(),
                win_probability: 0.0,
                loss_label: "ODD".to_string(),
                loss_probability: 100.0,
                win_count: 0,
                total_count: 1,
            },
            distribution: None,
        };
        assert_eq!(format_header(&report), "R_100 | 2 ticks | EVEN_ODD | as of 01:01:01 UTC");

        report.last_tick_epoch = None;
        assert_eq!(format_header(&report), "R_100 | 2 ticks | EVEN_ODD");
    }

    #[test]
    fn test_format_status() {
        let status = ConnectionStatus {
            online: true,
            account_label: Some("CR1 (USD)".to_string()),
        };
        assert_eq!(format_status(&status), "ONLINE  CR1 (USD)");
        assert!(format_status(&ConnectionStatus::offline()).starts_with("OFFLINE"));
    }
}
