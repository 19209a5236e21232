//! Output formatting utilities

use anomaly_lib::detect::ScaleEstimate;
use anomaly_lib::{AnomalyRecord, AnomalySeverity, Analysis, DetectorConfig, Report};
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Compact JSON report on one line (default)
    #[default]
    Json,
    /// Human-readable summary and table
    Table,
}

#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Deviation")]
    deviation: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

impl From<&AnomalyRecord> for AnomalyRow {
    fn from(record: &AnomalyRecord) -> Self {
        Self {
            timestamp: format_timestamp(record.timestamp),
            value: format_value(record.value),
            baseline: format_value(record.baseline),
            deviation: format_deviation(record.deviation_percent()),
            score: format_score(record.score),
            severity: color_severity(record.severity()),
        }
    }
}

/// The report as the single-line JSON contract
pub fn render_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string(report)
}

/// Print a summary and the anomaly table
pub fn print_report(analysis: &Analysis, config: &DetectorConfig) {
    let report = &analysis.report;

    println!("\n{}", "Anomaly Report".bold());
    println!("{}", "=".repeat(60));
    println!("{:<14} {}", "Query:".bold(), report.query);
    println!("{:<14} {}", "Points:".bold(), report.points);
    println!("{:<14} {}", "Window:".bold(), config.window_size);
    println!("{:<14} {:.2}", "Threshold:".bold(), config.threshold);
    if let Some(scale) = &analysis.scale {
        println!("{:<14} {}", "Scale:".bold(), describe_scale(scale));
    }
    println!();

    if report.anomalies.is_empty() {
        if report.points == 0 {
            print_warning("Query returned no samples");
        } else {
            print_success("No anomalies detected");
        }
        return;
    }

    let rows: Vec<AnomalyRow> = report.anomalies.iter().map(AnomalyRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if analysis.flagged > report.anomalies.len() {
        print_warning(&format!(
            "{} of {} flagged points shown ({} selection)",
            report.anomalies.len(),
            analysis.flagged,
            config.selection
        ));
    } else {
        print_info(&format!("{} anomalies", report.anomalies.len()));
    }
}

fn describe_scale(scale: &ScaleEstimate) -> String {
    match *scale {
        ScaleEstimate::Global {
            mad,
            sigma,
            floored,
        } => {
            let text = format!("global MAD {} (sigma {})", format_value(mad), format_value(sigma));
            if floored {
                format!("{} {}", text, "[floored]".yellow())
            } else {
                text
            }
        }
        ScaleEstimate::Local {
            window,
            floored_windows,
        } => format!(
            "windowed MAD over {} points ({} floored)",
            window, floored_windows
        ),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format unix seconds as UTC
pub fn format_timestamp(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// Format a sample value, switching to scientific notation for extremes
pub fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-3..1e6).contains(&magnitude) {
        format!("{:.3e}", value)
    } else {
        format!("{:.3}", value)
    }
}

/// Format a signed score
pub fn format_score(score: f64) -> String {
    if score.abs() >= 1e6 {
        format!("{:+.2e}", score)
    } else {
        format!("{:+.2}", score)
    }
}

/// Format deviation from baseline as a percentage
pub fn format_deviation(percent: f64) -> String {
    if percent.is_finite() {
        format!("{:+.1}%", percent)
    } else {
        "n/a".to_string()
    }
}

/// Color severity based on level
pub fn color_severity(severity: AnomalySeverity) -> String {
    let label = severity.to_string();
    match severity {
        AnomalySeverity::Critical => label.red().bold().to_string(),
        AnomalySeverity::High => label.red().to_string(),
        AnomalySeverity::Warning => label.yellow().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0.000");
        assert_eq!(format_value(12.5), "12.500");
        assert_eq!(format_value(2_500_000.0), "2.500e6");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(3.456), "+3.46");
        assert_eq!(format_score(-4.0), "-4.00");
        assert!(format_score(6.07e10).ends_with("e10"));
    }

    #[test]
    fn test_format_deviation() {
        assert_eq!(format_deviation(50.0), "+50.0%");
        assert_eq!(format_deviation(f64::INFINITY), "n/a");
    }

    #[test]
    fn test_render_json_is_single_line() {
        let report = Report {
            ok: true,
            query: "up".to_string(),
            points: 3,
            anomalies: vec![AnomalyRecord {
                timestamp: 120,
                value: 100.0,
                baseline: 10.0,
                score: 4.5,
            }],
        };
        let json = render_json(&report).unwrap();
        assert!(!json.contains('\n'));
        assert_eq!(
            json,
            r#"{"ok":true,"query":"up","points":3,"anomalies":[{"ts":120,"val":100.0,"base":10.0,"z":4.5}]}"#
        );
    }
}
