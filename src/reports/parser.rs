//! Report document parsing and validation.

use super::models::{Category, Report, Summary};

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Why a single report file was rejected.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("{path}: malformed report: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: missing or invalid field `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("{path}: summary invariant violated: {detail}")]
    InvariantViolation { path: PathBuf, detail: String },
}

impl ReportError {
    /// The document ended early, as one still being written does.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ReportError::Malformed { source, .. } if source.is_eof())
    }
}

/// Turns raw report bytes into a [`Report`].
pub trait ReportParser: Send + Sync {
    fn parse(&self, bytes: &[u8], category: Category, path: &Path) -> Result<Report, ReportError>;
}

/// Parser for the JSON documents written by the test executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportParser;

/// On-disk shape. Anything not named here is ignored.
#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    test_type: Option<String>,
    #[serde(default)]
    summary: Option<Summary>,
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

impl ReportParser for JsonReportParser {
    fn parse(&self, bytes: &[u8], category: Category, path: &Path) -> Result<Report, ReportError> {
        let raw: RawReport = serde_json::from_slice(bytes).map_err(|source| ReportError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| ReportError::MissingField {
                path: path.to_path_buf(),
                field: "timestamp",
            })?;

        let summary = raw.summary.ok_or_else(|| ReportError::MissingField {
            path: path.to_path_buf(),
            field: "summary",
        })?;

        if !summary.is_consistent() {
            return Err(ReportError::InvariantViolation {
                path: path.to_path_buf(),
                detail: format!(
                    "total {} != passed {} + failed {}",
                    summary.total, summary.passed, summary.failed
                ),
            });
        }

        if let Some(embedded) = raw.test_type.as_deref() {
            if embedded != category.as_str() {
                tracing::debug!(
                    "{}: test_type {:?} differs from directory category {}",
                    path.display(),
                    embedded,
                    category
                );
            }
        }

        Ok(Report {
            id: report_id(path),
            category,
            timestamp,
            summary,
            results: raw.results,
            source_path: path.to_path_buf(),
            source_modified_at: None,
        })
    }
}

fn results_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^test_results_(\d{8}_\d{6})\.json$").expect("static pattern compiles")
    })
}

fn html_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^test_report_(\d{8}_\d{6})\.html$").expect("static pattern compiles")
    })
}

/// Format of the run stamp embedded in producer file names.
pub const RUN_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parse a run stamp such as `20240101_120000`.
pub fn parse_run_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, RUN_STAMP_FORMAT).ok()
}

/// The run stamp of a rendered report named `test_report_<stamp>.html`.
pub fn html_report_stamp(name: &str) -> Option<(String, NaiveDateTime)> {
    let caps = html_file_pattern().captures(name)?;
    let stamp = caps[1].to_string();
    let at = parse_run_stamp(&stamp)?;
    Some((stamp, at))
}

/// Derive a report id from its file name.
///
/// `test_results_20240101_120000.json` becomes `20240101_120000`; any other
/// file falls back to its stem.
pub fn report_id(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if let Some(caps) = results_file_pattern().captures(name) {
        return caps[1].to_string();
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Parse a run timestamp. Offsets are normalized to UTC.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parse(doc: &str) -> Result<Report, ReportError> {
        JsonReportParser.parse(
            doc.as_bytes(),
            Category::Integration,
            Path::new("/r/integration/reports/test_results_20240101_120000.json"),
        )
    }

    #[test]
    fn test_parse_producer_document() {
        let report = parse(
            r#"{
                "timestamp": "2024-01-01T12:00:00.123456",
                "test_type": "integration",
                "summary": {"total": 3, "passed": 2, "failed": 1, "pass_rate": "66.7%"},
                "results": [{"test_name": "get user", "passed": true}, {"test_name": "bad id", "passed": false}],
                "extra": {"ignored": true}
            }"#,
        )
        .unwrap();

        assert_eq!(report.id, "20240101_120000");
        assert_eq!(report.category, Category::Integration);
        assert_eq!(report.summary, Summary::new(2, 1));
        assert_eq!(report.results.len(), 2);
        assert_eq!(
            report.timestamp.date(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_missing_timestamp() {
        let err = parse(r#"{"summary": {"total": 1, "passed": 1, "failed": 0}}"#).unwrap_err();
        assert!(matches!(err, ReportError::MissingField { field: "timestamp", .. }));

        let err = parse(r#"{"timestamp": "yesterday", "summary": {"total": 1, "passed": 1, "failed": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ReportError::MissingField { field: "timestamp", .. }));
    }

    #[test]
    fn test_missing_summary() {
        let err = parse(r#"{"timestamp": "2024-01-01T12:00:00"}"#).unwrap_err();
        assert!(matches!(err, ReportError::MissingField { field: "summary", .. }));
    }

    #[test]
    fn test_invariant_violation() {
        let err = parse(r#"{"timestamp": "2024-01-01T12:00:00", "summary": {"total": 5, "passed": 2, "failed": 1}}"#)
            .unwrap_err();
        assert!(matches!(err, ReportError::InvariantViolation { .. }));
        assert!(err.to_string().contains("test_results_20240101_120000.json"));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse("{\"timestamp\": "), Err(ReportError::Malformed { .. })));
        assert!(matches!(parse("[1, 2]"), Err(ReportError::Malformed { .. })));
        assert!(matches!(
            parse(r#"{"timestamp": "2024-01-01T12:00:00", "summary": {"total": -1, "passed": 0, "failed": 0}}"#),
            Err(ReportError::Malformed { .. })
        ));
    }

    #[test]
    fn test_report_id() {
        assert_eq!(report_id(Path::new("a/test_results_20240102_030405.json")), "20240102_030405");
        assert_eq!(report_id(Path::new("a/nightly-run.json")), "nightly-run");
    }

    #[test]
    fn test_truncated_document_is_incomplete() {
        assert!(parse("").unwrap_err().is_incomplete());
        assert!(parse(r#"{"timestamp": "2024-01-01T12:00:00", "summ"#).unwrap_err().is_incomplete());
        assert!(!parse("{ not json").unwrap_err().is_incomplete());
        assert!(!parse(r#"{"timestamp": "2024-01-01T12:00:00"}"#).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_html_report_stamp() {
        let (stamp, at) = html_report_stamp("test_report_20240101_100100.html").unwrap();
        assert_eq!(stamp, "20240101_100100");
        assert_eq!(Some(at), parse_run_stamp("20240101_100100"));
        assert!(html_report_stamp("test_report_20241301_100100.html").is_none());
        assert!(html_report_stamp("test_results_20240101_100100.json").is_none());
        assert!(html_report_stamp("index.html").is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-01T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:30:00Z"), Some(expected));
        assert!(parse_timestamp("").is_none());
    }
}
