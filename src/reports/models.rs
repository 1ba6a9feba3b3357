//! Report model types.

use chrono::NaiveDateTime;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

/// A fixed test-type partition of the report tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Integration,
    System,
    Component,
    Regression,
    Sanity,
}

impl Category {
    /// Every category, in scan order.
    pub const ALL: [Category; 5] = [
        Category::Integration,
        Category::System,
        Category::Component,
        Category::Regression,
        Category::Sanity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Integration => "integration",
            Category::System => "system",
            Category::Component => "component",
            Category::Regression => "regression",
            Category::Sanity => "sanity",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Pass/fail counts for one run, or a sum of runs.
///
/// `pass_rate` is never stored; it is derived on serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Summary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
}

impl Summary {
    pub fn new(passed: u64, failed: u64) -> Self {
        Self {
            total: passed + failed,
            passed,
            failed,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.passed.checked_add(self.failed) == Some(self.total)
    }

    /// Percentage of passed tests, 0.0 when nothing ran.
    pub fn pass_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 * 100.0 / self.total as f64
        }
    }

    /// Pass rate with two decimals, e.g. `"86.67%"`.
    pub fn pass_rate(&self) -> String {
        format!("{:.2}%", self.pass_ratio())
    }

    /// Accumulate another summary. Counts saturate at `u64::MAX`.
    pub fn add(&mut self, other: &Summary) {
        self.total = self.total.saturating_add(other.total);
        self.passed = self.passed.saturating_add(other.passed);
        self.failed = self.failed.saturating_add(other.failed);
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Summary", 4)?;
        s.serialize_field("total", &self.total)?;
        s.serialize_field("passed", &self.passed)?;
        s.serialize_field("failed", &self.failed)?;
        s.serialize_field("pass_rate", &self.pass_rate())?;
        s.end()
    }
}

/// One parsed test-execution run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: String,
    pub category: Category,
    pub timestamp: NaiveDateTime,
    pub summary: Summary,
    /// Individual outcomes, passed through as written by the producer.
    pub results: Vec<serde_json::Value>,
    #[serde(skip)]
    pub source_path: PathBuf,
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl Report {
    /// Ordering used by every listing: newest first, ties broken by id descending.
    pub fn newest_first(a: &Report, b: &Report) -> std::cmp::Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// A file that was seen during a refresh but could not be turned into a report.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Per-category view served by `/api/reports/summary`.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub total_reports: usize,
    pub latest: Option<Report>,
    pub has_reports: bool,
}

/// Totals across the latest report of every category that has one.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    #[serde(flatten)]
    pub summary: Summary,
    pub categories_with_reports: usize,
}

/// One report projected onto the time axis of a trend chart.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub formatted_time: String,
    pub summary: Summary,
}
