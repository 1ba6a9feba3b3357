//! Trend-chart history.

use crate::reports::{CategorySnapshot, HistoryPoint, Report};

use chrono::NaiveDateTime;

/// Chart label format, e.g. `01/31 14:05`.
pub const HISTORY_LABEL_FORMAT: &str = "%m/%d %H:%M";

pub fn format_label(ts: &NaiveDateTime) -> String {
    ts.format(HISTORY_LABEL_FORMAT).to_string()
}

impl From<&Report> for HistoryPoint {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            timestamp: report.timestamp,
            formatted_time: format_label(&report.timestamp),
            summary: report.summary,
        }
    }
}

/// The `limit` most recent runs of a category, oldest first for charting.
pub fn history(snapshot: &CategorySnapshot, limit: usize) -> Vec<HistoryPoint> {
    let mut points: Vec<HistoryPoint> = snapshot.reports().take(limit).map(HistoryPoint::from).collect();
    points.reverse();
    points
}
