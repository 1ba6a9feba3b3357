//! Derived views over report snapshots.
//!
//! Everything here is a pure function of the snapshots it is handed, so one
//! query always aggregates a single consistent state per category.

mod history;

pub use history::*;

use crate::reports::{CategorySnapshot, CategorySummary, GlobalStats, Report, Summary};

use std::sync::Arc;

/// Card data for one category.
pub fn category_summary(snapshot: &CategorySnapshot) -> CategorySummary {
    let total_reports = snapshot.len();
    CategorySummary {
        category: snapshot.category(),
        total_reports,
        latest: snapshot.latest().cloned(),
        has_reports: total_reports > 0,
    }
}

/// Overall statistics: the sum of the latest report of every category that has one.
///
/// Older runs are deliberately not counted, matching the per-category cards.
pub fn global_stats(snapshots: &[Arc<CategorySnapshot>]) -> GlobalStats {
    let mut summary = Summary::default();
    let mut categories_with_reports = 0;

    for latest in snapshots.iter().filter_map(|s| s.latest()) {
        summary.add(&latest.summary);
        categories_with_reports += 1;
    }

    GlobalStats {
        summary,
        categories_with_reports,
    }
}

/// The `limit` most recent reports across all categories, newest first.
pub fn recent_across(snapshots: &[Arc<CategorySnapshot>], limit: usize) -> Vec<Report> {
    let mut merged: Vec<&Report> = snapshots
        .iter()
        .flat_map(|s| s.reports().take(limit))
        .collect();

    merged.sort_by(|a, b| {
        Report::newest_first(a, b).then_with(|| a.category.cmp(&b.category))
    });
    merged.into_iter().take(limit).cloned().collect()
}
