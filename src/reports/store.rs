//! File-backed report store with per-category snapshot caching.

use super::models::{Category, Report, SkippedFile};
use super::parser::{html_report_stamp, parse_run_stamp, JsonReportParser, ReportParser};

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("category {0} is not configured")]
    UnknownCategory(Category),
    #[error("report {id} not found in {category}")]
    NotFound { category: Category, id: String },
    #[error("failed to scan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("refresh task aborted: {0}")]
    RefreshAborted(String),
}

#[derive(Debug, Clone)]
enum CachedFile {
    Parsed(Arc<Report>),
    Failed(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    modified_at: SystemTime,
    file: CachedFile,
}

/// Immutable view of one category at the end of a refresh.
#[derive(Debug)]
pub struct CategorySnapshot {
    category: Category,
    generation: u64,
    entries: HashMap<PathBuf, CacheEntry>,
    /// Newest first.
    ordered: Vec<Arc<Report>>,
    skipped: Vec<SkippedFile>,
    unavailable: usize,
}

impl CategorySnapshot {
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            generation: 0,
            entries: HashMap::new(),
            ordered: Vec::new(),
            skipped: Vec::new(),
            unavailable: 0,
        }
    }

    /// Build a snapshot directly from parsed reports, bypassing the filesystem.
    #[cfg(test)]
    pub(crate) fn from_reports(category: Category, reports: Vec<Report>) -> Self {
        let mut ordered: Vec<Arc<Report>> = reports.into_iter().map(Arc::new).collect();
        ordered.sort_by(|a, b| Report::newest_first(a, b));
        Self {
            ordered,
            ..Self::empty(category)
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Bumped by every published refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Reports, newest first.
    pub fn reports(&self) -> impl Iterator<Item = &Report> + '_ {
        self.ordered.iter().map(|r| r.as_ref())
    }

    pub fn latest(&self) -> Option<&Report> {
        self.ordered.first().map(|r| r.as_ref())
    }

    /// A window of the newest-first listing. Offsets past the end yield nothing.
    pub fn page(&self, limit: usize, offset: usize) -> Vec<Report> {
        self.reports().skip(offset).take(limit).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Report> {
        self.reports().find(|r| r.id == id)
    }

    /// Files that failed to parse, as of this snapshot.
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }
}

/// Scan and parse counters, mainly for diagnostics.
#[derive(Debug, Default)]
struct Counters {
    scans: AtomicU64,
    parses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub scans: u64,
    pub parses: u64,
}

struct CategorySlot {
    category: Category,
    dir: PathBuf,
    current: RwLock<Arc<CategorySnapshot>>,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

impl CategorySlot {
    fn current(&self) -> Arc<CategorySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, next: CategorySnapshot) -> Arc<CategorySnapshot> {
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }
}

/// Thread-safe report store over `<root>/<category>/reports/*.json`.
#[derive(Clone)]
pub struct ReportStore {
    root: PathBuf,
    slots: Arc<BTreeMap<Category, Arc<CategorySlot>>>,
    parser: Arc<dyn ReportParser>,
    counters: Arc<Counters>,
}

impl ReportStore {
    /// Create a store scanning every known category.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_parser(root, &Category::ALL, Arc::new(JsonReportParser))
    }

    /// Create a store over a chosen set of categories with a custom parser.
    pub fn with_parser<P: AsRef<Path>>(
        root: P,
        categories: &[Category],
        parser: Arc<dyn ReportParser>,
    ) -> Self {
        let root = root.as_ref().to_path_buf();
        let slots = categories
            .iter()
            .map(|&category| {
                let slot = CategorySlot {
                    category,
                    dir: root.join(category.as_str()).join("reports"),
                    current: RwLock::new(Arc::new(CategorySnapshot::empty(category))),
                    refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
                };
                (category, Arc::new(slot))
            })
            .collect();

        Self {
            root,
            slots: Arc::new(slots),
            parser,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The categories this store scans, whether or not they have reports yet.
    pub fn list_categories(&self) -> Vec<Category> {
        self.slots.keys().copied().collect()
    }

    fn slot(&self, category: Category) -> Result<&Arc<CategorySlot>, StoreError> {
        self.slots
            .get(&category)
            .ok_or(StoreError::UnknownCategory(category))
    }

    /// The last published snapshot, without touching the filesystem.
    pub fn snapshot(&self, category: Category) -> Result<Arc<CategorySnapshot>, StoreError> {
        Ok(self.slot(category)?.current())
    }

    /// Rescan a category and publish a new snapshot.
    ///
    /// Only one scan per category runs at a time. A caller that waited while
    /// another scan completed gets that scan's snapshot instead of starting its
    /// own. The scan owns the refresh guard, so dropping this future does not
    /// cancel it.
    pub async fn refresh(&self, category: Category) -> Result<Arc<CategorySnapshot>, StoreError> {
        let slot = Arc::clone(self.slot(category)?);
        let seen = slot.current().generation;

        let guard = Arc::clone(&slot.refresh_lock).lock_owned().await;
        let previous = slot.current();
        if previous.generation != seen {
            tracing::trace!("Reusing {} snapshot from concurrent refresh", category);
            return Ok(previous);
        }

        let parser = Arc::clone(&self.parser);
        let counters = Arc::clone(&self.counters);

        let task = tokio::task::spawn_blocking(move || -> Result<Arc<CategorySnapshot>, StoreError> {
            let _guard = guard;
            let next = scan_category(&slot.dir, slot.category, &previous, parser.as_ref(), &counters)?;
            Ok(slot.publish(next))
        });

        task.await
            .map_err(|e| StoreError::RefreshAborted(e.to_string()))?
    }

    /// Newest-first window of the current snapshot.
    pub fn list_reports(
        &self,
        category: Category,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Report>, StoreError> {
        Ok(self.snapshot(category)?.page(limit, offset))
    }

    pub fn get_report(&self, category: Category, id: &str) -> Result<Report, StoreError> {
        self.snapshot(category)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                category,
                id: id.to_string(),
            })
    }

    /// Locate the rendered HTML written next to a report's JSON file.
    ///
    /// The producer stamps the HTML with its own clock read, a little after the
    /// JSON. Without an exact `test_report_<id>.html`, the earliest later stamp
    /// within [`HTML_STAMP_SKEW_SECS`] is used, unless another report owns it.
    pub async fn html_path(&self, category: Category, id: &str) -> Result<PathBuf, StoreError> {
        let not_found = || StoreError::NotFound {
            category,
            id: id.to_string(),
        };
        let snapshot = self.snapshot(category)?;
        let report = snapshot.get(id).ok_or_else(not_found)?;

        let exact = html_artifact_path(report);
        if is_regular_file(&exact).await {
            return Ok(exact);
        }

        nearest_html_artifact(&snapshot, report)
            .await
            .ok_or_else(not_found)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            scans: self.counters.scans.load(Ordering::Relaxed),
            parses: self.counters.parses.load(Ordering::Relaxed),
        }
    }
}

/// `test_report_<id>.html` in the same directory as the JSON report.
pub fn html_artifact_path(report: &Report) -> PathBuf {
    let dir = report.source_path.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("test_report_{}.html", report.id))
}

/// How many seconds a rendered report's stamp may trail its JSON stamp.
pub const HTML_STAMP_SKEW_SECS: i64 = 5;

async fn is_regular_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
}

async fn nearest_html_artifact(snapshot: &CategorySnapshot, report: &Report) -> Option<PathBuf> {
    let run = parse_run_stamp(&report.id)?;
    let dir = report.source_path.parent()?;
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;

    let mut best: Option<(i64, PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some((stamp, at)) = name.to_str().and_then(html_report_stamp) else {
            continue;
        };
        let skew = (at - run).num_seconds();
        if !(0..=HTML_STAMP_SKEW_SECS).contains(&skew) || snapshot.get(&stamp).is_some() {
            continue;
        }
        let closer = best.as_ref().map_or(true, |(b, _)| skew < *b);
        if closer && is_regular_file(&entry.path()).await {
            best = Some((skew, entry.path()));
        }
    }

    best.map(|(_, path)| path)
}

fn is_report_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Walk one category directory, reusing entries whose mtime is unchanged.
fn scan_category(
    dir: &Path,
    category: Category,
    previous: &CategorySnapshot,
    parser: &dyn ReportParser,
    counters: &Counters,
) -> Result<CategorySnapshot, StoreError> {
    counters.scans.fetch_add(1, Ordering::Relaxed);

    let mut next = CategorySnapshot::empty(category);
    next.generation = previous.generation + 1;

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("No report directory for {} at {}", category, dir.display());
            return Ok(next);
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut loaded = HashSet::new();
    for dir_entry in read_dir {
        let path = match dir_entry {
            Ok(e) => e.path(),
            Err(e) => {
                tracing::debug!("Failed to read entry in {}: {}", dir.display(), e);
                next.unavailable += 1;
                continue;
            }
        };
        if !is_report_file(&path) {
            continue;
        }

        let modified_at = match std::fs::metadata(&path).and_then(|m| {
            if m.is_file() {
                m.modified()
            } else {
                Err(std::io::Error::new(ErrorKind::Other, "not a regular file"))
            }
        }) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Report {} not available yet: {}", path.display(), e);
                next.unavailable += 1;
                continue;
            }
        };

        let entry = match previous.entries.get(&path) {
            Some(cached) if cached.modified_at == modified_at => cached.clone(),
            _ => match load_file(&path, category, modified_at, parser, counters) {
                Some(entry) => {
                    loaded.insert(path.clone());
                    entry
                }
                None => {
                    next.unavailable += 1;
                    continue;
                }
            },
        };

        match &entry.file {
            CachedFile::Parsed(report) => next.ordered.push(Arc::clone(report)),
            CachedFile::Failed(reason) => next.skipped.push(SkippedFile {
                path: path.clone(),
                reason: reason.clone(),
            }),
        }
        next.entries.insert(path, entry);
    }

    drop_duplicate_ids(&mut next, &loaded);
    next.ordered.sort_by(|a, b| Report::newest_first(a, b));
    next.skipped.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        "Refreshed {}: {} reports, {} skipped, {} unavailable",
        category,
        next.ordered.len(),
        next.skipped.len(),
        next.unavailable
    );

    Ok(next)
}

/// Keep one report per id. A producer-named `test_results_<id>.json` wins over
/// other names, then the smaller path. Losers are listed as skipped and warned
/// about once, when first loaded.
fn drop_duplicate_ids(next: &mut CategorySnapshot, loaded: &HashSet<PathBuf>) {
    fn rank(report: &Report) -> (bool, &Path) {
        let producer_named = report
            .source_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == format!("test_results_{}.json", report.id));
        (!producer_named, report.source_path.as_path())
    }

    let mut kept: HashMap<String, Arc<Report>> = HashMap::with_capacity(next.ordered.len());
    let mut dropped = Vec::new();
    for report in next.ordered.drain(..) {
        match kept.entry(report.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(report);
            }
            Entry::Occupied(mut slot) => {
                if rank(&report) < rank(slot.get()) {
                    dropped.push(slot.insert(report));
                } else {
                    dropped.push(report);
                }
            }
        }
    }
    next.ordered = kept.into_values().collect();

    for report in dropped {
        let winner = next
            .ordered
            .iter()
            .find(|r| r.id == report.id)
            .map(|r| r.source_path.display().to_string())
            .unwrap_or_default();
        if loaded.contains(&report.source_path) {
            tracing::warn!(
                "Skipping report {}: id {} already provided by {}",
                report.source_path.display(),
                report.id,
                winner
            );
        }
        next.skipped.push(SkippedFile {
            path: report.source_path.clone(),
            reason: format!("duplicate report id {} (kept {})", report.id, winner),
        });
    }
}

/// Read and parse one file.
///
/// `None` means the file is not available yet: unreadable, empty, or cut off
/// mid-document. Nothing is cached for it, so the next refresh retries.
fn load_file(
    path: &Path,
    category: Category,
    modified_at: SystemTime,
    parser: &dyn ReportParser,
    counters: &Counters,
) -> Option<CacheEntry> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("Report {} not readable yet: {}", path.display(), e);
            return None;
        }
    };

    if bytes.is_empty() {
        tracing::debug!("Report {} is empty, still being written", path.display());
        return None;
    }

    counters.parses.fetch_add(1, Ordering::Relaxed);
    let file = match parser.parse(&bytes, category, path) {
        Ok(mut report) => {
            report.source_modified_at = Some(modified_at);
            CachedFile::Parsed(Arc::new(report))
        }
        Err(e) if e.is_incomplete() => {
            tracing::debug!("Report {} is incomplete, retrying later: {}", path.display(), e);
            return None;
        }
        Err(e) => {
            tracing::warn!("Skipping report {}: {}", path.display(), e);
            CachedFile::Failed(e.to_string())
        }
    };

    Some(CacheEntry { modified_at, file })
}
