use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use testpulse::config::ServerConfig;
use testpulse::reports::{Category, JsonReportParser, Report, ReportError, ReportParser, ReportStore};
use testpulse::service::{PageQuery, QueryService};

struct SlowParser {
    calls: AtomicUsize,
    delay: Duration,
}

impl ReportParser for SlowParser {
    fn parse(&self, bytes: &[u8], category: Category, path: &Path) -> Result<Report, ReportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        JsonReportParser.parse(bytes, category, path)
    }
}

fn write_run(root: &Path, category: Category, stamp: &str, iso: &str, passed: u64, failed: u64) {
    let dir = root.join(category.as_str()).join("reports");
    std::fs::create_dir_all(&dir).unwrap();
    let body = serde_json::json!({
        "timestamp": iso,
        "test_type": category.as_str(),
        "summary": {"total": passed + failed, "passed": passed, "failed": failed},
        "results": [{"test_name": "smoke", "passed": failed == 0}],
    });
    std::fs::write(dir.join(format!("test_results_{}.json", stamp)), body.to_string()).unwrap();
}

fn service(root: &Path, parser: Arc<SlowParser>, timeout: Duration) -> (QueryService, ReportStore) {
    let store = ReportStore::with_parser(root, &Category::ALL, parser);
    let cfg = ServerConfig {
        reports_root: root.to_path_buf(),
        refresh_timeout: timeout,
        ..Default::default()
    };
    (QueryService::new(store.clone(), &cfg), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_listings_scan_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_run(tmp.path(), Category::Integration, "20240101_100000", "2024-01-01T10:00:00", 2, 1);
    write_run(tmp.path(), Category::Integration, "20240102_100000", "2024-01-02T10:00:00", 3, 0);

    let parser = Arc::new(SlowParser {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(150),
    });
    let (svc, store) = service(tmp.path(), parser.clone(), Duration::from_secs(10));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.list(Category::Integration, &PageQuery::default()).await
        }));
    }

    for handle in handles {
        let page = handle.await.unwrap().unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.reports[0].id, "20240102_100000");
    }

    assert_eq!(store.stats().scans, 1);
    assert_eq!(parser.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_query_serves_previous_snapshot() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_run(tmp.path(), Category::System, "20240101_100000", "2024-01-01T10:00:00", 1, 0);

    let parser = Arc::new(SlowParser {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(300),
    });
    let (svc, store) = service(tmp.path(), parser, Duration::from_millis(30));

    // First query times out against an empty cache but still answers.
    let page = svc.list(Category::System, &PageQuery::default()).await.unwrap();
    assert_eq!(page.total, 0);

    // The abandoned refresh completes and is visible afterwards.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let snapshot = store.snapshot(Category::System).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(store.stats().scans, 1);
}

#[tokio::test]
async fn test_overall_stats_follow_latest_runs() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_run(tmp.path(), Category::Integration, "20240101_100000", "2024-01-01T10:00:00", 0, 10);
    write_run(tmp.path(), Category::Integration, "20240102_100000", "2024-01-02T10:00:00", 8, 2);
    write_run(tmp.path(), Category::Regression, "20240102_110000", "2024-01-02T11:00:00", 5, 0);

    let parser = Arc::new(SlowParser {
        calls: AtomicUsize::new(0),
        delay: Duration::ZERO,
    });
    let (svc, _) = service(tmp.path(), parser, Duration::from_secs(5));

    let stats = svc.stats().await.overall_summary;
    assert_eq!(stats.summary.total, 15);
    assert_eq!(stats.summary.passed, 13);
    assert_eq!(stats.summary.failed, 2);
    assert_eq!(stats.summary.pass_rate(), "86.67%");
}
