//! Orchestration engine tests against in-memory catalog and fetcher fakes.
//!
//! The fake fetcher writes the artifact URL as the file body, so every test
//! can tell which catalog record ended up in which file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;

use apkpull::catalog::CatalogClient;
use apkpull::download::{
    ArtifactFetcher, DownloadOrchestrator, NoopSink, OrchestratorSettings, ProgressRegistry,
    ProgressSink, RetryPolicy,
};
use apkpull::error::{ErrorKind, FetchError};
use apkpull::types::{ArtifactType, PackageJob, ProgressEvent, VersionRecord};

// =============================================================================
// Fakes
// =============================================================================

fn record(name: &str, url: &str) -> VersionRecord {
    VersionRecord {
        version_name: name.to_string(),
        version_code: name.replace('.', ""),
        artifact_type: ArtifactType::Apk,
        artifact_url: url.to_string(),
    }
}

#[derive(Default)]
struct FakeCatalog {
    packages: HashMap<String, Vec<VersionRecord>>,
    calls: AtomicUsize,
}

impl FakeCatalog {
    fn with(mut self, package: &str, versions: Vec<VersionRecord>) -> Self {
        self.packages.insert(package.to_string(), versions);
        self
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn fetch_versions(&self, package_id: &str) -> Result<Vec<VersionRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.packages
            .get(package_id)
            .cloned()
            .ok_or_else(|| FetchError::Catalog {
                package: package_id.to_string(),
                message: "invalid status code: 404".to_string(),
                status: Some(404),
            })
    }
}

#[derive(Debug, Clone)]
struct Interval {
    filename: String,
    start: Instant,
    end: Instant,
}

#[derive(Default)]
struct FakeFetcher {
    /// Per-URL transfer time
    delays: HashMap<String, Duration>,
    /// Per-URL number of leading attempts that fail
    failures: HashMap<String, usize>,
    attempts: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    intervals: Mutex<Vec<Interval>>,
}

impl FakeFetcher {
    fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    fn failing(mut self, url: &str, times: usize) -> Self {
        self.failures.insert(url.to_string(), times);
        self
    }

    fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(
        &self,
        source_url: &str,
        destination_dir: &Path,
        filename: &str,
        progress: &dyn ProgressSink,
    ) -> Result<u64, FetchError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(source_url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let path = destination_dir.join(filename);
        if path.exists() {
            return Err(FetchError::AlreadyExists { path });
        }

        let start = Instant::now();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(source_url) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = if attempt <= self.failures.get(source_url).copied().unwrap_or(0) {
            Err(FetchError::Transfer {
                url: source_url.to_string(),
                message: "invalid status code: 503".to_string(),
                status: Some(503),
            })
        } else {
            std::fs::write(&path, source_url)
                .map_err(|e| FetchError::io(&path, e))
                .map(|()| {
                    let len = source_url.len() as i64;
                    progress.report(&ProgressEvent {
                        filename: filename.to_string(),
                        bytes_downloaded: len,
                        bytes_total: len,
                    });
                    source_url.len() as u64
                })
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.intervals.lock().unwrap().push(Interval {
            filename: filename.to_string(),
            start,
            end: Instant::now(),
        });
        result
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10))
}

fn orchestrator(
    catalog: FakeCatalog,
    fetcher: Arc<FakeFetcher>,
    settings: OrchestratorSettings,
) -> DownloadOrchestrator {
    DownloadOrchestrator::new(Arc::new(catalog), fetcher, Arc::new(NoopSink), settings)
}

fn many_packages(n: usize) -> (FakeCatalog, Vec<PackageJob>) {
    let mut catalog = FakeCatalog::default();
    let mut jobs = Vec::new();
    for i in 0..n {
        let package = format!("com.example.app{}", i);
        catalog = catalog.with(&package, vec![record("1.0", &format!("u{}", i))]);
        jobs.push(PackageJob::latest(package));
    }
    (catalog, jobs)
}

// =============================================================================
// Version selection
// =============================================================================

#[tokio::test]
async fn test_latest_version_is_first_record() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with(
        "com.example.app",
        vec![record("2.0", "u2"), record("1.0", "u1")],
    );
    let fetcher = Arc::new(FakeFetcher::default());
    let orch = orchestrator(catalog, fetcher.clone(), OrchestratorSettings::new(dir.path()));

    let outcomes = orch.run_all(vec![PackageJob::latest("com.example.app")]).await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success, "{:?}", outcomes[0].error);
    assert_eq!(outcomes[0].filename, "com.example.app.apk");
    let body = std::fs::read_to_string(dir.path().join("com.example.app.apk")).unwrap();
    assert_eq!(body, "u2");
    assert_eq!(fetcher.attempts("u1"), 0);
}

#[tokio::test]
async fn test_pinned_version_names_the_file() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with(
        "com.example.app",
        vec![record("2.0", "u2"), record("1.0", "u1")],
    );
    let orch = orchestrator(
        catalog,
        Arc::new(FakeFetcher::default()),
        OrchestratorSettings::new(dir.path()),
    );

    let completed = orch
        .download_one(&PackageJob::pinned("com.example.app", "1.0"))
        .await
        .unwrap();

    assert_eq!(completed.artifact.destination_filename, "com.example.app@1.0.apk");
    assert_eq!(completed.path, dir.path().join("com.example.app@1.0.apk"));
    assert_eq!(std::fs::read_to_string(&completed.path).unwrap(), "u1");
    assert_eq!(completed.bytes_written, 2);
}

#[tokio::test]
async fn test_missing_version_creates_no_file() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with("com.example.app", vec![record("2.0", "u2")]);
    let fetcher = Arc::new(FakeFetcher::default());
    let orch = orchestrator(catalog, fetcher.clone(), OrchestratorSettings::new(dir.path()));

    let outcomes = orch
        .run_all(vec![PackageJob::pinned("com.example.app", "3.0")])
        .await;

    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].filename, "com.example.app@3.0");
    assert_eq!(
        outcomes[0].error.as_ref().map(FetchError::kind),
        Some(ErrorKind::VersionNotFound)
    );
    assert_eq!(fetcher.total_attempts(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_catalog_failure_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::default());
    let orch = DownloadOrchestrator::new(
        catalog.clone(),
        Arc::new(FakeFetcher::default()),
        Arc::new(NoopSink),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry()),
    );

    let err = orch
        .download_one(&PackageJob::latest("com.unknown"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Catalog);
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Concurrency and ordering
// =============================================================================

#[tokio::test]
async fn test_parallelism_bounds_concurrent_transfers() {
    let dir = TempDir::new().unwrap();
    let (catalog, jobs) = many_packages(10);
    let mut fetcher = FakeFetcher::default();
    for i in 0..10 {
        fetcher = fetcher.delay(&format!("u{}", i), Duration::from_millis(50));
    }
    let fetcher = Arc::new(fetcher);
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_parallelism(3),
    );

    let outcomes = orch.run_all(jobs).await;

    assert!(outcomes.iter().all(|o| o.success));
    let peak = fetcher.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {} exceeded 3", peak);
    assert!(peak >= 2, "jobs never overlapped (peak {})", peak);
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default()
        .with("com.a", vec![record("1", "ua")])
        .with("com.b", vec![record("1", "ub")])
        .with("com.c", vec![record("1", "uc")]);
    let fetcher = Arc::new(FakeFetcher::default().delay("ub", Duration::from_millis(200)));
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_parallelism(3),
    );

    let outcomes = orch
        .run_all(vec![
            PackageJob::latest("com.a"),
            PackageJob::latest("com.b"),
            PackageJob::latest("com.c"),
        ])
        .await;

    let names: Vec<_> = outcomes.iter().map(|o| o.filename.as_str()).collect();
    assert_eq!(names, vec!["com.a.apk", "com.b.apk", "com.c.apk"]);
    // B finished last even though it is reported second
    assert!(outcomes[1].finished_at >= outcomes[2].finished_at);
}

#[tokio::test]
async fn test_parallelism_one_serializes_jobs() {
    let dir = TempDir::new().unwrap();
    let (catalog, jobs) = many_packages(4);
    let mut fetcher = FakeFetcher::default();
    for i in 0..4 {
        fetcher = fetcher.delay(&format!("u{}", i), Duration::from_millis(20));
    }
    let fetcher = Arc::new(fetcher);
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_parallelism(1),
    );

    orch.run_all(jobs).await;

    let mut intervals = fetcher.intervals.lock().unwrap().clone();
    assert_eq!(intervals.len(), 4);
    intervals.sort_by_key(|i| i.start);
    for pair in intervals.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "{} overlapped {}",
            pair[0].filename,
            pair[1].filename
        );
    }
    assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_inter_job_delay_paces_admitted_jobs() {
    let dir = TempDir::new().unwrap();
    let (catalog, jobs) = many_packages(3);
    let orch = orchestrator(
        catalog,
        Arc::new(FakeFetcher::default()),
        OrchestratorSettings::new(dir.path())
            .with_parallelism(1)
            .with_inter_job_delay(Duration::from_millis(60)),
    );

    let started = Instant::now();
    let outcomes = orch.run_all(jobs).await;

    assert!(outcomes.iter().all(|o| o.success));
    assert!(started.elapsed() >= Duration::from_millis(180));
}

#[tokio::test]
async fn test_failures_do_not_cancel_siblings() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default()
        .with("com.a", vec![record("1", "ua")])
        .with("com.b", vec![record("1", "ub")]);
    let fetcher = Arc::new(FakeFetcher::default().failing("ua", usize::MAX));
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry()),
    );

    let outcomes = orch
        .run_all(vec![
            PackageJob::latest("com.a"),
            PackageJob::latest("com.missing"),
            PackageJob::latest("com.b"),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(!outcomes[0].success);
    assert!(!outcomes[1].success);
    assert_eq!(outcomes[1].filename, "com.missing");
    assert!(outcomes[2].success);
    assert!(dir.path().join("com.b.apk").exists());
}

#[tokio::test]
async fn test_empty_batch() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        FakeCatalog::default(),
        Arc::new(FakeFetcher::default()),
        OrchestratorSettings::new(dir.path()),
    );
    assert!(orch.run_all(Vec::new()).await.is_empty());
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_retry_bound_is_three_attempts() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with("com.example.app", vec![record("1.0", "u1")]);
    let fetcher = Arc::new(FakeFetcher::default().failing("u1", usize::MAX));
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry()),
    );

    let err = orch
        .download_one(&PackageJob::latest("com.example.app"))
        .await
        .unwrap_err();

    assert_eq!(fetcher.attempts("u1"), 3);
    match err {
        FetchError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.kind(), ErrorKind::Transfer);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with("com.example.app", vec![record("1.0", "u1")]);
    let fetcher = Arc::new(FakeFetcher::default().failing("u1", 2));
    let registry = Arc::new(ProgressRegistry::silent());
    let orch = DownloadOrchestrator::new(
        Arc::new(catalog),
        fetcher.clone(),
        registry.clone(),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry()),
    );

    let outcomes = orch.run_all(vec![PackageJob::latest("com.example.app")]).await;

    assert!(outcomes[0].success);
    assert_eq!(fetcher.attempts("u1"), 3);
    let snapshot = registry.snapshot("com.example.app.apk").unwrap();
    assert!(snapshot.is_complete());
}

#[tokio::test]
async fn test_existing_file_is_never_overwritten() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("com.example.app.apk");
    std::fs::write(&existing, "original").unwrap();

    let catalog = FakeCatalog::default().with("com.example.app", vec![record("2.0", "u2")]);
    let fetcher = Arc::new(FakeFetcher::default());
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry()),
    );

    let outcomes = orch.run_all(vec![PackageJob::latest("com.example.app")]).await;

    assert!(!outcomes[0].success);
    assert_eq!(
        outcomes[0].error.as_ref().map(FetchError::kind),
        Some(ErrorKind::AlreadyExists)
    );
    // Fails fast: one attempt, no retry
    assert_eq!(fetcher.attempts("u2"), 1);
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "original");
}

#[tokio::test]
async fn test_retry_everything_retries_existing_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("com.example.app.apk"), "original").unwrap();

    let catalog = FakeCatalog::default().with("com.example.app", vec![record("2.0", "u2")]);
    let fetcher = Arc::new(FakeFetcher::default());
    let orch = orchestrator(
        catalog,
        fetcher.clone(),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry().with_retry_everything(true)),
    );

    let err = orch
        .download_one(&PackageJob::latest("com.example.app"))
        .await
        .unwrap_err();

    assert_eq!(fetcher.attempts("u2"), 3);
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
    assert_eq!(err.root().kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_run_one_failure_reports_resolved_filename() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("com.example.app.apk"), "original").unwrap();

    let catalog = FakeCatalog::default().with("com.example.app", vec![record("2.0", "u2")]);
    let orch = orchestrator(
        catalog,
        Arc::new(FakeFetcher::default()),
        OrchestratorSettings::new(dir.path()).with_retry(fast_retry()),
    );

    let outcome = orch.run_one(PackageJob::latest("com.example.app")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.filename, "com.example.app.apk");
    assert_eq!(outcome.report().error_kind, Some(ErrorKind::AlreadyExists));

    // Resolution failures still fall back to the job label
    let outcome = orch.run_one(PackageJob::pinned("com.example.app", "9.9")).await;
    assert_eq!(outcome.filename, "com.example.app@9.9");
}
