//! End-to-end audit runs against in-memory collaborators.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use issue_audit::error::{AppError, Result};
use issue_audit::models::{
    AuditConfiguration, AuditMode, Domain, IssueRecord, Settings, StoryMetadata,
};
use issue_audit::pipeline::{AuditOrchestrator, AuditOutcome, ScanSource};
use issue_audit::services::{IssueScanner, ResponseMeta, ScanPage, StoryCatalog};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FRONTEND_REPO: &str = "org/web";
const BACKEND_REPO: &str = "org/api";

#[derive(Default)]
struct FakeScanner {
    frontend: Vec<IssueRecord>,
    backend: Vec<IssueRecord>,
    denied: HashSet<String>,
    transient_failures: Mutex<u32>,
    scans: AtomicU32,
}

impl FakeScanner {
    fn with_issues(frontend: &[&str], backend: &[&str]) -> Self {
        let records = |titles: &[&str]| -> Vec<IssueRecord> {
            titles
                .iter()
                .enumerate()
                .map(|(i, t)| IssueRecord::new(i as u64 + 1, *t, format!("https://x/{i}")))
                .collect()
        };
        Self {
            frontend: records(frontend),
            backend: records(backend),
            ..Self::default()
        }
    }

    fn scans(&self) -> u32 {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IssueScanner for FakeScanner {
    async fn scan_page(
        &self,
        repository: &str,
        _title_prefix: &str,
        _page: u32,
    ) -> Result<ScanPage> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.transient_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out",
                )));
            }
        }
        let issues = match repository {
            FRONTEND_REPO => self.frontend.clone(),
            BACKEND_REPO => self.backend.clone(),
            _ => Vec::new(),
        };
        Ok(ScanPage {
            issues,
            response: ResponseMeta::ok(),
            has_more: false,
        })
    }

    async fn test_access(&self, repository: &str) -> Result<bool> {
        Ok(!self.denied.contains(repository))
    }
}

struct MemoryCatalog {
    processed: Vec<u32>,
    metadata: BTreeMap<u32, StoryMetadata>,
}

impl MemoryCatalog {
    fn new(processed: &[u32], titles: &[(u32, &str)]) -> Self {
        Self {
            processed: processed.to_vec(),
            metadata: titles
                .iter()
                .map(|(n, t)| (*n, StoryMetadata::new(*n, *t, format!("https://stories/{n}"))))
                .collect(),
        }
    }
}

#[async_trait]
impl StoryCatalog for MemoryCatalog {
    async fn processed_stories(&self) -> Result<Vec<u32>> {
        Ok(self.processed.clone())
    }

    async fn story_metadata(&self) -> Result<BTreeMap<u32, StoryMetadata>> {
        Ok(self.metadata.clone())
    }
}

struct Harness {
    dir: TempDir,
    scanner: Arc<FakeScanner>,
    orchestrator: AuditOrchestrator,
}

fn harness(scanner: FakeScanner, catalog: MemoryCatalog) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.targets.frontend_repository = FRONTEND_REPO.into();
    settings.targets.backend_repository = BACKEND_REPO.into();
    settings.targets.story_repository = "org/stories".into();
    settings.cache.directory = dir.path().join("cache");
    settings.rate_limit.batch_delay_ms = 0;
    settings.retry.delay_ms = 0;

    let scanner = Arc::new(scanner);
    let orchestrator = AuditOrchestrator::new(
        settings,
        scanner.clone(),
        Arc::new(catalog),
        CancellationToken::new(),
    );
    Harness {
        dir,
        scanner,
        orchestrator,
    }
}

fn config(h: &Harness) -> issue_audit::models::AuditConfigurationBuilder {
    AuditConfiguration::builder()
        .github_token("ghp_test")
        .output_directory(h.dir.path().join("out"))
        .rate_limit_delay_ms(0)
}

fn scenario_a() -> Harness {
    harness(
        FakeScanner::with_issues(
            &["[FRONTEND] [STORY] Foo"],
            &["[BACKEND] [STORY] Foo", "[BACKEND] [STORY] Bar"],
        ),
        MemoryCatalog::new(&[101, 102, 103], &[(101, "Foo"), (102, "Bar")]),
    )
}

#[tokio::test]
async fn test_reports_missing_frontend_issues() {
    let h = scenario_a();
    let run = h.orchestrator.run(&config(&h).build().unwrap()).await.unwrap();

    let frontend: Vec<(u32, &str)> = run
        .result
        .missing_frontend
        .iter()
        .map(|m| (m.story_number, m.story_title.as_str()))
        .collect();
    assert_eq!(
        frontend,
        vec![(102, "Bar"), (103, "Story #103 (metadata not found)")]
    );
    assert_eq!(
        run.result.missing_frontend[1].story_url,
        "https://github.com/org/stories/issues/103"
    );

    let backend: Vec<u32> = run.result.missing_backend.iter().map(|m| m.story_number).collect();
    assert_eq!(backend, vec![103]);
    assert_eq!(
        run.outcome,
        AuditOutcome::MissingIssues {
            frontend: 2,
            backend: 1
        }
    );
    assert_eq!(run.result.statistics.processed_count, 3);
    assert!(h.dir.path().join("out/last-audit.json").exists());
}

#[tokio::test]
async fn test_clean_audit_is_complete() {
    let h = harness(
        FakeScanner::with_issues(&["[FRONTEND] [STORY] Foo"], &["[BACKEND] [STORY] Foo"]),
        MemoryCatalog::new(&[1], &[(1, "[STORY] Foo")]),
    );
    let run = h.orchestrator.run(&config(&h).build().unwrap()).await.unwrap();
    assert_eq!(run.outcome, AuditOutcome::Complete);
    assert_eq!(run.result.statistics.overall_completion(), 100.0);
}

#[tokio::test]
async fn test_second_run_reuses_cache() {
    let h = scenario_a();
    let cfg = config(&h).build().unwrap();

    let first = h.orchestrator.run(&cfg).await.unwrap();
    assert_eq!(first.source(Domain::Frontend), Some(ScanSource::Remote));
    assert_eq!(h.scanner.scans(), 2);

    let second = h.orchestrator.run(&cfg).await.unwrap();
    assert_eq!(second.source(Domain::Frontend), Some(ScanSource::Cache));
    assert_eq!(second.source(Domain::Backend), Some(ScanSource::Cache));
    assert_eq!(h.scanner.scans(), 2);
    assert_eq!(first.result.missing_frontend, second.result.missing_frontend);

    let stats = h.orchestrator.cache().statistics().await.unwrap();
    assert_eq!(stats.file_count, 2);
}

#[tokio::test]
async fn test_no_cache_scans_again() {
    let h = scenario_a();
    h.orchestrator.run(&config(&h).build().unwrap()).await.unwrap();

    let run = h
        .orchestrator
        .run(&config(&h).use_cache(false).build().unwrap())
        .await
        .unwrap();
    assert_eq!(run.source(Domain::Backend), Some(ScanSource::Remote));
    assert_eq!(h.scanner.scans(), 4);
}

#[tokio::test]
async fn test_transient_scan_failures_are_retried() {
    let scanner = FakeScanner::with_issues(&["[FRONTEND] [STORY] Foo"], &[]);
    *scanner.transient_failures.lock().unwrap() = 2;
    let h = harness(scanner, MemoryCatalog::new(&[1], &[(1, "Foo")]));

    let run = h.orchestrator.run(&config(&h).build().unwrap()).await.unwrap();
    assert!(run.result.missing_frontend.is_empty());
    assert_eq!(h.scanner.scans(), 4);
}

#[tokio::test]
async fn test_persistent_failure_surfaces_scan_error() {
    let scanner = FakeScanner::with_issues(&[], &[]);
    *scanner.transient_failures.lock().unwrap() = 10;
    let h = harness(scanner, MemoryCatalog::new(&[1], &[(1, "Foo")]));

    let err = h
        .orchestrator
        .run(&config(&h).build().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Scan { attempts: 3, .. }));
    assert_eq!(err.class(), "TransientScanError");
}

#[tokio::test]
async fn test_access_failure_aborts_before_scanning() {
    let mut scanner = FakeScanner::with_issues(&[], &[]);
    scanner.denied.insert(BACKEND_REPO.to_string());
    let h = harness(scanner, MemoryCatalog::new(&[1], &[(1, "Foo")]));

    let err = h
        .orchestrator
        .run(&config(&h).build().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::RepositoryAccess { ref repository } if repository == BACKEND_REPO
    ));
    assert_eq!(h.scanner.scans(), 0);
}

#[tokio::test]
async fn test_inverted_story_range_never_reaches_network() {
    let h = scenario_a();
    let err = config(&h)
        .mode(AuditMode::IncrementalRange)
        .story_range(50, 10)
        .build()
        .unwrap_err();
    assert_eq!(err.class(), "ConfigurationError");
    assert_eq!(h.scanner.scans(), 0);
}

#[tokio::test]
async fn test_range_mode_limits_stories() {
    let h = scenario_a();
    let cfg = config(&h)
        .mode(AuditMode::IncrementalRange)
        .story_range(102, 102)
        .build()
        .unwrap();
    let run = h.orchestrator.run(&cfg).await.unwrap();
    assert_eq!(run.result.total_processed_stories, 1);
    assert_eq!(run.filter.excluded(), 2);
    assert_eq!(run.result.missing_frontend.len(), 1);
    assert!(run.result.missing_backend.is_empty());
}

#[tokio::test]
async fn test_resume_narrows_to_previous_gaps() {
    let h = scenario_a();
    h.orchestrator.run(&config(&h).build().unwrap()).await.unwrap();

    let resumed = h
        .orchestrator
        .run(&config(&h).mode(AuditMode::Resume).build().unwrap())
        .await
        .unwrap();
    // 101 was complete in both domains
    assert_eq!(resumed.result.total_processed_stories, 2);
    assert!(!resumed.result.is_missing_anywhere(101));
}
