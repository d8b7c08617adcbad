// End-to-end pipeline runs against mocked and hand-written providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remd_core::cancel::CancellationToken;
use remd_core::config::{ConvertOptions, FETCH_CONCURRENCY};
use remd_core::contract::{
    GitRef, MockProvider, Progress, Provider, RepositoryRef, ResolvedRef, RetrievedFile,
    SkipReason, TreeEntry,
};
use remd_core::convert::{convert, convert_with_provider, ConvertRequest};
use remd_core::error::ConvertError;
use remd_core::filter::FilterSpec;
use remd_core::http::{HttpResponse, MockHttpTransport, RetryPolicy, TransportError};
use remd_core::language::is_binary_extension;
use remd_core::provider::GitHubProvider;

fn repository() -> RepositoryRef {
    RepositoryRef::github("acme", "app")
}

fn file(path: &str, size: u64) -> TreeEntry {
    TreeEntry::file(path, format!("sha-{path}"), Some(size))
}

/// Emulates a provider: binary by extension, size limit, one failing path.
fn mock_provider(entries: Vec<TreeEntry>) -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_resolve_ref().returning(|repo| {
        Ok(ResolvedRef {
            repository: repo.clone(),
            reference: GitRef::branch("main"),
        })
    });
    provider
        .expect_list_tree()
        .returning(move |_| Ok(entries.clone()));
    provider
        .expect_fetch_content()
        .returning(|entry, _, max_file_size| {
            if entry.path == "flaky.txt" {
                return Err(ConvertError::RateLimitExceeded("api.github.com".into()));
            }
            if is_binary_extension(&entry.path) {
                return Ok(RetrievedFile::binary(entry.clone()));
            }
            let size = entry.size.unwrap_or(0);
            if max_file_size > 0 && size > max_file_size {
                return Ok(RetrievedFile::skipped(
                    entry.clone(),
                    SkipReason::TooLarge {
                        size,
                        limit: max_file_size,
                    },
                ));
            }
            Ok(RetrievedFile::text(
                entry.clone(),
                format!("contents of {}\n", entry.path).into_bytes(),
            ))
        });
    provider
}

#[tokio::test]
async fn test_mixed_repository_accounts_for_every_file() {
    let provider = mock_provider(vec![
        TreeEntry::directory("src", "t1"),
        file("src/main.rs", 20),
        file("README.md", 10),
        file("logo.png", 10),
        file("big.txt", 5_000),
        file("flaky.txt", 10),
    ]);
    let cancel = CancellationToken::new();

    let report = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        1_000,
        |_| {},
        &cancel,
    )
    .await
    .expect("conversion succeeds despite per-file failures");

    assert_eq!(report.repository, "acme/app");
    assert_eq!(report.reference, "main");
    assert_eq!(report.files_total, 5);
    assert_eq!(report.files_included, 2);
    assert_eq!(
        report.files_included + report.files_skipped.len(),
        report.files_total
    );

    let skipped: Vec<(&str, &SkipReason)> = report
        .files_skipped
        .iter()
        .map(|s| (s.path.as_str(), &s.reason))
        .collect();
    assert_eq!(skipped[0], ("big.txt", &SkipReason::TooLarge { size: 5_000, limit: 1_000 }));
    assert_eq!(skipped[1].0, "flaky.txt");
    assert!(matches!(skipped[1].1, SkipReason::FetchError { message } if message.contains("rate limit")));
    assert_eq!(skipped[2], ("logo.png", &SkipReason::BinaryDetected));

    for path in ["src/main.rs", "README.md", "logo.png", "big.txt", "flaky.txt"] {
        assert!(
            report.document.contains(&format!("### `{path}`")),
            "missing heading for {path}"
        );
    }
    assert!(report.document.contains("```rust\ncontents of src/main.rs\n```"));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_covers_every_file() {
    let entries: Vec<TreeEntry> = (0..25).map(|i| file(&format!("f{i:02}.txt"), 1)).collect();
    let provider = mock_provider(entries);
    let cancel = CancellationToken::new();
    let mut seen: Vec<Progress> = Vec::new();

    let report = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        |p| seen.push(p),
        &cancel,
    )
    .await
    .expect("conversion succeeds");

    assert_eq!(report.files_total, 25);
    assert_eq!(seen.len(), 25);
    for (i, progress) in seen.iter().enumerate() {
        assert_eq!(progress.completed, i + 1);
        assert_eq!(progress.total, 25);
    }
    let mut paths: Vec<&str> = seen.iter().map(|p| p.path.as_str()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 25, "each file reported exactly once");
}

#[tokio::test]
async fn test_filter_limits_fetches_to_matching_paths() {
    let mut provider = MockProvider::new();
    provider.expect_resolve_ref().returning(|repo| {
        Ok(ResolvedRef {
            repository: repo.clone(),
            reference: GitRef::branch("main"),
        })
    });
    provider.expect_list_tree().returning(|_| {
        Ok(vec![
            TreeEntry::directory("web", "t1"),
            file("web/app.ts", 5),
            file("web/app.tsx", 5),
            file("tools/build.py", 5),
            file("README.md", 5),
        ])
    });
    provider
        .expect_fetch_content()
        .times(2)
        .returning(|entry, _, _| {
            assert!(
                entry.path.ends_with(".py") || entry.path.ends_with(".ts"),
                "unexpected fetch of {}",
                entry.path
            );
            Ok(RetrievedFile::text(entry.clone(), b"x\n".to_vec()))
        });

    let filter = FilterSpec::compile(r"\.py$,\.ts$").expect("valid filter");
    let report = convert_with_provider(
        &provider,
        &repository(),
        &filter,
        0,
        |_| {},
        &CancellationToken::new(),
    )
    .await
    .expect("conversion succeeds");

    assert_eq!(report.files_total, 2);
    assert_eq!(report.files_included, 2);
    assert!(report.document.contains("├── tools/\n│   └── build.py\n└── web/\n    └── app.ts\n"));
    assert!(!report.document.contains("README.md"));
}

#[tokio::test]
async fn test_listing_failure_aborts_without_fetching() {
    let mut provider = MockProvider::new();
    provider.expect_resolve_ref().returning(|repo| {
        Ok(ResolvedRef {
            repository: repo.clone(),
            reference: GitRef::branch("main"),
        })
    });
    provider
        .expect_list_tree()
        .returning(|_| Err(ConvertError::AuthRequired("acme/app requires a GitHub token".into())));
    provider.expect_fetch_content().times(0);

    let err = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        |_| {},
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConvertError::AuthRequired(_)), "{err:?}");
}

#[tokio::test]
async fn test_conflicting_paths_fail_the_run() {
    let provider = mock_provider(vec![file("docs", 1), file("docs/intro.md", 1)]);
    let err = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        |_| {},
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConvertError::TreeConflict(_)), "{err:?}");
}

#[tokio::test]
async fn test_empty_repository_renders_empty_document() {
    let provider = mock_provider(Vec::new());
    let report = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        |_| panic!("no progress expected"),
        &CancellationToken::new(),
    )
    .await
    .expect("empty repository is not an error");

    assert_eq!(report.files_total, 0);
    assert!(report.files_skipped.is_empty());
    assert!(report.document.starts_with("# Repository: acme/app\n"));
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let mut provider = MockProvider::new();
    provider.expect_resolve_ref().times(0);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        |_| {},
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_cancellation_during_fetch_returns_no_document() {
    let entries: Vec<TreeEntry> = (0..40).map(|i| file(&format!("f{i:02}.txt"), 1)).collect();
    let provider = mock_provider(entries);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let err = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        move |p| {
            if p.completed == 3 {
                trigger.cancel();
            }
        },
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConvertError::Cancelled), "{err:?}");
}

/// Completes later files first and records the peak number of concurrent fetches.
struct SlowProvider {
    entries: Vec<TreeEntry>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Provider for SlowProvider {
    async fn resolve_ref(&self, repository: &RepositoryRef) -> Result<ResolvedRef, ConvertError> {
        Ok(ResolvedRef {
            repository: repository.clone(),
            reference: GitRef::branch("main"),
        })
    }

    async fn list_tree(&self, _resolved: &ResolvedRef) -> Result<Vec<TreeEntry>, ConvertError> {
        Ok(self.entries.clone())
    }

    async fn fetch_content(
        &self,
        entry: &TreeEntry,
        _resolved: &ResolvedRef,
        _max_file_size: u64,
    ) -> Result<RetrievedFile, ConvertError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let rank: u64 = entry.path.trim_start_matches('f').trim_end_matches(".txt").parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(40 - rank)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RetrievedFile::text(entry.clone(), entry.path.clone().into_bytes()))
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded_and_output_order_is_stable() {
    let provider = SlowProvider {
        entries: (0..20).map(|i| file(&format!("f{i:02}.txt"), 1)).collect(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    };

    let report = convert_with_provider(
        &provider,
        &repository(),
        &FilterSpec::default(),
        0,
        |_| {},
        &CancellationToken::new(),
    )
    .await
    .expect("conversion succeeds");

    let peak = provider.peak.load(Ordering::SeqCst);
    assert!(peak <= FETCH_CONCURRENCY, "peak concurrency {peak}");
    assert!(peak > 1, "fetches should overlap");

    let positions: Vec<usize> = (0..20)
        .map(|i| {
            report
                .document
                .find(&format!("### `f{i:02}.txt`"))
                .expect("heading present")
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "sections in path order");
}

#[tokio::test]
async fn test_convert_validates_url_and_filter_before_network() {
    let cancel = CancellationToken::new();

    let bad_url = ConvertRequest {
        url: "https://bitbucket.org/acme/app".to_string(),
        credential: None,
        options: ConvertOptions::default(),
    };
    let err = convert(&bad_url, |_| {}, &cancel).await.unwrap_err();
    assert!(matches!(err, ConvertError::InvalidUrl(_)), "{err:?}");

    let bad_filter = ConvertRequest {
        url: "https://github.com/acme/app".to_string(),
        credential: None,
        options: ConvertOptions {
            filter: r"\.rs$,(".to_string(),
            ..ConvertOptions::default()
        },
    };
    let err = convert(&bad_filter, |_| {}, &cancel).await.unwrap_err();
    assert!(
        matches!(err, ConvertError::InvalidPattern { position: 1, .. }),
        "{err:?}"
    );
}

/// A real GitHub provider over canned HTTP: `a.txt` and `c.txt` download,
/// `b.txt` gets `b_response` on every attempt.
fn github_with_failing_file<F>(
    b_attempts: Arc<AtomicUsize>,
    b_response: F,
) -> GitHubProvider
where
    F: Fn() -> Result<HttpResponse, TransportError> + Send + 'static,
{
    let mut transport = MockHttpTransport::new();
    transport.expect_get().returning(move |req| {
        match (req.url.host_str(), req.url.path()) {
            (Some("api.github.com"), "/repos/acme/app/git/trees/main") => Ok(HttpResponse::new(
                200,
                serde_json::json!({
                    "sha": "root",
                    "truncated": false,
                    "tree": [
                        { "path": "a.txt", "type": "blob", "sha": "ba", "size": 2 },
                        { "path": "b.txt", "type": "blob", "sha": "bb", "size": 2 },
                        { "path": "c.txt", "type": "blob", "sha": "bc", "size": 2 }
                    ]
                })
                .to_string(),
            )),
            (Some("raw.githubusercontent.com"), "/acme/app/main/b.txt") => {
                b_attempts.fetch_add(1, Ordering::SeqCst);
                b_response()
            }
            (Some("raw.githubusercontent.com"), path) => {
                Ok(HttpResponse::new(200, format!("{path}\n")))
            }
            other => panic!("unexpected request {other:?}"),
        }
    });
    GitHubProvider::new(Arc::new(transport), None).with_retry_policy(RetryPolicy::immediate())
}

#[tokio::test]
async fn test_rate_limited_file_mid_fetch_is_skipped_and_run_completes() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let provider = github_with_failing_file(attempts.clone(), || {
        Ok(HttpResponse::new(429, "Too Many Requests"))
    });
    let repository = repository().with_reference(GitRef::branch("main"));
    let mut completed: Vec<usize> = Vec::new();

    let report = convert_with_provider(
        &provider,
        &repository,
        &FilterSpec::default(),
        0,
        |p| completed.push(p.completed),
        &CancellationToken::new(),
    )
    .await
    .expect("one rate-limited file does not fail the run");

    assert_eq!(report.files_total, 3);
    assert_eq!(report.files_included, 2);
    assert_eq!(report.files_skipped.len(), 1);
    assert_eq!(report.files_skipped[0].path, "b.txt");
    assert!(
        matches!(&report.files_skipped[0].reason, SkipReason::FetchError { message } if message.contains("rate limit exceeded")),
        "{:?}",
        report.files_skipped[0].reason
    );
    assert_eq!(completed, vec![1, 2, 3]);
    assert_eq!(attempts.load(Ordering::SeqCst), 5, "one attempt plus four rate-limit retries");
    assert!(report.document.contains("### `b.txt`\n\n> Skipped: fetch failed: rate limit exceeded"));
    assert!(report.document.contains("/acme/app/main/a.txt\n"));
}

#[tokio::test]
async fn test_exhausted_transient_retries_become_fetch_error_skip() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let provider = github_with_failing_file(attempts.clone(), || {
        Err(TransportError::Timeout("read timed out".into()))
    });
    let repository = repository().with_reference(GitRef::branch("main"));

    let report = convert_with_provider(
        &provider,
        &repository,
        &FilterSpec::default(),
        0,
        |_| {},
        &CancellationToken::new(),
    )
    .await
    .expect("one unreachable file does not fail the run");

    assert_eq!(attempts.load(Ordering::SeqCst), 4, "one attempt plus three transient retries");
    assert_eq!(report.files_included, 2);
    assert_eq!(report.files_skipped.len(), 1);
    match &report.files_skipped[0].reason {
        SkipReason::FetchError { message } => {
            assert!(message.starts_with("network error:"), "{message}");
            assert!(message.contains("request timed out"), "{message}");
        }
        other => panic!("expected FetchError, got {other:?}"),
    }
}
