//! Fan a bulk command out over every discovered repository.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scaffold_core::{
    BulkCommand, CommandResult, ResultStore, StoreError, DEFAULT_MARKER, DEFAULT_MAX_DEPTH,
    DEFAULT_TIMEOUT_SECS,
};
use scaffold_verify::{
    discover_repositories, DiscoverError, RunError, RunOutcome, RunRequest, TaskRunner,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error("failed to persist bulk result: {0}")]
    Store(#[from] StoreError),
    #[error("invalid bulk options: {message}")]
    InvalidOptions { message: String },
    #[error("bulk run aborted at {}: {source}", .repo.display())]
    Run {
        repo: PathBuf,
        #[source]
        source: RunError,
    },
}

/// Executes one repository's request; the seam the orchestrator fans out.
#[async_trait]
pub trait RepoExecutor: Send + Sync {
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, RunError>;
}

#[async_trait]
impl RepoExecutor for TaskRunner {
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, RunError> {
        TaskRunner::execute(self, &request).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOptions {
    pub root: PathBuf,
    pub command: BulkCommand,
    pub max_depth: usize,
    pub marker: String,
    pub force: bool,
    pub timeout: Duration,
    pub workers: usize,
}

impl BulkOptions {
    pub fn new(root: impl Into<PathBuf>, command: BulkCommand) -> Self {
        Self {
            root: root.into(),
            command,
            max_depth: DEFAULT_MAX_DEPTH,
            marker: DEFAULT_MARKER.to_string(),
            force: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    fn check(&self) -> Result<(), BulkError> {
        if self.timeout.is_zero() {
            return Err(BulkError::InvalidOptions {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Executed,
    Cached,
    /// Produced by the orchestrator after the worker failed.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkEntry {
    pub source: ResultSource,
    pub result: CommandResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cached: usize,
    /// Paths of failing repositories, sorted.
    pub failing: Vec<PathBuf>,
}

/// Results of one bulk run, in completion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkReport {
    pub command: BulkCommand,
    pub entries: Vec<BulkEntry>,
}

impl BulkReport {
    pub fn summary(&self) -> BulkSummary {
        let passed = self
            .entries
            .iter()
            .filter(|entry| entry.result.passed())
            .count();
        let mut failing: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|entry| !entry.result.passed())
            .map(|entry| entry.result.repo_path.clone())
            .collect();
        failing.sort();

        BulkSummary {
            total: self.entries.len(),
            passed,
            failed: self.entries.len() - passed,
            cached: self
                .entries
                .iter()
                .filter(|entry| entry.source == ResultSource::Cached)
                .count(),
            failing,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.entries.iter().all(|entry| entry.result.passed())
    }
}

/// Discover repositories under `options.root` and run the command in each.
///
/// Every discovered repository yields exactly one entry. Executed and
/// synthesized results are appended to `store` as they complete. Storage
/// failures and rejected requests abort the run instead of being recorded.
pub async fn run_bulk(
    executor: Arc<dyn RepoExecutor>,
    store: &ResultStore,
    options: &BulkOptions,
) -> Result<BulkReport, BulkError> {
    options.check()?;
    let repos = discover_repositories(&options.root, options.max_depth, &options.marker)?;
    tracing::info!(
        root = %options.root.display(),
        command = %options.command,
        repos = repos.len(),
        workers = options.workers,
        "starting bulk run"
    );

    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut join_set = JoinSet::new();
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();

    for repo in repos {
        pending.insert(repo.clone());
        let executor = Arc::clone(&executor);
        let semaphore = Arc::clone(&semaphore);
        let request = RunRequest::new(repo.clone(), options.command)
            .force(options.force)
            .timeout(options.timeout);

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    let message = format!("worker pool closed: {err}");
                    return (repo, Err(WorkerFailure::Synthesize(message)));
                }
            };
            // Inner task so a panic is caught with the repository still known.
            let worker = tokio::spawn(async move { executor.execute(request).await });
            let _guard = AbortOnDrop(worker.abort_handle());
            let outcome = match worker.await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(err @ RunError::Background { .. })) => {
                    Err(WorkerFailure::Synthesize(err.to_string()))
                }
                Ok(Err(err)) => Err(WorkerFailure::Fatal(err)),
                Err(err) => Err(WorkerFailure::Synthesize(join_failure_message(err))),
            };
            (repo, outcome)
        });
    }

    let mut entries = Vec::with_capacity(pending.len());
    while let Some(joined) = join_set.join_next().await {
        let (repo, outcome) = match joined {
            Ok(done) => done,
            Err(err) => {
                tracing::warn!(error = %err, "bulk task aborted");
                continue;
            }
        };
        pending.remove(&repo);
        let outcome = match outcome {
            Ok(outcome) => Ok(outcome),
            Err(WorkerFailure::Synthesize(message)) => Err(message),
            Err(WorkerFailure::Fatal(source)) => {
                join_set.shutdown().await;
                return Err(BulkError::Run { repo, source });
            }
        };
        let entry = settle(repo, options.command, outcome);
        if entry.source != ResultSource::Cached {
            store.save(&entry.result)?;
        }
        entries.push(entry);
    }

    for repo in pending {
        let entry = settle(repo, options.command, Err("worker task was lost".to_string()));
        store.save(&entry.result)?;
        entries.push(entry);
    }

    let report = BulkReport {
        command: options.command,
        entries,
    };
    let summary = report.summary();
    tracing::info!(
        command = %options.command,
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        cached = summary.cached,
        "bulk run finished"
    );
    Ok(report)
}

enum WorkerFailure {
    /// Recorded as an internal failure for the repository.
    Synthesize(String),
    /// Aborts the whole run.
    Fatal(RunError),
}

/// Aborts the inner worker when its supervising task is cancelled.
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn settle(repo: PathBuf, command: BulkCommand, outcome: Result<RunOutcome, String>) -> BulkEntry {
    match outcome {
        Ok(RunOutcome::Executed(result)) => BulkEntry {
            source: ResultSource::Executed,
            result,
        },
        Ok(RunOutcome::Cached(result)) => BulkEntry {
            source: ResultSource::Cached,
            result,
        },
        Err(message) => {
            tracing::warn!(repo = %repo.display(), error = %message, "worker failed; recording internal failure");
            BulkEntry {
                source: ResultSource::Synthesized,
                result: CommandResult::internal_failure(repo, command, message),
            }
        }
    }
}

fn join_failure_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return format!("worker cancelled: {err}");
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|text| text.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("worker panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scaffold_core::{repo_display_name, ToolInvocation, EXIT_INTERNAL_FAILURE};
    use std::fs;
    use std::path::Path;

    fn mk_repo(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("pyproject.toml"), "[project]\n").expect("marker");
        dir
    }

    fn options(root: &Path, command: BulkCommand) -> BulkOptions {
        let mut options = BulkOptions::new(root, command);
        options.workers = 2;
        options.timeout = Duration::from_secs(10);
        options
    }

    /// Fails in repositories named `b`, panics in ones named `boom`, reports a
    /// background failure in `flaky` and rejects `rejected`.
    struct ScriptedExecutor;

    #[async_trait]
    impl RepoExecutor for ScriptedExecutor {
        async fn execute(&self, request: RunRequest) -> Result<RunOutcome, RunError> {
            let name = repo_display_name(&request.repo_path);
            if name == "boom" {
                panic!("executor exploded");
            }
            if name == "flaky" {
                return Err(RunError::Background {
                    repo: request.repo_path,
                    message: "scan task vanished".to_string(),
                });
            }
            if name == "rejected" {
                return Err(RunError::InvalidRequest {
                    message: "bad request".to_string(),
                });
            }
            Ok(RunOutcome::Executed(CommandResult {
                repo_name: name.clone(),
                repo_path: request.repo_path,
                command: request.command,
                timestamp: Utc::now(),
                exit_code: if name == "b" { 1 } else { 0 },
                duration_seconds: 0.01,
                stdout: String::new(),
                stderr: String::new(),
                git_commit: None,
            }))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_failing_repository_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["a", "b", "c"] {
            mk_repo(tmp.path(), name);
        }
        let store = ResultStore::new(tmp.path().join(".store"));

        let report = run_bulk(
            Arc::new(ScriptedExecutor),
            &store,
            &options(tmp.path(), BulkCommand::Lint),
        )
        .await
        .expect("bulk run");

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        let root = fs::canonicalize(tmp.path()).expect("canonical root");
        assert_eq!(summary.failing, vec![root.join("b")]);
        assert!(!report.all_passed());
        assert_eq!(store.load_all().expect("load").len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_and_erroring_workers_are_synthesized() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["a", "boom", "flaky"] {
            mk_repo(tmp.path(), name);
        }
        let store = ResultStore::new(tmp.path().join(".store"));

        let report = run_bulk(
            Arc::new(ScriptedExecutor),
            &store,
            &options(tmp.path(), BulkCommand::Test),
        )
        .await
        .expect("bulk run");

        assert_eq!(report.entries.len(), 3);
        let boom = report
            .entries
            .iter()
            .find(|entry| entry.result.repo_name == "boom")
            .expect("boom entry");
        assert_eq!(boom.source, ResultSource::Synthesized);
        assert_eq!(boom.result.exit_code, EXIT_INTERNAL_FAILURE);
        assert!(boom.result.stderr.contains("executor exploded"));

        let flaky = report
            .entries
            .iter()
            .find(|entry| entry.result.repo_name == "flaky")
            .expect("flaky entry");
        assert_eq!(flaky.source, ResultSource::Synthesized);
        assert!(flaky.result.stderr.contains("scan task vanished"));

        assert_eq!(store.load_all().expect("load").len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cached_results_are_not_reappended() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("storage");
        for name in ["a", "b"] {
            mk_repo(tmp.path(), name);
        }
        let store = ResultStore::new(storage.path());
        let runner = TaskRunner::new(store.clone())
            .with_tool(BulkCommand::Test, ToolInvocation::new("sh", ["-c", "echo ok"]));
        let executor: Arc<dyn RepoExecutor> = Arc::new(runner);
        let options = options(tmp.path(), BulkCommand::Test);

        let first = run_bulk(Arc::clone(&executor), &store, &options)
            .await
            .expect("first");
        assert!(first
            .entries
            .iter()
            .all(|entry| entry.source == ResultSource::Executed));

        let second = run_bulk(executor, &store, &options).await.expect("second");
        assert_eq!(second.summary().cached, 2);
        assert_eq!(second.summary().passed, 2);
        assert_eq!(store.load_all().expect("load").len(), 2);
    }

    #[tokio::test]
    async fn runs_real_tool_with_single_worker() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("storage");
        mk_repo(tmp.path(), "a");
        mk_repo(tmp.path(), "b");
        let store = ResultStore::new(storage.path());
        let runner = TaskRunner::new(store.clone()).with_tool(
            BulkCommand::Lint,
            ToolInvocation::new("sh", ["-c", "test \"$(basename \"$(pwd -P)\")\" != b"]),
        );
        let mut options = options(tmp.path(), BulkCommand::Lint);
        options.workers = 1;

        let report = run_bulk(Arc::new(runner), &store, &options)
            .await
            .expect("bulk run");
        let root = fs::canonicalize(tmp.path()).expect("canonical root");
        assert_eq!(report.summary().failing, vec![root.join("b")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_request_aborts_the_run() {
        let tmp = tempfile::tempdir().expect("tempdir");
        mk_repo(tmp.path(), "rejected");
        let store = ResultStore::new(tmp.path().join(".store"));

        let err = run_bulk(
            Arc::new(ScriptedExecutor),
            &store,
            &options(tmp.path(), BulkCommand::Test),
        )
        .await
        .expect_err("rejected request");

        match err {
            BulkError::Run { repo, source } => {
                assert!(repo.ends_with("rejected"));
                assert!(matches!(source, RunError::InvalidRequest { .. }));
            }
            other => panic!("expected Run error, got {other:?}"),
        }
        assert!(store.load_all().expect("load").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_history_aborts_without_appending() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("storage");
        for name in ["a", "b"] {
            mk_repo(tmp.path(), name);
        }
        let store = ResultStore::new(storage.path());
        fs::write(store.status_path(), "{not json\n").expect("seed log");
        let runner = TaskRunner::new(store.clone())
            .with_tool(BulkCommand::Test, ToolInvocation::new("sh", ["-c", "true"]));

        let err = run_bulk(Arc::new(runner), &store, &options(tmp.path(), BulkCommand::Test))
            .await
            .expect_err("malformed history");

        assert!(matches!(
            err,
            BulkError::Run {
                source: RunError::Store(StoreError::Malformed { line: 1, .. }),
                ..
            }
        ));
        let log = fs::read_to_string(store.status_path()).expect("read log");
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected_before_running() {
        let tmp = tempfile::tempdir().expect("tempdir");
        mk_repo(tmp.path(), "a");
        let store = ResultStore::new(tmp.path().join(".store"));
        let mut options = options(tmp.path(), BulkCommand::Test);
        options.timeout = Duration::ZERO;

        let err = run_bulk(Arc::new(ScriptedExecutor), &store, &options)
            .await
            .expect_err("zero timeout");
        assert!(matches!(err, BulkError::InvalidOptions { .. }));
        assert!(!store.status_path().exists());
    }

    #[tokio::test]
    async fn unwritable_store_aborts_with_store_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        mk_repo(tmp.path(), "a");
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "").expect("write blocker");
        let store = ResultStore::new(&blocker);

        let err = run_bulk(
            Arc::new(ScriptedExecutor),
            &store,
            &options(tmp.path(), BulkCommand::Test),
        )
        .await
        .expect_err("unwritable store");
        assert!(matches!(err, BulkError::Store(StoreError::CreateDir { .. })));
    }

    #[test]
    fn default_options_use_available_parallelism() {
        let options = BulkOptions::new("/work", BulkCommand::Test);
        let expected = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(options.workers, expected);
        assert!(options.workers >= 1);
    }

    #[test]
    fn summary_keeps_same_named_failures_apart() {
        let failed = |path: &str| BulkEntry {
            source: ResultSource::Executed,
            result: CommandResult {
                repo_path: PathBuf::from(path),
                repo_name: "api".to_string(),
                command: BulkCommand::Test,
                timestamp: Utc::now(),
                exit_code: 1,
                duration_seconds: 0.1,
                stdout: String::new(),
                stderr: String::new(),
                git_commit: None,
            },
        };
        let report = BulkReport {
            command: BulkCommand::Test,
            entries: vec![failed("/work/svc/api"), failed("/work/legacy/api")],
        };
        assert_eq!(
            report.summary().failing,
            vec![PathBuf::from("/work/legacy/api"), PathBuf::from("/work/svc/api")]
        );
    }

    #[tokio::test]
    async fn invalid_root_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ResultStore::new(tmp.path().join(".store"));
        let err = run_bulk(
            Arc::new(ScriptedExecutor),
            &store,
            &options(&tmp.path().join("missing"), BulkCommand::Test),
        )
        .await
        .expect_err("missing root");
        assert!(matches!(err, BulkError::Discover(DiscoverError::InvalidRoot { .. })));
    }

    #[test]
    fn empty_report_summary() {
        let report = BulkReport {
            command: BulkCommand::Test,
            entries: Vec::new(),
        };
        let summary = report.summary();
        assert_eq!(summary.total, 0);
        assert!(summary.failing.is_empty());
        assert!(report.all_passed());
    }
}
