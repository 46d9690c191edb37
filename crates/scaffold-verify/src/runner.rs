//! Single-repository execution of a bulk command with result caching.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use scaffold_core::{
    repo_display_name, BulkCommand, CommandResult, ResultStore, ScaffoldConfig, StoreError,
    ToolInvocation, DEFAULT_TIMEOUT_SECS, EXIT_INTERNAL_FAILURE, EXIT_TIMEOUT,
};
use scaffold_git::{head_revision, GitCli};

use crate::command::run_tool;
use crate::error::{RunError, VerifyError};
use crate::freshness::latest_content_mtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub repo_path: PathBuf,
    pub command: BulkCommand,
    /// Skip the cache lookup and always invoke the tool.
    pub force: bool,
    pub timeout: Duration,
}

impl RunRequest {
    pub fn new(repo_path: impl Into<PathBuf>, command: BulkCommand) -> Self {
        Self {
            repo_path: repo_path.into(),
            command,
            force: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn check(&self) -> Result<(), RunError> {
        if self.repo_path.as_os_str().is_empty() || !self.repo_path.is_absolute() {
            return Err(RunError::InvalidRequest {
                message: format!(
                    "repository path must be absolute: '{}'",
                    self.repo_path.display()
                ),
            });
        }
        if self.timeout.is_zero() {
            return Err(RunError::InvalidRequest {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether a result was reused from history or freshly produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Cached(CommandResult),
    Executed(CommandResult),
}

impl RunOutcome {
    pub fn result(&self) -> &CommandResult {
        match self {
            RunOutcome::Cached(result) | RunOutcome::Executed(result) => result,
        }
    }

    pub fn into_result(self) -> CommandResult {
        match self {
            RunOutcome::Cached(result) | RunOutcome::Executed(result) => result,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, RunOutcome::Cached(_))
    }
}

/// Runs one bulk command against one repository, reusing the latest stored
/// result while the repository has not changed since it was recorded.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    store: ResultStore,
    git: GitCli,
    tools: BTreeMap<BulkCommand, ToolInvocation>,
}

impl TaskRunner {
    pub fn new(store: ResultStore) -> Self {
        Self {
            store,
            git: GitCli::default(),
            tools: BTreeMap::new(),
        }
    }

    /// Runner using the tool overrides from `config`.
    pub fn from_config(config: &ScaffoldConfig, store: ResultStore) -> Self {
        let mut runner = Self::new(store);
        for command in BulkCommand::ALL {
            runner
                .tools
                .insert(command, config.invocation_for(command));
        }
        runner
    }

    pub fn with_tool(mut self, command: BulkCommand, invocation: ToolInvocation) -> Self {
        self.tools.insert(command, invocation);
        self
    }

    pub fn with_git(mut self, git: GitCli) -> Self {
        self.git = git;
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn invocation(&self, command: BulkCommand) -> ToolInvocation {
        self.tools
            .get(&command)
            .cloned()
            .unwrap_or_else(|| command.default_invocation())
    }

    /// Decide between cache and execution without touching the store.
    pub async fn execute(&self, request: &RunRequest) -> Result<RunOutcome, RunError> {
        request.check()?;

        if !request.force {
            if let Some(cached) = self.fresh_cached(request).await? {
                tracing::debug!(
                    repo = %request.repo_path.display(),
                    command = %request.command,
                    "reusing cached result"
                );
                return Ok(RunOutcome::Cached(cached));
            }
        }

        let invocation = self.invocation(request.command);
        tracing::info!(
            repo = %request.repo_path.display(),
            command = %invocation.render(),
            "running tool"
        );

        let (exit_code, stdout, stderr, duration_seconds) =
            match run_tool(&invocation, &request.repo_path, request.timeout).await {
                Ok(output) => (
                    output.exit_code.unwrap_or(EXIT_INTERNAL_FAILURE),
                    output.stdout,
                    output.stderr,
                    output.duration.as_secs_f64(),
                ),
                Err(VerifyError::Timeout { timeout, .. }) => {
                    (EXIT_TIMEOUT, String::new(), String::new(), timeout.as_secs_f64())
                }
                Err(err) => {
                    tracing::warn!(repo = %request.repo_path.display(), error = %err, "tool failed to run");
                    (EXIT_INTERNAL_FAILURE, String::new(), err.to_string(), 0.0)
                }
            };

        let git_commit = self.revision(&request.repo_path).await;
        Ok(RunOutcome::Executed(CommandResult {
            repo_name: repo_display_name(&request.repo_path),
            repo_path: request.repo_path.clone(),
            command: request.command,
            timestamp: Utc::now(),
            exit_code,
            duration_seconds,
            stdout,
            stderr,
            git_commit,
        }))
    }

    /// [`execute`](Self::execute), then persist freshly executed results.
    pub async fn run(&self, request: &RunRequest) -> Result<CommandResult, RunError> {
        let outcome = self.execute(request).await?;
        if let RunOutcome::Executed(result) = &outcome {
            self.store.save(result)?;
        }
        Ok(outcome.into_result())
    }

    async fn fresh_cached(&self, request: &RunRequest) -> Result<Option<CommandResult>, RunError> {
        let store = self.store.clone();
        let repo = request.repo_path.clone();
        let command = request.command;

        let lookup = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
            let Some(latest) = store.latest_for(&repo, command)? else {
                return Ok(None);
            };
            match latest_content_mtime(&repo) {
                Some(modified) if latest.timestamp <= modified => Ok(None),
                _ => Ok(Some(latest)),
            }
        })
        .await
        .map_err(|err| RunError::Background {
            repo: request.repo_path.clone(),
            message: err.to_string(),
        })?;

        Ok(lookup?)
    }

    async fn revision(&self, repo: &Path) -> Option<String> {
        let git = self.git.clone();
        let path = repo.to_path_buf();
        match tokio::task::spawn_blocking(move || head_revision(&path, &git)).await {
            Ok(revision) => revision,
            Err(err) => {
                tracing::debug!(repo = %repo.display(), error = %err, "revision lookup aborted");
                None
            }
        }
    }
}
