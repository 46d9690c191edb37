//! Core record types for bulk execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Exit code recorded when the orchestration itself failed (tool missing,
/// launch error, crashed worker).
pub const EXIT_INTERNAL_FAILURE: i32 = -1;
/// Exit code recorded when the tool exceeded its wall-clock budget.
pub const EXIT_TIMEOUT: i32 = -2;

/// A bulk command runnable identically across many repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BulkCommand {
    /// Test suite execution.
    #[serde(rename = "pytest")]
    Test,
    /// Lint and formatting hooks.
    #[serde(rename = "prek")]
    Lint,
}

impl BulkCommand {
    pub const ALL: [BulkCommand; 2] = [BulkCommand::Test, BulkCommand::Lint];

    /// Name used in the result log and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            BulkCommand::Test => "pytest",
            BulkCommand::Lint => "prek",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BulkCommand::Test => "tests",
            BulkCommand::Lint => "lint",
        }
    }

    /// Invocation used when the configuration does not override it.
    pub fn default_invocation(self) -> ToolInvocation {
        match self {
            BulkCommand::Test => ToolInvocation::new("uv", ["run", "pytest"]),
            BulkCommand::Lint => ToolInvocation::new("uv", ["run", "prek", "run", "--all-files"]),
        }
    }
}

impl std::str::FromStr for BulkCommand {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pytest" | "test" | "tests" => Ok(BulkCommand::Test),
            "prek" | "lint" => Ok(BulkCommand::Lint),
            other => Err(format!(
                "invalid bulk command '{other}'. valid values: pytest (test), prek (lint)"
            )),
        }
    }
}

impl std::fmt::Display for BulkCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External process launched inside a repository directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// One execution attempt of a bulk command against one repository.
///
/// Records are write-once: the store only ever appends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub repo_path: PathBuf,
    pub repo_name: String,
    pub command: BulkCommand,
    pub timestamp: DateTime<Utc>,
    pub exit_code: i32,
    pub duration_seconds: f64,
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub git_commit: Option<String>,
}

impl CommandResult {
    /// Record for a repository whose worker failed before producing a result.
    pub fn internal_failure(
        repo_path: impl Into<PathBuf>,
        command: BulkCommand,
        message: impl Into<String>,
    ) -> Self {
        let repo_path = repo_path.into();
        Self {
            repo_name: repo_display_name(&repo_path),
            repo_path,
            command,
            timestamp: Utc::now(),
            exit_code: EXIT_INTERNAL_FAILURE,
            duration_seconds: 0.0,
            stdout: String::new(),
            stderr: message.into(),
            git_commit: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == EXIT_TIMEOUT
    }

    /// Short human-readable outcome tag.
    pub fn status_label(&self) -> &'static str {
        match self.exit_code {
            0 => "passed",
            EXIT_TIMEOUT => "timeout",
            EXIT_INTERNAL_FAILURE => "error",
            _ => "failed",
        }
    }
}

/// Display label for a repository: its final path component.
pub fn repo_display_name(repo_path: &Path) -> String {
    repo_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| repo_path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_command_parses_wire_names_and_aliases() {
        assert_eq!("pytest".parse::<BulkCommand>(), Ok(BulkCommand::Test));
        assert_eq!("test".parse::<BulkCommand>(), Ok(BulkCommand::Test));
        assert_eq!(" PREK ".parse::<BulkCommand>(), Ok(BulkCommand::Lint));
        assert_eq!("lint".parse::<BulkCommand>(), Ok(BulkCommand::Lint));

        let err = "mypy".parse::<BulkCommand>().expect_err("unknown command");
        assert!(err.contains("invalid bulk command 'mypy'"));
    }

    #[test]
    fn bulk_command_serializes_as_wire_name() {
        let encoded = serde_json::to_string(&BulkCommand::Lint).expect("serialize");
        assert_eq!(encoded, "\"prek\"");
        let decoded: BulkCommand = serde_json::from_str("\"pytest\"").expect("deserialize");
        assert_eq!(decoded, BulkCommand::Test);
    }

    #[test]
    fn default_invocations_go_through_uv() {
        let test = BulkCommand::Test.default_invocation();
        assert_eq!(test.render(), "uv run pytest");
        let lint = BulkCommand::Lint.default_invocation();
        assert_eq!(lint.render(), "uv run prek run --all-files");
    }

    #[test]
    fn internal_failure_uses_sentinel_exit_code() {
        let result =
            CommandResult::internal_failure("/tmp/x/alpha", BulkCommand::Test, "worker panicked");
        assert_eq!(result.exit_code, EXIT_INTERNAL_FAILURE);
        assert_eq!(result.repo_name, "alpha");
        assert_eq!(result.stderr, "worker panicked");
        assert_eq!(result.status_label(), "error");
        assert!(!result.passed());
    }

    #[test]
    fn status_label_distinguishes_timeout_from_failure() {
        let mut result = CommandResult::internal_failure("/r", BulkCommand::Lint, "");
        result.exit_code = EXIT_TIMEOUT;
        assert!(result.timed_out());
        assert_eq!(result.status_label(), "timeout");
        result.exit_code = 3;
        assert_eq!(result.status_label(), "failed");
        result.exit_code = 0;
        assert_eq!(result.status_label(), "passed");
    }
}
