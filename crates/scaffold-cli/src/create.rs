//! New project creation: render templates, then optional git and environment setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use scaffold_core::{is_valid, ProjectConfig, ToolInvocation, Validate, ValidationLevel};
use scaffold_git::{init_and_stage, GitCli, GitError};

use crate::template::{enumerate_and_render, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("directory {path} already exists")]
    AlreadyExists { path: PathBuf },
    #[error("invalid project configuration: {message}")]
    InvalidConfig { message: String },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("git setup failed: {0}")]
    Git(#[from] GitError),
    #[error("failed to run `{command}`: {source}")]
    SetupIo {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed with status {status}: {stderr}")]
    SetupFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Post-render steps for [`create_project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub git: Option<GitCli>,
    /// Commands run in order inside the new project; empty skips setup.
    pub setup: Vec<ToolInvocation>,
}

impl CreateOptions {
    pub fn for_config(config: &ProjectConfig) -> Self {
        Self {
            git: config.git_init.then(GitCli::default),
            setup: default_setup_commands(),
        }
    }

    pub fn without_setup(mut self) -> Self {
        self.setup.clear();
        self
    }
}

pub fn default_setup_commands() -> Vec<ToolInvocation> {
    vec![
        ToolInvocation::new("uv", ["sync"]),
        ToolInvocation::new("uv", ["run", "pre-commit", "install"]),
    ]
}

/// Reject a configuration with any error-level validation issue.
pub fn ensure_valid_config(config: &ProjectConfig) -> Result<(), ProjectError> {
    let issues = config.validate();
    if is_valid(&issues) {
        return Ok(());
    }
    let message = issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(ProjectError::InvalidConfig { message })
}

/// Create a project at `output_dir`, which must not exist yet. Returns the
/// rendered file paths.
pub fn create_project(
    config: &ProjectConfig,
    output_dir: &Path,
    options: &CreateOptions,
) -> Result<Vec<PathBuf>, ProjectError> {
    ensure_valid_config(config)?;

    if output_dir.exists() {
        return Err(ProjectError::AlreadyExists {
            path: output_dir.to_path_buf(),
        });
    }
    fs::create_dir_all(output_dir).map_err(|source| ProjectError::CreateDir {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let written = enumerate_and_render(config, output_dir)?;
    tracing::info!(
        project = %config.name,
        kind = %config.project_type,
        dir = %output_dir.display(),
        files = written.len(),
        "project rendered"
    );

    if let Some(git) = &options.git {
        init_and_stage(output_dir, git)?;
    }

    for step in &options.setup {
        run_setup_step(step, output_dir)?;
    }

    Ok(written)
}

fn run_setup_step(step: &ToolInvocation, cwd: &Path) -> Result<(), ProjectError> {
    let command = step.render();
    tracing::debug!(command = %command, cwd = %cwd.display(), "running setup step");

    let output = Command::new(&step.program)
        .args(&step.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ProjectError::SetupIo {
            command: command.clone(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }
    Err(ProjectError::SetupFailed {
        command,
        status: output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string()),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
