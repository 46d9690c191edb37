//! Sequential health checks and infrastructure upgrades across repositories.

use std::fs;
use std::path::{Path, PathBuf};

use scaffold_core::{ProjectConfig, ProjectType, DEFAULT_PYTHON_VERSION};
use scaffold_verify::{discover_repositories, DiscoverError};
use serde::Serialize;

use crate::template::{render, TemplateContext, TemplateError, INFRASTRUCTURE_TEMPLATES};

pub const MANIFEST_FILE: &str = "pyproject.toml";
pub const PRE_COMMIT_FILE: &str = ".pre-commit-config.yaml";

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    ParseManifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{path} has no [project] name")]
    MissingProjectName { path: PathBuf },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceOp {
    Check,
    Upgrade,
}

impl MaintenanceOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MaintenanceOp::Check => "check",
            MaintenanceOp::Upgrade => "upgrade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceOutcome {
    pub repository: PathBuf,
    pub status: OutcomeStatus,
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub operation: MaintenanceOp,
    pub dry_run: bool,
    pub outcomes: Vec<MaintenanceOutcome>,
}

impl BatchReport {
    pub fn successes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Success)
            .count()
    }

    pub fn errors(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    /// Total number of detail lines across successful outcomes.
    pub fn detail_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Success)
            .map(|outcome| outcome.details.len())
            .sum()
    }
}

/// Detected structural issues in `repo`. A malformed manifest is an error.
pub fn check_project(repo: &Path) -> Result<Vec<String>, MaintenanceError> {
    let mut issues = Vec::new();

    let manifest = repo.join(MANIFEST_FILE);
    if manifest.is_file() {
        read_manifest(&manifest)?;
    } else {
        issues.push(format!("Missing {MANIFEST_FILE}"));
    }
    if !repo.join(PRE_COMMIT_FILE).is_file() {
        issues.push(format!("Missing {PRE_COMMIT_FILE}"));
    }
    if !repo.join("src").is_dir() {
        issues.push("Missing src/ directory".to_string());
    }
    if !repo.join("tests").is_dir() {
        issues.push("Missing tests/ directory".to_string());
    }

    let git_dir = repo.join(".git");
    if !git_dir.exists() {
        issues.push("Missing git repository (.git)".to_string());
    } else if !git_dir.join("hooks").join("pre-commit").is_file() {
        issues.push("Pre-commit hooks not installed".to_string());
    }

    Ok(issues)
}

/// Regenerate infrastructure files from the bundled templates. Returns the
/// rewritten paths; nothing is written under `dry_run`.
pub fn upgrade_project(repo: &Path, dry_run: bool) -> Result<Vec<PathBuf>, MaintenanceError> {
    let manifest_path = repo.join(MANIFEST_FILE);
    let manifest = read_manifest(&manifest_path)?;
    let config = project_from_manifest(&manifest, &manifest_path, repo)?;
    let context = TemplateContext::for_project(&config);

    let mut changed = Vec::new();
    for template in INFRASTRUCTURE_TEMPLATES {
        let rendered = render(template.name, template.content, &context)?;
        let path = repo.join(template.destination);
        let current = match fs::read_to_string(&path) {
            Ok(current) => Some(current),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(MaintenanceError::Read { path, source }),
        };
        if current.as_deref() == Some(rendered.as_str()) {
            continue;
        }
        if dry_run {
            tracing::info!(path = %path.display(), "would regenerate");
            continue;
        }
        fs::write(&path, rendered).map_err(|source| MaintenanceError::Write {
            path: path.clone(),
            source,
        })?;
        changed.push(path);
    }
    Ok(changed)
}

/// Run `operation` over every repository under `root`, one at a time.
/// Per-repository failures become error outcomes.
pub fn run_batch(
    root: &Path,
    operation: MaintenanceOp,
    max_depth: usize,
    marker: &str,
    dry_run: bool,
) -> Result<BatchReport, DiscoverError> {
    let repos = discover_repositories(root, max_depth, marker)?;
    let mut outcomes = Vec::with_capacity(repos.len());

    for repo in repos {
        let result = match operation {
            MaintenanceOp::Check => check_project(&repo),
            MaintenanceOp::Upgrade => upgrade_project(&repo, dry_run).map(|paths| {
                paths
                    .iter()
                    .map(|path| {
                        path.strip_prefix(&repo)
                            .unwrap_or(path.as_path())
                            .display()
                            .to_string()
                    })
                    .collect()
            }),
        };

        let outcome = match result {
            Ok(details) => MaintenanceOutcome {
                repository: repo,
                status: OutcomeStatus::Success,
                details,
                error: None,
            },
            Err(err) => {
                tracing::warn!(repo = %repo.display(), operation = operation.as_str(), error = %err, "maintenance failed");
                MaintenanceOutcome {
                    repository: repo,
                    status: OutcomeStatus::Error,
                    details: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let report = BatchReport {
        operation,
        dry_run,
        outcomes,
    };
    tracing::info!(
        operation = operation.as_str(),
        total = report.outcomes.len(),
        success = report.successes(),
        errors = report.errors(),
        "maintenance batch finished"
    );
    Ok(report)
}

fn read_manifest(path: &Path) -> Result<toml::Value, MaintenanceError> {
    let contents = fs::read_to_string(path).map_err(|source| MaintenanceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| MaintenanceError::ParseManifest {
        path: path.to_path_buf(),
        source,
    })
}

/// Rebuild the project settings that infrastructure templates depend on.
fn project_from_manifest(
    manifest: &toml::Value,
    manifest_path: &Path,
    repo: &Path,
) -> Result<ProjectConfig, MaintenanceError> {
    let project = manifest.get("project");
    let name = project
        .and_then(|project| project.get("name"))
        .and_then(toml::Value::as_str)
        .ok_or_else(|| MaintenanceError::MissingProjectName {
            path: manifest_path.to_path_buf(),
        })?;
    let description = project
        .and_then(|project| project.get("description"))
        .and_then(toml::Value::as_str)
        .unwrap_or_default();
    let author = project
        .and_then(|project| project.get("authors"))
        .and_then(|authors| authors.get(0))
        .and_then(|author| author.get("name"))
        .and_then(toml::Value::as_str)
        .unwrap_or_default();

    let mut config = ProjectConfig::new(name, ProjectType::default(), author, description);
    config.python_version = python_version(project, repo);
    Ok(config)
}

fn python_version(project: Option<&toml::Value>, repo: &Path) -> String {
    let from_requires = project
        .and_then(|project| project.get("requires-python"))
        .and_then(toml::Value::as_str)
        .map(|requirement| {
            requirement
                .trim_start_matches(|ch: char| matches!(ch, '>' | '=' | '~' | '^' | ' '))
                .to_string()
        })
        .filter(|version| scaffold_core::is_python_version(version));
    if let Some(version) = from_requires {
        return version;
    }

    fs::read_to_string(repo.join(".python-version"))
        .ok()
        .map(|text| text.trim().to_string())
        .filter(|version| scaffold_core::is_python_version(version))
        .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string())
}
