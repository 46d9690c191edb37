use serde::{Deserialize, Serialize};

use crate::config::ScaffoldConfig;
use crate::project::{is_python_identifier, is_python_version, ProjectConfig};
use crate::types::BulkCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

/// True when no issue is at [`ValidationLevel::Error`].
pub fn is_valid(issues: &[ValidationIssue]) -> bool {
    !issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

impl Validate for ScaffoldConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.bulk.timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "bulk.timeout.zero",
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.bulk.marker.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "bulk.marker.empty",
                message: "repository marker file name must not be empty".to_string(),
            });
        }

        if self.bulk.max_depth > 10 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "bulk.max_depth.high",
                message: format!(
                    "max_depth {} walks very deep trees; discovery may be slow",
                    self.bulk.max_depth
                ),
            });
        }

        for (name, invocation) in &self.tools {
            if name.parse::<BulkCommand>().is_err() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "tools.unknown_command",
                    message: format!("[tools.{name}] does not name a bulk command"),
                });
            }
            if invocation.program.trim().is_empty() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "tools.program.empty",
                    message: format!("[tools.{name}] program must not be empty"),
                });
            }
        }

        issues
    }
}

impl Validate for ProjectConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.name.is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "project.name.empty",
                message: "project name must not be empty".to_string(),
            });
        } else if !is_python_identifier(&self.package_name()) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "project.name.identifier",
                message: format!(
                    "project name '{}' does not convert to a valid Python identifier",
                    self.name
                ),
            });
        }

        if !is_python_version(&self.python_version) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "project.python_version.format",
                message: format!(
                    "python version '{}' must look like X.Y",
                    self.python_version
                ),
            });
        }

        if self.author.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "project.author.empty",
                message: "author is empty; pyproject.toml will list no author".to_string(),
            });
        }

        if let Some(email) = &self.email {
            if !email.contains('@') {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Warning,
                    code: "project.email.format",
                    message: format!("email '{email}' does not look like an address"),
                });
            }
        }

        issues
    }
}
