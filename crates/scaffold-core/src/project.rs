//! Configuration for a freshly scaffolded Python project.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Package,
    Cli,
    Webapp,
}

impl ProjectType {
    pub const ALL: [ProjectType; 3] = [ProjectType::Package, ProjectType::Cli, ProjectType::Webapp];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Package => "package",
            ProjectType::Cli => "cli",
            ProjectType::Webapp => "webapp",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ProjectType::Package => "Reusable library with docs",
            ProjectType::Cli => "Command-line application with tests",
            ProjectType::Webapp => "Web application with routes and templates",
        }
    }
}

impl std::str::FromStr for ProjectType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "package" => Ok(ProjectType::Package),
            "cli" => Ok(ProjectType::Cli),
            "webapp" => Ok(ProjectType::Webapp),
            other => Err(format!(
                "invalid project type '{other}'. valid values: package, cli, webapp"
            )),
        }
    }
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_PYTHON_VERSION: &str = "3.12";
pub const DEFAULT_LICENSE: &str = "MIT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub project_type: ProjectType,
    pub author: String,
    #[serde(default)]
    pub email: Option<String>,
    pub description: String,
    pub python_version: String,
    pub license: String,
    pub git_init: bool,
}

impl ProjectConfig {
    /// Builds a config with defaults; `name` is normalized to lowercase
    /// kebab-case. Call [`crate::Validate::validate`] before using it.
    pub fn new(
        name: &str,
        project_type: ProjectType,
        author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: normalize_project_name(name),
            project_type,
            author: author.into(),
            email: None,
            description: description.into(),
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            license: DEFAULT_LICENSE.to_string(),
            git_init: true,
        }
    }

    /// Importable package name derived from the project name.
    pub fn package_name(&self) -> String {
        self.name.replace('-', "_")
    }
}

pub fn normalize_project_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// Whether `value` is a valid (ASCII) Python identifier.
pub fn is_python_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

/// `X.Y` or `X.Y.Z`, numeric components only.
pub fn is_python_version(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()))
}
