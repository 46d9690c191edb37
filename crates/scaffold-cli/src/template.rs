//! Project templates and `{{ key }}` placeholder rendering.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use scaffold_core::{ProjectConfig, ProjectType};

/// Path segment replaced by the project's package name.
pub const PACKAGE_NAME_SEGMENT: &str = "__package_name__";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template {template} references unknown placeholder '{key}'")]
    UnknownPlaceholder { template: String, key: String },
    #[error("template {template} has an unclosed placeholder")]
    Unclosed { template: String },
    #[error("template {template} has an empty placeholder")]
    EmptyPlaceholder { template: String },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A template bundled into the binary and the project path it renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateFile {
    pub name: &'static str,
    pub destination: &'static str,
    pub content: &'static str,
}

macro_rules! template {
    ($name:literal, $destination:literal) => {
        TemplateFile {
            name: $name,
            destination: $destination,
            content: include_str!(concat!("../templates/", $name, ".tmpl")),
        }
    };
}

pub const PRE_COMMIT_TEMPLATE: TemplateFile =
    template!("base/pre-commit-config.yaml", ".pre-commit-config.yaml");
pub const GITIGNORE_TEMPLATE: TemplateFile = template!("base/gitignore", ".gitignore");

const BASE_TEMPLATES: &[TemplateFile] = &[
    template!("base/pyproject.toml", "pyproject.toml"),
    PRE_COMMIT_TEMPLATE,
    GITIGNORE_TEMPLATE,
    template!("base/python-version", ".python-version"),
    template!("base/README.md", "README.md"),
    template!("base/init.py", "src/__package_name__/__init__.py"),
];

const PACKAGE_TEMPLATES: &[TemplateFile] = &[template!("package/docs_index.md", "docs/index.md")];

const CLI_TEMPLATES: &[TemplateFile] = &[
    template!("cli/cli.py", "src/__package_name__/cli.py"),
    template!("cli/core.py", "src/__package_name__/core.py"),
    template!("cli/test_cli.py", "tests/test_cli.py"),
];

const WEBAPP_TEMPLATES: &[TemplateFile] = &[
    template!("webapp/main.py", "src/__package_name__/main.py"),
    template!("webapp/routes.py", "src/__package_name__/routes.py"),
    template!("webapp/base.html", "src/__package_name__/templates/base.html"),
    template!("webapp/test_main.py", "tests/test_main.py"),
];

/// Files created empty in every project.
pub const EMPTY_FILES: &[&str] = &["src/__package_name__/py.typed", "tests/__init__.py"];

/// Infrastructure files regenerated by `bulk upgrade`.
pub const INFRASTRUCTURE_TEMPLATES: &[TemplateFile] = &[PRE_COMMIT_TEMPLATE, GITIGNORE_TEMPLATE];

pub fn template_files(project_type: ProjectType) -> Vec<TemplateFile> {
    let extra = match project_type {
        ProjectType::Package => PACKAGE_TEMPLATES,
        ProjectType::Cli => CLI_TEMPLATES,
        ProjectType::Webapp => WEBAPP_TEMPLATES,
    };
    BASE_TEMPLATES.iter().chain(extra).copied().collect()
}

/// Placeholder values available to every template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn for_project(config: &ProjectConfig) -> Self {
        let package_name = config.package_name();
        let email = config.email.clone().unwrap_or_default();
        let authors = if email.is_empty() {
            format!("{{ name = {} }}", toml_string(&config.author))
        } else {
            format!(
                "{{ name = {}, email = {} }}",
                toml_string(&config.author),
                toml_string(&email)
            )
        };

        let (dependencies, scripts) = match config.project_type {
            ProjectType::Package => (String::new(), String::new()),
            ProjectType::Cli => (
                String::new(),
                format!(
                    "\n[project.scripts]\n{} = \"{package_name}.cli:main\"",
                    config.name
                ),
            ),
            ProjectType::Webapp => (
                "\"fastapi>=0.115\", \"uvicorn>=0.30\", \"httpx>=0.27\"".to_string(),
                String::new(),
            ),
        };

        let mut context = Self::default();
        context
            .insert("project_name", &config.name)
            .insert("package_name", &package_name)
            .insert("author", &config.author)
            .insert("email", &email)
            .insert("description", &config.description)
            .insert("python_version", &config.python_version)
            .insert("python_version_nodot", config.python_version.replace('.', ""))
            .insert("license", &config.license)
            .insert("year", chrono::Local::now().year().to_string())
            .insert("project_type", config.project_type.as_str())
            .insert("toml_description", toml_string(&config.description))
            .insert("toml_authors", authors)
            .insert("toml_dependencies", dependencies)
            .insert("toml_scripts", scripts);
        context
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Replace every `{{ key }}` in `input`; `template` names the source in errors.
pub fn render(template: &str, input: &str, context: &TemplateContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find("}}").ok_or_else(|| TemplateError::Unclosed {
            template: template.to_string(),
        })?;
        let key = after[..close].trim();
        if key.is_empty() {
            return Err(TemplateError::EmptyPlaceholder {
                template: template.to_string(),
            });
        }
        let value = context
            .get(key)
            .ok_or_else(|| TemplateError::UnknownPlaceholder {
                template: template.to_string(),
                key: key.to_string(),
            })?;
        out.push_str(value);
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// A rendered file, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
}

pub fn destination_path(destination: &str, package_name: &str) -> PathBuf {
    PathBuf::from(destination.replace(PACKAGE_NAME_SEGMENT, package_name))
}

/// Render the full file set for `config` without touching the filesystem.
pub fn render_project(config: &ProjectConfig) -> Result<Vec<RenderedFile>, TemplateError> {
    let context = TemplateContext::for_project(config);
    let package_name = config.package_name();

    let mut files = Vec::new();
    for template in template_files(config.project_type) {
        files.push(RenderedFile {
            path: destination_path(template.destination, &package_name),
            content: render(template.name, template.content, &context)?,
        });
    }
    for empty in EMPTY_FILES {
        files.push(RenderedFile {
            path: destination_path(empty, &package_name),
            content: String::new(),
        });
    }
    Ok(files)
}

/// Render and write every project file under `output_dir`, returning the
/// written paths.
pub fn enumerate_and_render(
    config: &ProjectConfig,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, TemplateError> {
    let mut written = Vec::new();
    for file in render_project(config)? {
        let path = output_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| TemplateError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, file.content).map_err(|source| TemplateError::Write {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    tracing::debug!(dir = %output_dir.display(), files = written.len(), "rendered project templates");
    Ok(written)
}

/// Sorted relative paths `enumerate_and_render` would write.
pub fn preview(config: &ProjectConfig) -> Result<Vec<PathBuf>, TemplateError> {
    let mut paths: Vec<PathBuf> = render_project(config)?
        .into_iter()
        .map(|file| file.path)
        .collect();
    paths.sort();
    Ok(paths)
}
