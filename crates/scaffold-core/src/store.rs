use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use crate::types::{BulkCommand, CommandResult};

pub const STATUS_FILE_NAME: &str = "repo_status.jsonl";
pub const DEFAULT_STORAGE_DIR_NAME: &str = ".scaffold";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not determine home directory for the default result store")]
    NoHomeDir,
    #[error("failed to create storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize result for {repo}: {source}")]
    Serialize {
        repo: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to result log {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read result log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record at {path}:{line}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Optional filters applied by [`ResultStore::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
    pub command: Option<BulkCommand>,
    pub repo_path: Option<PathBuf>,
    pub limit: Option<usize>,
}

impl ResultFilter {
    pub fn command(mut self, command: BulkCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn repo(mut self, repo_path: impl Into<PathBuf>) -> Self {
        self.repo_path = Some(repo_path.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, result: &CommandResult) -> bool {
        if let Some(command) = self.command {
            if result.command != command {
                return false;
            }
        }
        if let Some(repo_path) = &self.repo_path {
            if &result.repo_path != repo_path {
                return false;
            }
        }
        true
    }
}

/// Append-only JSONL log of [`CommandResult`] records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    pub root: PathBuf,
    pub status_file: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let status_file = root.join(STATUS_FILE_NAME);
        Self { root, status_file }
    }

    /// Store under `~/.scaffold`.
    pub fn default_location() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::NoHomeDir)?;
        Ok(Self::new(home.join(DEFAULT_STORAGE_DIR_NAME)))
    }

    pub fn status_path(&self) -> &Path {
        self.status_file.as_path()
    }

    /// Append one record. The serialized line and its delimiter go out in a
    /// single append-mode write so concurrent writers never interleave lines.
    pub fn save(&self, result: &CommandResult) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::CreateDir {
            path: self.root.clone(),
            source,
        })?;

        let mut line = serde_json::to_string(result).map_err(|source| StoreError::Serialize {
            repo: result.repo_path.clone(),
            source,
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.status_file)
            .map_err(|source| StoreError::Append {
                path: self.status_file.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| StoreError::Append {
                path: self.status_file.clone(),
                source,
            })?;

        tracing::debug!(
            repo = %result.repo_path.display(),
            command = %result.command,
            exit_code = result.exit_code,
            "saved command result"
        );
        Ok(())
    }

    /// Lazily iterate over every record in insertion order.
    pub fn iter(&self) -> Result<ResultIter, StoreError> {
        if !self.status_file.exists() {
            return Ok(ResultIter {
                path: self.status_file.clone(),
                lines: None,
                line_no: 0,
            });
        }

        let file = File::open(&self.status_file).map_err(|source| StoreError::Read {
            path: self.status_file.clone(),
            source,
        })?;
        Ok(ResultIter {
            path: self.status_file.clone(),
            lines: Some(BufReader::new(file).lines()),
            line_no: 0,
        })
    }

    pub fn load(&self, filter: &ResultFilter) -> Result<Vec<CommandResult>, StoreError> {
        let mut results = Vec::new();
        if filter.limit == Some(0) {
            return Ok(results);
        }

        for record in self.iter()? {
            let record = record?;
            if !filter.matches(&record) {
                continue;
            }
            results.push(record);
            if filter.limit.is_some_and(|limit| results.len() >= limit) {
                break;
            }
        }
        Ok(results)
    }

    pub fn load_all(&self) -> Result<Vec<CommandResult>, StoreError> {
        self.load(&ResultFilter::default())
    }

    /// Newest record per repository for `command`. Equal timestamps resolve to
    /// the record inserted last.
    pub fn latest_by_repo(
        &self,
        command: BulkCommand,
    ) -> Result<BTreeMap<PathBuf, CommandResult>, StoreError> {
        let filter = ResultFilter::default().command(command);
        let mut latest: BTreeMap<PathBuf, CommandResult> = BTreeMap::new();
        for record in self.load(&filter)? {
            match latest.get(&record.repo_path) {
                Some(current) if current.timestamp > record.timestamp => {}
                _ => {
                    latest.insert(record.repo_path.clone(), record);
                }
            }
        }
        Ok(latest)
    }

    pub fn latest_for(
        &self,
        repo_path: &Path,
        command: BulkCommand,
    ) -> Result<Option<CommandResult>, StoreError> {
        let filter = ResultFilter::default().command(command).repo(repo_path);
        let mut latest: Option<CommandResult> = None;
        for record in self.load(&filter)? {
            if latest
                .as_ref()
                .map_or(true, |current| record.timestamp >= current.timestamp)
            {
                latest = Some(record);
            }
        }
        Ok(latest)
    }
}

/// Iterator returned by [`ResultStore::iter`]. Blank lines are skipped; a
/// malformed line yields [`StoreError::Malformed`].
pub struct ResultIter {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
}

impl Iterator for ResultIter {
    type Item = Result<CommandResult, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(StoreError::Read {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Some(serde_json::from_str(trimmed).map_err(|source| {
                StoreError::Malformed {
                    path: self.path.clone(),
                    line: self.line_no,
                    source,
                }
            }));
        }
    }
}
