use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("could not launch `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({}): {}", exit_label(.status), first_line(.stderr))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("git working directory does not exist: {path}")]
    NotADirectory { path: PathBuf },
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit {code}"),
        None => "killed by signal".to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
}

#[cfg(test)]
mod tests {
    use super::GitError;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn launch_failure_keeps_io_source() {
        let err = GitError::Io {
            command: "git init".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };

        assert_eq!(err.to_string(), "could not launch `git init`: no such file");
        assert!(err.source().is_some());
    }

    #[test]
    fn failed_command_shows_first_stderr_line() {
        let err = GitError::CommandFailed {
            command: "git rev-parse HEAD".to_string(),
            status: Some(128),
            stdout: String::new(),
            stderr: "\nfatal: ambiguous argument 'HEAD'\nUse '--' to separate paths\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`git rev-parse HEAD` failed (exit 128): fatal: ambiguous argument 'HEAD'"
        );

        let killed = GitError::CommandFailed {
            command: "git add .".to_string(),
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(
            killed.to_string(),
            "`git add .` failed (killed by signal): no error output"
        );
    }

    #[test]
    fn missing_directory_names_the_path() {
        let err = GitError::NotADirectory {
            path: PathBuf::from("/tmp/not-a-project"),
        };
        assert!(err.to_string().ends_with("/tmp/not-a-project"));
    }
}
