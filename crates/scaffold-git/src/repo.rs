use std::path::Path;

use crate::command::GitCli;
use crate::error::GitError;

/// Full SHA of `HEAD`, or `None` when `repo` is not a git checkout, has no
/// commits yet, or git is unavailable.
pub fn head_revision(repo: &Path, git: &GitCli) -> Option<String> {
    match git.run(repo, ["rev-parse", "HEAD"]) {
        Ok(output) => {
            let sha = output.stdout.trim();
            if sha.is_empty() {
                None
            } else {
                Some(sha.to_string())
            }
        }
        Err(err) => {
            tracing::debug!(repo = %repo.display(), error = %err, "no git revision available");
            None
        }
    }
}

/// `git init` followed by `git add .`.
pub fn init_and_stage(repo: &Path, git: &GitCli) -> Result<(), GitError> {
    git.run(repo, ["init"])?;
    git.run(repo, ["add", "."])?;
    Ok(())
}
