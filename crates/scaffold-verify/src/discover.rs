use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::DiscoverError;
use crate::freshness::is_ignored_entry;

/// Directories under `root` (depth `<= max_depth`, root itself is depth 0)
/// that directly contain `marker`. Sorted, absolute, deduplicated.
///
/// Subtrees that cannot be read are left out rather than failing the walk.
pub fn discover_repositories(
    root: &Path,
    max_depth: usize,
    marker: &str,
) -> Result<Vec<PathBuf>, DiscoverError> {
    if !root.is_dir() {
        return Err(DiscoverError::InvalidRoot {
            path: root.to_path_buf(),
        });
    }
    let root = root
        .canonicalize()
        .map_err(|source| DiscoverError::Canonicalize {
            path: root.to_path_buf(),
            source,
        })?;

    let mut found = BTreeSet::new();
    let mut walker = WalkDir::new(&root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir());

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable path during discovery");
                continue;
            }
        };
        // A denylisted directory may itself be a project; its contents are not.
        let ignored = is_ignored_entry(&entry);
        if entry.path().join(marker).is_file() {
            found.insert(entry.path().to_path_buf());
        }
        if ignored {
            walker.skip_current_dir();
        }
    }

    tracing::debug!(root = %root.display(), max_depth, count = found.len(), "discovered repositories");
    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::discover_repositories;
    use crate::error::DiscoverError;
    use std::fs;
    use std::path::{Path, PathBuf};

    const MARKER: &str = "pyproject.toml";

    fn mk_repo(root: &Path, rel: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).expect("create repo dir");
        fs::write(dir.join(MARKER), "[project]\nname = \"x\"\n").expect("write marker");
        dir.canonicalize().expect("canonicalize")
    }

    #[test]
    fn respects_depth_bound() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let shallow = mk_repo(tmp.path(), "shallow");
        mk_repo(tmp.path(), "a/b/c/deep");

        let found = discover_repositories(tmp.path(), 2, MARKER).expect("discover");
        assert_eq!(found, vec![shallow]);
    }

    #[test]
    fn includes_root_and_nested_repositories_sorted() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = mk_repo(tmp.path(), "");
        let zeta = mk_repo(tmp.path(), "zeta");
        let alpha = mk_repo(tmp.path(), "alpha");
        let nested = mk_repo(tmp.path(), "alpha/packages/inner");

        let found = discover_repositories(tmp.path(), 3, MARKER).expect("discover");
        assert_eq!(found, vec![root.clone(), alpha, nested, zeta]);

        let root_only = discover_repositories(tmp.path(), 0, MARKER).expect("discover");
        assert_eq!(root_only, vec![root]);
    }

    #[test]
    fn ignores_marker_directories_inside_virtualenvs_and_marker_dirs() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let real = mk_repo(tmp.path(), "real");
        mk_repo(tmp.path(), "real/.venv/lib/site");
        fs::create_dir_all(tmp.path().join("fake").join(MARKER)).expect("marker as dir");

        let found = discover_repositories(tmp.path(), 5, MARKER).expect("discover");
        assert_eq!(found, vec![real]);
    }

    #[test]
    fn projects_named_like_cache_dirs_are_found_but_not_entered() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let app = mk_repo(tmp.path(), "app");
        let build = mk_repo(tmp.path(), "build");
        let dist = mk_repo(tmp.path(), "dist");
        let env = mk_repo(tmp.path(), "env");
        mk_repo(tmp.path(), "env/lib/vendored");

        let found = discover_repositories(tmp.path(), 3, MARKER).expect("discover");
        assert_eq!(found, vec![app, build, dist, env]);
    }

    #[test]
    fn rejects_missing_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let missing = tmp.path().join("missing");
        let err = discover_repositories(&missing, 2, MARKER).expect_err("missing root");
        assert!(matches!(err, DiscoverError::InvalidRoot { path } if path == missing));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subtree_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir");
        let visible = mk_repo(tmp.path(), "visible");
        let locked = tmp.path().join("locked");
        mk_repo(&locked, "hidden");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        let found = discover_repositories(tmp.path(), 3, MARKER);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("restore");
        let found = found.expect("discover");
        // Root bypasses permission bits, so only require the readable repo.
        assert!(found.contains(&visible));
    }
}
