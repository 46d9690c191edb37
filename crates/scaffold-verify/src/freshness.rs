//! Latest content-modification time of a repository.

use chrono::{DateTime, Utc};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Directory names whose contents never count as source changes.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".tox",
    ".nox",
    ".cache",
    "node_modules",
    "build",
    "dist",
    "htmlcov",
    ".eggs",
];

pub fn is_ignored_dir_name(name: &str) -> bool {
    IGNORED_DIRS.contains(&name) || name.ends_with(".egg-info")
}

/// True for non-root directories on the denylist.
pub(crate) fn is_ignored_entry(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(is_ignored_dir_name)
}

/// Newest modification time among regular files under `repo`, skipping
/// denylisted subtrees. `None` when there is no eligible file.
pub fn latest_content_mtime(repo: &Path) -> Option<DateTime<Utc>> {
    let mut latest: Option<DateTime<Utc>> = None;
    let mut scanned = 0usize;

    for entry in WalkDir::new(repo)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_ignored_entry(entry))
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = match entry.metadata().ok().and_then(|meta| meta.modified().ok()) {
            Some(modified) => DateTime::<Utc>::from(modified),
            None => continue,
        };
        scanned += 1;
        if latest.map_or(true, |current| modified > current) {
            latest = Some(modified);
        }
    }

    tracing::debug!(repo = %repo.display(), files = scanned, latest = ?latest, "scanned repository");
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Duration;

    fn file_mtime(path: &Path) -> DateTime<Utc> {
        DateTime::<Utc>::from(
            fs::metadata(path)
                .expect("metadata")
                .modified()
                .expect("mtime"),
        )
    }

    #[test]
    fn returns_newest_file_time() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("file1.py"), "content1").expect("write 1");
        thread::sleep(Duration::from_millis(50));
        fs::create_dir_all(tmp.path().join("src/pkg")).expect("mkdir");
        fs::write(tmp.path().join("src/pkg/file2.py"), "content2").expect("write 2");

        let latest = latest_content_mtime(tmp.path()).expect("some mtime");
        assert_eq!(latest, file_mtime(&tmp.path().join("src/pkg/file2.py")));
        assert!(Utc::now() - latest < chrono::Duration::minutes(1));
    }

    #[test]
    fn skips_cache_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("important.py"), "content").expect("write");
        thread::sleep(Duration::from_millis(50));

        for dir in ["__pycache__", ".venv/lib", ".git/objects", "pkg.egg-info"] {
            let cache = tmp.path().join(dir);
            fs::create_dir_all(&cache).expect("mkdir cache");
            fs::write(cache.join("cached.bin"), "cached").expect("write cache");
        }

        let latest = latest_content_mtime(tmp.path()).expect("some mtime");
        assert_eq!(latest, file_mtime(&tmp.path().join("important.py")));
    }

    #[test]
    fn empty_or_cache_only_repository_has_no_mtime() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert_eq!(latest_content_mtime(tmp.path()), None);

        fs::create_dir_all(tmp.path().join(".pytest_cache")).expect("mkdir");
        fs::write(tmp.path().join(".pytest_cache/v"), "x").expect("write");
        fs::create_dir_all(tmp.path().join("empty_dir")).expect("mkdir");
        assert_eq!(latest_content_mtime(tmp.path()), None);
    }

    #[test]
    fn repository_root_named_like_cache_dir_is_still_scanned() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("build");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("main.py"), "print()").expect("write");

        assert!(latest_content_mtime(&root).is_some());
    }

    #[test]
    fn ignored_name_rules() {
        assert!(is_ignored_dir_name("__pycache__"));
        assert!(is_ignored_dir_name("scaffold.egg-info"));
        assert!(!is_ignored_dir_name("src"));
        assert!(!is_ignored_dir_name("tests"));
    }
}
