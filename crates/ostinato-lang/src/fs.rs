//! Case-insensitive path resolution and stable file identities.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Outcome of [`case_resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every component matched with its exact case.
    Exact(PathBuf),
    /// Resolved after at least one case-insensitive component match.
    Inexact(PathBuf),
    NotFound,
}

impl Resolution {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Resolution::Exact(p) | Resolution::Inexact(p) => Some(p),
            Resolution::NotFound => None,
        }
    }
}

/// Resolve `rel` under `base`, matching each component exactly first and
/// falling back to a case-insensitive directory scan.
pub fn case_resolve(base: &Path, rel: &str) -> Resolution {
    let mut current = base.to_path_buf();
    let mut inexact = false;

    for comp in rel.split(['/', '\\']).filter(|c| !c.is_empty() && *c != ".") {
        let direct = current.join(comp);
        if direct.exists() {
            current = direct;
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&current) else {
            return Resolution::NotFound;
        };
        let mut found = None;
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(comp) {
                found = Some(entry.path());
                break;
            }
        }
        match found {
            Some(path) => {
                inexact = true;
                current = path;
            }
            None => return Resolution::NotFound,
        }
    }

    if inexact {
        Resolution::Inexact(current)
    } else {
        Resolution::Exact(current)
    }
}

/// Locate a file named `name` (case-insensitive) anywhere under `root`.
/// The walk is breadth-first with sorted entries so results are stable.
pub fn find_file_recursive(root: &Path, name: &str) -> Option<PathBuf> {
    let mut queue = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                queue.push_back(path);
            } else if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
                return Some(path);
            }
        }
    }
    None
}

/// A stable per-file key used to deduplicate imports. Two paths naming the
/// same on-disk file compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity(Identity);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    #[cfg(unix)]
    DevIno(u64, u64),
    Path(String),
}

impl FileIdentity {
    pub fn of(path: &Path) -> std::io::Result<FileIdentity> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta = std::fs::metadata(path)?;
            Ok(FileIdentity(Identity::DevIno(meta.dev(), meta.ino())))
        }
        #[cfg(not(unix))]
        {
            let canon = std::fs::canonicalize(path)?;
            Ok(FileIdentity(Identity::Path(
                canon.to_string_lossy().to_ascii_lowercase(),
            )))
        }
    }

    /// Identity for tests and in-memory sources without a backing file.
    pub fn synthetic(tag: &str) -> FileIdentity {
        FileIdentity(Identity::Path(format!("<synthetic:{tag}>")))
    }
}
