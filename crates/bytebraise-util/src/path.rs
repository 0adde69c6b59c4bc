use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::env::is_approved;

/// Search a colon-separated list of directories for `item`, returning the canonical path of the
/// first hit. With `executable`, only files with an execute bit count.
pub fn which<P: AsRef<str>, I: AsRef<Path>>(
    path: P,
    item: I,
    reversed: bool,
    executable: bool,
) -> Option<PathBuf> {
    let paths: Box<dyn Iterator<Item = &str>> = match reversed {
        false => Box::new(path.as_ref().split(':')),
        true => Box::new(path.as_ref().rsplit(':')),
    };

    paths
        .filter(|dir| !dir.is_empty())
        .map(|dir| PathBuf::from(dir).join(item.as_ref()))
        .find(|candidate| match candidate.metadata() {
            Ok(metadata) if executable => {
                metadata.is_file() && (metadata.permissions().mode() & 0o111) != 0
            }
            Ok(_) => true,
            Err(_) => false,
        })
        .map(|found| found.canonicalize().unwrap_or(found))
}

/// Shell-style wildcard match, as Python's `fnmatch.fnmatch` does it: `*` also matches `/`.
/// An invalid pattern only matches itself literally.
pub fn fnmatch(name: &str, pattern: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(name),
        Err(_) => name == pattern,
    }
}

pub fn remove_trailing_sep(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && !path.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Normalize a layer path for comparison: drop trailing separators and expand `~` when `HOME`
/// is an approved variable.
pub fn canonicalise_path(path: &str) -> String {
    let path = remove_trailing_sep(path);
    if path.contains('~') && is_approved("HOME") {
        if let Ok(home) = std::env::var("HOME") {
            if path == "~" {
                return home;
            }
            if let Some(rest) = path.strip_prefix("~/") {
                return format!("{}/{}", remove_trailing_sep(&home), rest);
            }
        }
    }
    path.to_string()
}

/// Absolute form of `path` without touching the filesystem beyond the current directory.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
