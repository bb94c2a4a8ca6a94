//! Path traversal and filename safety checks shared by the validator and
//! the local storage backend. Grounded in the "secure path" checks of the
//! system this pipeline's validator whitelist was distilled from: reject
//! dangerous characters, cap length, canonicalize, and require the result
//! to resolve under one of the allowed base directories.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

const MAX_PATH_LENGTH: usize = 4096;

static SAFE_FILENAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.\-]+$").unwrap());

pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && SAFE_FILENAME_REGEX.is_match(name)
}

/// Reject a relative path containing `..` components, dangerous characters,
/// or exceeding the max length, without touching the filesystem.
pub fn reject_traversal(relative_path: &str) -> Result<()> {
    if relative_path.len() > MAX_PATH_LENGTH {
        return Err(Error::security("path exceeds maximum length").with_field("path"));
    }
    if crate::validator::rules::contains_dangerous_chars(relative_path) {
        return Err(Error::security("path contains disallowed characters").with_field("path"));
    }
    let path = Path::new(relative_path);
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(Error::security("path traversal is not permitted").with_field("path"));
            }
            Component::Prefix(_) | Component::RootDir => {
                // Absolute paths are allowed here; the base-directory check
                // below is what actually constrains them.
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

/// Canonicalize `relative_path` under `base_dir` and verify the result still
/// resolves inside it. `base_dir` is assumed already canonical (checked once
/// at backend construction).
pub fn resolve_under_base(base_dir: &Path, relative_path: &str) -> Result<PathBuf> {
    reject_traversal(relative_path)?;
    let joined = base_dir.join(relative_path.trim_start_matches('/'));

    // Canonicalize lexically (without touching the filesystem, since the
    // path may not exist yet for a write target) by normalizing `.`/`..`.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(
                        Error::security("path traversal is not permitted").with_field("path")
                    );
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if !normalized.starts_with(base_dir) {
        return Err(Error::security("path escapes the configured base directory").with_field("path"));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_traversal() {
        let base = Path::new("/srv/media");
        assert!(resolve_under_base(base, "../etc/passwd").is_err());
        assert!(resolve_under_base(base, "a/../../etc/passwd").is_err());
    }

    #[test]
    fn accepts_simple_relative_path() {
        let base = Path::new("/srv/media");
        let resolved = resolve_under_base(base, "inputs/a.mp4").unwrap();
        assert_eq!(resolved, Path::new("/srv/media/inputs/a.mp4"));
    }

    #[test]
    fn filename_safety() {
        assert!(is_safe_filename("clip-01.mp4"));
        assert!(!is_safe_filename("clip;rm -rf.mp4"));
        assert!(!is_safe_filename(""));
    }
}
