//! Path helpers for the package repository

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Get the path a package file should be written to, handling collisions
/// according to the specified action
///
/// Returns `Ok(None)` for [`FileCollisionAction::Skip`] when the file already
/// exists: the package was saved before and must not be written again.
///
/// # Examples
///
/// ```
/// use mass_download::utils::resolve_collision;
/// use mass_download::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/does-not-exist/package.zip");
/// let target = resolve_collision(path, FileCollisionAction::Rename).unwrap();
/// assert_eq!(target.as_deref(), Some(path));
/// ```
pub fn resolve_collision(path: &Path, action: FileCollisionAction) -> Result<Option<PathBuf>> {
    match action {
        FileCollisionAction::Overwrite => Ok(Some(path.to_path_buf())),
        FileCollisionAction::Skip => {
            if path.exists() {
                Ok(None)
            } else {
                Ok(Some(path.to_path_buf()))
            }
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(Some(path.to_path_buf()));
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                Error::Other(format!("cannot extract file stem of {}", path.display()))
            })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().ok_or_else(|| {
                Error::Other(format!("cannot extract parent of {}", path.display()))
            })?;

            // Try adding (1), (2), (3), ... until we find a unique name
            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(Some(new_path));
                }
            }

            Err(Error::Other(format!(
                "could not find a unique name for {} after {} attempts",
                path.display(),
                MAX_RENAME_ATTEMPTS
            )))
        }
    }
}

/// Make an identifier safe to use as a single path component
///
/// Separators, `..` and control characters are replaced by `_`.
///
/// ```
/// use mass_download::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("ABC-123_01"), "ABC-123_01");
/// assert_eq!(sanitize_component("../etc/passwd"), "_._etc_passwd");
/// ```
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.replace("..", "_.");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
