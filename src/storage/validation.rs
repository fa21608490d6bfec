//! Path validation
//!
//! Resolves client-supplied paths against a session's working directory and
//! home directory. A path is accepted only if its canonical form, with `..`
//! and symlinks resolved, stays inside the home directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// A client path resolved inside the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical location on disk.
    pub real: PathBuf,
    /// Absolute path as the client sees it, rooted at the home directory.
    pub virtual_path: String,
}

/// Joins `arg` onto `cwd` and normalizes `.` and `..`.
///
/// Absolute arguments start from the virtual root. Returns `None` when the
/// path climbs above the root.
pub fn resolve_virtual_path(cwd: &str, arg: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    let base = if arg.starts_with('/') { "" } else { cwd };

    for component in base.split('/').chain(arg.split('/')) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }

    Some(format!("/{}", parts.join("/")))
}

/// Maps a virtual path onto the home directory without touching the disk.
pub fn virtual_to_real_path(jailed_root: &Path, virtual_path: &str) -> PathBuf {
    jailed_root.join(virtual_path.trim_start_matches('/'))
}

/// Resolves `arg` relative to `cwd` and checks the result stays in
/// `jailed_root`, which must itself be canonical.
///
/// The target need not exist (STOR creates it), but its deepest existing
/// ancestor is canonicalized so symlinked directories cannot lead outside.
/// Dangling symlinks are refused, since writing through them could create
/// files anywhere.
pub async fn resolve_in_jail(
    jailed_root: &Path,
    cwd: &str,
    arg: &str,
) -> Result<ResolvedPath, PathError> {
    let virtual_path =
        resolve_virtual_path(cwd, arg).ok_or_else(|| PathError::EscapesJail(arg.to_string()))?;
    let lexical = virtual_to_real_path(jailed_root, &virtual_path);

    let mut probe = lexical.clone();
    let mut missing = Vec::new();
    let canonical = loop {
        match tokio::fs::canonicalize(&probe).await {
            Ok(existing) => {
                break missing.iter().rev().fold(existing, |acc: PathBuf, name| acc.join(name));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if tokio::fs::symlink_metadata(&probe).await.is_ok() {
                    return Err(PathError::EscapesJail(virtual_path));
                }
                match (probe.file_name(), probe.parent()) {
                    (Some(name), Some(parent)) => {
                        missing.push(name.to_os_string());
                        probe = parent.to_path_buf();
                    }
                    _ => {
                        return Err(PathError::Io {
                            path: virtual_path,
                            source: e,
                        });
                    }
                }
            }
            Err(e) => {
                return Err(PathError::Io {
                    path: virtual_path,
                    source: e,
                });
            }
        }
    };

    if !canonical.starts_with(jailed_root) {
        return Err(PathError::EscapesJail(virtual_path));
    }

    Ok(ResolvedPath {
        real: canonical,
        virtual_path,
    })
}
