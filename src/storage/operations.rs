//! Storage operations
//!
//! File system work behind LIST, RETR, STOR and CWD. Paths passed in have
//! already been resolved inside the session's home directory.

use chrono::{DateTime, Duration, Local};
use log::info;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs::{self, File};

use crate::error::PathError;
use crate::storage::validation::{ResolvedPath, resolve_in_jail};

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

fn io_error(path: &ResolvedPath, source: std::io::Error) -> PathError {
    if source.kind() == ErrorKind::NotFound {
        PathError::NotFound(path.virtual_path.clone())
    } else {
        PathError::Io {
            path: path.virtual_path.clone(),
            source,
        }
    }
}

/// Lists a directory, or describes a single file when `path` is a file.
/// Entries are sorted by name.
pub async fn list_entries(path: &ResolvedPath) -> Result<Vec<ListEntry>, PathError> {
    let metadata = fs::metadata(&path.real).await.map_err(|e| io_error(path, e))?;

    if !metadata.is_dir() {
        let name = path
            .real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![entry_from_metadata(name, &metadata)]);
    }

    let mut entries = Vec::new();
    let mut dir = fs::read_dir(&path.real).await.map_err(|e| io_error(path, e))?;
    while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(path, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Entries can vanish between readdir and stat.
        if let Ok(metadata) = entry.metadata().await {
            entries.push(entry_from_metadata(name, &metadata));
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    info!(
        "Listed {} (real: {}) - {} entries",
        path.virtual_path,
        path.real.display(),
        entries.len()
    );
    Ok(entries)
}

fn entry_from_metadata(name: String, metadata: &std::fs::Metadata) -> ListEntry {
    ListEntry {
        name,
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        is_dir: metadata.is_dir(),
    }
}

/// Renders entries in the `ls -l` layout most FTP clients parse.
pub fn format_listing(entries: &[ListEntry], now: DateTime<Local>) -> String {
    let mut out = String::new();
    for entry in entries {
        let modified: DateTime<Local> = entry.modified.into();
        let date = if now.signed_duration_since(modified) > Duration::days(180)
            || modified > now + Duration::hours(1)
        {
            modified.format("%b %e  %Y")
        } else {
            modified.format("%b %e %H:%M")
        };
        let perms = if entry.is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
        out.push_str(&format!(
            "{} 1 ftp ftp {:>12} {} {}\r\n",
            perms, entry.size, date, entry.name
        ));
    }
    out
}

/// Opens a regular file for RETR.
pub async fn open_for_retrieval(path: &ResolvedPath) -> Result<File, PathError> {
    let metadata = fs::metadata(&path.real).await.map_err(|e| io_error(path, e))?;
    if !metadata.is_file() {
        return Err(PathError::NotAFile(path.virtual_path.clone()));
    }
    File::open(&path.real).await.map_err(|e| io_error(path, e))
}

/// Creates or truncates a file for STOR. The parent directory must exist.
pub async fn create_for_storage(path: &ResolvedPath) -> Result<File, PathError> {
    if let Some(parent) = path.real.parent() {
        match fs::metadata(parent).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Err(PathError::NotADirectory(parent_virtual(&path.virtual_path))),
            Err(_) => return Err(PathError::NotFound(parent_virtual(&path.virtual_path))),
        }
    }
    if let Ok(m) = fs::metadata(&path.real).await {
        if m.is_dir() {
            return Err(PathError::NotAFile(path.virtual_path.clone()));
        }
    }
    File::create(&path.real).await.map_err(|e| io_error(path, e))
}

fn parent_virtual(virtual_path: &str) -> String {
    match virtual_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => virtual_path[..i].to_string(),
    }
}

/// Resolves a CWD target and checks it is an existing directory. Returns the
/// new virtual working directory.
pub async fn change_directory(
    jailed_root: &Path,
    cwd: &str,
    target: &str,
) -> Result<String, PathError> {
    let resolved = resolve_in_jail(jailed_root, cwd, target).await?;
    let metadata = fs::metadata(&resolved.real)
        .await
        .map_err(|e| io_error(&resolved, e))?;
    if !metadata.is_dir() {
        return Err(PathError::NotADirectory(resolved.virtual_path));
    }
    Ok(resolved.virtual_path)
}
