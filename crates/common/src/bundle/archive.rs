//! Bundle archives: a tar.gz per transfer.
//!
//! Extraction scans every member path before a single byte is written; an
//! absolute path or a `..` component anywhere aborts the whole extraction.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::manifest::MANIFEST_FILENAME;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive contains unsafe path: {0}")]
    UnsafePath(String),
    #[error("archive does not contain a bundle manifest")]
    MissingManifest,
    #[error("invalid bundle archive: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Every regular file under `root`, depth-first, in sorted order.
pub fn list_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.exists() {
        collect_files(root, &mut files)?;
    }
    files.sort();
    Ok(files)
}

/// Pack the directory tree at `root` into an in-memory tar.gz with
/// root-relative member names.
pub fn pack_bundle(root: &Path) -> Result<Vec<u8>, ArchiveError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for file in list_files(root)? {
        let rel = file
            .strip_prefix(root)
            .map_err(|_| ArchiveError::Invalid(file.display().to_string()))?;
        builder.append_path_with_name(&file, rel)?;
    }
    let encoder = builder
        .into_inner()
        .map_err(|e| ArchiveError::Invalid(e.to_string()))?;
    Ok(encoder
        .finish()
        .map_err(|e| ArchiveError::Invalid(e.to_string()))?)
}

fn member_is_safe(path: &Path) -> bool {
    path.components().all(|component| {
        matches!(component, Component::Normal(_) | Component::CurDir)
    })
}

/// Extract a bundle archive into `dest`.
///
/// The member list is validated in full before extraction begins, so a
/// crafted entry like `../../etc/passwd` never touches the filesystem.
pub fn extract_bundle(bytes: &[u8], dest: &Path) -> Result<(), ArchiveError> {
    // First pass: path safety over every member.
    let mut scan = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    for entry in scan
        .entries()
        .map_err(|e| ArchiveError::Invalid(e.to_string()))?
    {
        let entry = entry.map_err(|e| ArchiveError::Invalid(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| ArchiveError::Invalid(e.to_string()))?;
        if path.is_absolute() || !member_is_safe(&path) {
            return Err(ArchiveError::UnsafePath(path.display().to_string()));
        }
    }

    // Second pass: actual extraction.
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    for entry in archive
        .entries()
        .map_err(|e| ArchiveError::Invalid(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| ArchiveError::Invalid(e.to_string()))?;
        let rel = entry
            .path()
            .map_err(|e| ArchiveError::Invalid(e.to_string()))?
            .into_owned();
        let target = dest.join(&rel);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        fs::write(&target, contents)?;
    }
    Ok(())
}

/// Find the directory containing the bundle manifest, searching `dir` and
/// its subdirectories. Uploads sometimes nest the bundle one level deep.
pub fn locate_bundle_root(dir: &Path) -> Result<PathBuf, ArchiveError> {
    if dir.join(MANIFEST_FILENAME).exists() {
        return Ok(dir.to_path_buf());
    }
    for file in list_files(dir)? {
        if file.file_name().and_then(|name| name.to_str()) == Some(MANIFEST_FILENAME) {
            if let Some(parent) = file.parent() {
                return Ok(parent.to_path_buf());
            }
        }
    }
    Err(ArchiveError::MissingManifest)
}

/// Replace `dest` with a copy of the tree at `src`.
pub fn replace_dir(src: &Path, dest: &Path) -> std::io::Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;
    for file in list_files(src)? {
        let rel = file
            .strip_prefix(src)
            .expect("listed file is under its own root");
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file, &target)?;
    }
    Ok(())
}
