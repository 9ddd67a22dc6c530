//! The bundle manifest: one line per file, `"<sha256-hex>  <relative-path>"`,
//! sorted by path. The manifest is the only thing the signature covers, so
//! its byte-exact form matters: any change to a listed file changes its
//! digest line, and any change to the manifest breaks the signature.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const MANIFEST_FILENAME: &str = "manifest.sync.txt";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("malformed manifest line: {0}")]
    MalformedLine(String),
    #[error("manifest entry path escapes the bundle root: {0}")]
    UnsafePath(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub digest: String,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse manifest text. Entry paths must stay inside the bundle.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let Some((digest, path)) = line.split_once("  ") else {
                return Err(ManifestError::MalformedLine(line.to_string()));
            };
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ManifestError::MalformedLine(line.to_string()));
            }
            if path.starts_with('/') || path.split('/').any(|part| part == "..") {
                return Err(ManifestError::UnsafePath(path.to_string()));
            }
            entries.push(ManifestEntry {
                digest: digest.to_string(),
                path: path.to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| format!("{}  {}", entry.digest, entry.path))
            .collect();
        lines.sort();
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Hex sha256 of a byte slice.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex sha256 of a file's contents.
pub fn file_digest(path: &Path) -> std::io::Result<String> {
    Ok(digest_bytes(&fs::read(path)?))
}

/// Compute and write the manifest for `files` (paths under `root`),
/// returning the manifest path. Call this last: the manifest must list the
/// final bytes of every file it covers.
pub fn write_manifest(root: &Path, files: &[PathBuf]) -> Result<PathBuf, ManifestError> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let rel = file
            .strip_prefix(root)
            .map_err(|_| ManifestError::UnsafePath(file.display().to_string()))?;
        let rel = rel
            .to_str()
            .ok_or_else(|| ManifestError::UnsafePath(file.display().to_string()))?
            .replace('\\', "/");
        entries.push(ManifestEntry {
            digest: file_digest(file)?,
            path: rel,
        });
    }
    let manifest = Manifest { entries };
    let manifest_path = root.join(MANIFEST_FILENAME);
    fs::write(&manifest_path, manifest.render())?;
    Ok(manifest_path)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_parse() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("users")).unwrap();
        fs::write(root.join("users/user_1.sync.txt"), b"alpha").unwrap();
        fs::write(root.join("zeta.sync.txt"), b"beta").unwrap();

        let files = vec![
            root.join("zeta.sync.txt"),
            root.join("users/user_1.sync.txt"),
        ];
        let manifest_path = write_manifest(root, &files).unwrap();
        let text = fs::read_to_string(&manifest_path).unwrap();

        // sorted by path, two-space separator
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  users/user_1.sync.txt"));
        assert!(lines[1].ends_with("  zeta.sync.txt"));

        let manifest = Manifest::parse(&text).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries()[0].digest, digest_bytes(b"alpha"));
    }

    #[test]
    fn test_parse_rejects_traversal() {
        let text = format!("{}  ../../etc/passwd\n", digest_bytes(b"x"));
        assert!(matches!(
            Manifest::parse(&text),
            Err(ManifestError::UnsafePath(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Manifest::parse("not a manifest line\n"),
            Err(ManifestError::MalformedLine(_))
        ));
    }
}
