//! Build context materialization
//!
//! The whole project tree is copied, with no exclusion filter: hidden files,
//! documentation and build scripts land in the image like everything else.
//! Archives are deterministic (sorted entries, zeroed timestamps and owners) so
//! an unchanged tree always produces the same bytes and the same content hash.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    /// Path relative to the context root
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    entries: Vec<SourceEntry>,
}

impl SourceTree {
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Build context {} is not a directory", root.display());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry
                .with_context(|| format!("Failed to walk build context {}", root.display()))?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("{} escapes the build context", entry.path().display()))?
                .to_path_buf();

            let file_type = entry.file_type();
            let (kind, size) = if file_type.is_symlink() {
                (EntryKind::Symlink, 0)
            } else if file_type.is_dir() {
                (EntryKind::Directory, 0)
            } else {
                let metadata = entry
                    .metadata()
                    .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
                (EntryKind::File, metadata.len())
            };

            entries.push(SourceEntry {
                path: relative,
                kind,
                size,
            });
        }

        debug!(
            root = %root.display(),
            entries = entries.len(),
            "Scanned build context"
        );

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// True when `relative` names a regular file in the tree.
    pub fn contains_file(&self, relative: &Path) -> bool {
        let relative = relative.strip_prefix(".").unwrap_or(relative);
        self.entries
            .iter()
            .any(|e| e.kind == EntryKind::File && e.path == relative)
    }

    /// SHA-256 over every entry as archived: path, kind, mode and content.
    pub fn content_hash(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            match entry.kind {
                EntryKind::Directory => hasher.update(b"d"),
                EntryKind::File => {
                    let full_path = self.root.join(&entry.path);
                    let data = fs::read(&full_path).with_context(|| {
                        format!("Failed to read {}", entry.path.display())
                    })?;
                    hasher.update(b"f");
                    hasher.update(file_mode(&full_path).to_le_bytes());
                    hasher.update((data.len() as u64).to_le_bytes());
                    hasher.update(&data);
                }
                EntryKind::Symlink => {
                    let target = fs::read_link(self.root.join(&entry.path)).with_context(|| {
                        format!("Failed to read link {}", entry.path.display())
                    })?;
                    hasher.update(b"l");
                    hasher.update(target.to_string_lossy().as_bytes());
                }
            }
            hasher.update([0u8]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Tar archive of the whole tree, paths relative to the context root.
    pub fn to_archive(&self) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());

        for entry in &self.entries {
            let full_path = self.root.join(&entry.path);
            let mut header = tar::Header::new_gnu();
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);

            match entry.kind {
                EntryKind::Directory => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    builder
                        .append_data(&mut header, &entry.path, std::io::empty())
                        .with_context(|| format!("Failed to archive {}", entry.path.display()))?;
                }
                EntryKind::File => {
                    let data = fs::read(&full_path)
                        .with_context(|| format!("Failed to read {}", full_path.display()))?;
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(file_mode(&full_path));
                    header.set_size(data.len() as u64);
                    builder
                        .append_data(&mut header, &entry.path, data.as_slice())
                        .with_context(|| format!("Failed to archive {}", entry.path.display()))?;
                }
                EntryKind::Symlink => {
                    let target = fs::read_link(&full_path)
                        .with_context(|| format!("Failed to read link {}", full_path.display()))?;
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_mode(0o777);
                    header.set_size(0);
                    builder
                        .append_link(&mut header, &entry.path, &target)
                        .with_context(|| format!("Failed to archive {}", entry.path.display()))?;
                }
            }
        }

        builder.into_inner().context("Failed to finish build context archive")
    }
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}

/// Single-file archive, used to place a verified installer inside a layer.
pub fn single_file_archive(name: &str, data: &[u8], mode: u32) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_size(data.len() as u64);
    builder
        .append_data(&mut header, name, data)
        .with_context(|| format!("Failed to archive {}", name))?;
    builder.into_inner().context("Failed to finish archive")
}
