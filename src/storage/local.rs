// src/storage/local.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, error};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Capacity, CapacityBackend, RemovableStream, Removal, stream_removals};

/// Directory levels walked below the root when no depth is requested.
pub const DEFAULT_TRAVERSE_DEPTH: usize = 2;

/// A file, or an empty directory, considered for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Recording directory on the local disk.
#[derive(Clone)]
pub struct LocalDrive {
    root: PathBuf,
    depth: usize,
    lease: Arc<Mutex<()>>,
}

impl LocalDrive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            depth: DEFAULT_TRAVERSE_DEPTH,
            lease: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Same drive walked `depth` levels deep. A depth of 0 keeps the
    /// current one. The eviction lease is shared with `self`.
    pub fn at_depth(&self, depth: usize) -> Self {
        let mut scoped = self.clone();
        if depth > 0 {
            scoped.depth = depth;
        }
        scoped
    }

    /// Removable entries below the root, oldest modification first. The
    /// root itself is never part of the result.
    pub fn scan(&self) -> anyhow::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        traverse(&self.root, self.depth, &mut entries)?;

        entries.retain(|entry| entry.path != self.root);
        entries.sort_by_key(|entry| entry.modified);

        Ok(entries)
    }

    fn removal_for(&self, entry: FileEntry) -> Removal {
        let label = entry.path.display().to_string();
        Removal::new(label, entry.size, move || async move {
            debug!(
                "[local] deleting {} ({} bytes)",
                entry.path.display(),
                entry.size
            );
            let removed = if entry.is_dir {
                tokio::fs::remove_dir(&entry.path).await
            } else {
                tokio::fs::remove_file(&entry.path).await
            };
            removed.with_context(|| format!("unable to delete {}", entry.path.display()))?;
            Ok(entry.size)
        })
    }
}

#[async_trait]
impl CapacityBackend for LocalDrive {
    fn name(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn available_capacity(&self) -> anyhow::Result<Capacity> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || fs2::available_space(&root))
            .await
            .context("free space query panicked")?
            .with_context(|| format!("unable to stat {}", self.root.display()))
    }

    async fn removables(&self, cancel: CancellationToken) -> anyhow::Result<RemovableStream> {
        let drive = self.clone();
        let entries = tokio::task::spawn_blocking(move || drive.scan())
            .await
            .context("directory scan panicked")??;

        debug!(
            "[local] {} removable entries under {} (depth {})",
            entries.len(),
            self.root.display(),
            self.depth
        );

        let removals = entries
            .into_iter()
            .map(|entry| self.removal_for(entry))
            .collect();

        Ok(stream_removals("local", removals, cancel))
    }

    fn eviction_lease(&self) -> Option<&Mutex<()>> {
        Some(&self.lease)
    }
}

/// Depth-bounded walk. An empty directory is itself an entry of size 0;
/// otherwise every leaf file is an entry.
fn traverse(dir: &Path, depth: usize, result: &mut Vec<FileEntry>) -> anyhow::Result<()> {
    let children = fs::read_dir(dir)
        .with_context(|| format!("unable to read dir {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("unable to read dir {}", dir.display()))?;

    if children.is_empty() {
        let meta = fs::symlink_metadata(dir)
            .with_context(|| format!("unable to get dir status {}", dir.display()))?;
        result.push(FileEntry {
            path: dir.to_path_buf(),
            size: 0,
            modified: meta.modified()?,
            is_dir: true,
        });
        return Ok(());
    }

    for child in children {
        let path = child.path();
        let file_type = child
            .file_type()
            .with_context(|| format!("unable to get file type {}", path.display()))?;

        if file_type.is_dir() {
            if depth > 0 {
                traverse(&path, depth - 1, result)?;
            }
            continue;
        }

        let meta = match child.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                error!("[local] error getting file info {}: {}", path.display(), e);
                return Err(e).context("error getting file info");
            }
        };

        result.push(FileEntry {
            path,
            size: meta.len(),
            modified: meta.modified()?,
            is_dir: false,
        });
    }

    Ok(())
}
