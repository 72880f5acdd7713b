//! Filesystem album discovery.
//!
//! An album is a directory that directly contains media files. The walk is
//! synchronous (walkdir) and runs on the blocking pool; successive walks are
//! diffed into the change feed consumed by the data source.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::task;
use tracing::{debug, info, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{BrowserError, Result};
use crate::models::{Album, AlbumChange};

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "heic", "webm", "mp4", "mkv", "avi", "mov",
];

/// Configuration for the album scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum directory depth (0 = unlimited).
    pub max_depth: usize,
    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,
    /// Lowercase file extensions counted as album entries.
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 0, // unlimited
            follow_symlinks: false,
            extensions: MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ScanConfig {
    pub fn is_media(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Walks `root` and returns one album per directory holding media files,
/// ordered by relative path.
///
/// Keys are paths relative to `root` (`"."` for the root itself). Hidden
/// files and directories are skipped. Unreadable subdirectories are logged
/// and skipped; an unreadable root is an error.
pub fn scan_albums(root: &Path, config: &ScanConfig) -> Result<Vec<Album>> {
    let mut walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    if config.max_depth > 0 {
        walker = walker.max_depth(config.max_depth);
    }

    let mut counts: BTreeMap<PathBuf, usize> = BTreeMap::new();
    let entries = walker
        .into_iter()
        .filter_entry(|e: &DirEntry| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(BrowserError::Scan {
                    path: root.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_dir() || !config.is_media(entry.path()) {
            continue;
        }
        if let Some(parent) = entry.path().parent() {
            *counts.entry(parent.to_path_buf()).or_default() += 1;
        }
    }

    let albums: Vec<Album> = counts
        .into_iter()
        .map(|(dir, count)| album_for(root, &dir, count))
        .collect();
    debug!(root = ?root, albums = albums.len(), "Walked album root");
    Ok(albums)
}

fn album_for(root: &Path, dir: &Path, count: usize) -> Album {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    let key = if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.to_string_lossy().into_owned()
    };
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.clone());
    trace!(%key, %name, count, "Discovered album");
    Album::new(key, name, count)
}

/// Changes turning the `old` walk into the `new` one.
///
/// Deletions come first, then additions and updates in `new` order.
pub fn diff_walks(old: &[Album], new: &[Album]) -> Vec<AlbumChange> {
    let previous: HashMap<&str, &Album> = old.iter().map(|a| (a.key.as_str(), a)).collect();
    let current: HashMap<&str, &Album> = new.iter().map(|a| (a.key.as_str(), a)).collect();

    let mut changes: Vec<AlbumChange> = old
        .iter()
        .filter(|a| !current.contains_key(a.key.as_str()))
        .map(|a| AlbumChange::Deleted(a.clone()))
        .collect();
    for album in new {
        match previous.get(album.key.as_str()) {
            None => changes.push(AlbumChange::Added(album.clone())),
            Some(before) if *before != album => changes.push(AlbumChange::InfoUpdated(album.clone())),
            Some(_) => {}
        }
    }
    changes
}

/// Rescans an album root, remembering the last walk to produce changes.
pub struct AlbumScanner {
    root: PathBuf,
    config: ScanConfig,
    last: Vec<Album>,
}

impl AlbumScanner {
    pub fn new(root: impl Into<PathBuf>, config: ScanConfig) -> Self {
        Self {
            root: root.into(),
            config,
            last: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Walks the root on the blocking pool and returns every album found.
    pub async fn scan(&mut self) -> anyhow::Result<Vec<Album>> {
        let root = self.root.clone();
        let config = self.config.clone();

        // Run the walk in a blocking task to avoid blocking the async runtime
        let albums = task::spawn_blocking(move || scan_albums(&root, &config))
            .await
            .context("Scan task panicked")?
            .with_context(|| format!("Failed to scan {:?}", self.root))?;

        info!(root = ?self.root, albums = albums.len(), "Scan complete");
        self.last = albums.clone();
        Ok(albums)
    }

    /// Walks again and returns what changed since the previous walk.
    pub async fn rescan(&mut self) -> anyhow::Result<Vec<AlbumChange>> {
        let previous = std::mem::take(&mut self.last);
        let albums = match self.scan().await {
            Ok(albums) => albums,
            Err(e) => {
                self.last = previous;
                return Err(e);
            }
        };
        let changes = diff_walks(&previous, &albums);
        debug!(changes = changes.len(), "Rescanned album root");
        Ok(changes)
    }
}
