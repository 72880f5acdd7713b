use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::trace;

use super::file_scanner::{is_hidden, ScanConfig};
use crate::models::Album;
use crate::render::{AlbumPopulator, CountGridPopulator, HeadlessNode};

/// Fills album cards from the album's directory listing.
///
/// The card footprint is the thumbnail grid the listing would produce; the
/// listing itself is what a toolkit would hand to its thumbnail loader.
#[derive(Debug, Clone)]
pub struct FolderPopulator {
    root: PathBuf,
    config: ScanConfig,
    grid: CountGridPopulator,
}

impl FolderPopulator {
    pub fn new(root: impl Into<PathBuf>, config: ScanConfig) -> Self {
        Self {
            root: root.into(),
            config,
            grid: CountGridPopulator::default(),
        }
    }

    pub fn with_grid(mut self, grid: CountGridPopulator) -> Self {
        self.grid = grid;
        self
    }

    pub fn album_dir(&self, album: &Album) -> PathBuf {
        self.root.join(&album.key)
    }

    /// Media files directly inside `dir`, sorted by path.
    async fn list_media(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to open album directory {:?}", dir))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {:?}", dir))?
        {
            if is_hidden(&entry.file_name()) {
                continue;
            }
            let path = entry.path();
            if entry.file_type().await.is_ok_and(|t| t.is_file()) && self.config.is_media(&path) {
                entries.push(path);
            }
        }
        entries.sort();
        Ok(entries)
    }
}

impl AlbumPopulator<HeadlessNode> for FolderPopulator {
    type Content = Vec<PathBuf>;

    async fn fetch(&self, album: &Album) -> anyhow::Result<Vec<PathBuf>> {
        let dir = self.album_dir(album);
        let entries = self.list_media(&dir).await?;
        trace!(key = %album.key, entries = entries.len(), "Listed album");
        Ok(entries)
    }

    fn fill(&self, node: &HeadlessNode, album: &Album, entries: Vec<PathBuf>) -> bool {
        node.set_label(format!("{} ({})", album.name, entries.len()));
        node.set_height(self.grid.card_height(entries.len()))
    }

    fn placeholder(&self, node: &HeadlessNode, album: &Album) {
        self.grid.placeholder(node, album);
    }
}
