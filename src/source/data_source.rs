//! Ordered, filterable album sequence with an index-based invalidation protocol.
//!
//! Every structural mutation re-sorts before computing the index it reports,
//! so emitted indices are always post-mutation positions.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{BrowserError, Result};
use crate::events::{AlbumListEvent, EventHub, Subscription};
use crate::models::{Album, AlbumChange, AlbumFilter, Section, SortOrder};

/// Read-only, index-based view of the album sequence consumed by the renderer.
pub trait AlbumIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails with [`BrowserError::OutOfBounds`] for any index `>= len()`.
    fn album_at(&self, index: usize) -> Result<Album>;

    /// Linear scan; `None` when the album is not in the (filtered) sequence.
    fn index_of_key(&self, key: &str) -> Option<usize>;
}

pub type SharedDataSource = Arc<RwLock<AlbumDataSource>>;

pub struct AlbumDataSource {
    /// Every album known to the feed, filtered or not.
    all: Vec<Album>,
    /// Filtered view of `all`, always in sort order.
    sequence: Vec<Album>,
    filter: Option<AlbumFilter>,
    sort: SortOrder,
    events: EventHub<AlbumListEvent>,
}

impl AlbumDataSource {
    pub fn new(sort: SortOrder) -> Self {
        Self {
            all: Vec::new(),
            sequence: Vec::new(),
            filter: None,
            sort,
            events: EventHub::new(),
        }
    }

    pub fn shared(self) -> SharedDataSource {
        Arc::new(RwLock::new(self))
    }

    pub fn subscribe(&self) -> (Subscription, flume::Receiver<AlbumListEvent>) {
        self.events.subscribe()
    }

    /// Forwards a sidebar selection to every listener.
    pub fn select(&self, album: Album) {
        self.events.emit(AlbumListEvent::Selected { album });
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    pub fn albums(&self) -> &[Album] {
        &self.sequence
    }

    /// Replaces the whole collection. Listeners see a full reset.
    pub fn resync(&mut self, albums: Vec<Album>) -> Option<AlbumListEvent> {
        let event = self.replace_all(albums);
        self.emit(event)
    }

    pub fn set_filter(&mut self, filter: Option<&str>) -> Option<AlbumListEvent> {
        self.filter = filter.and_then(AlbumFilter::new);
        self.sort_albums();
        self.emit(Some(AlbumListEvent::InvalidateFrom { index: 0, to: None }))
    }

    /// Every index may move, so listeners get [`AlbumListEvent::Reordered`]
    /// and re-anchor by key rather than by position.
    pub fn set_sort(&mut self, sort: SortOrder) -> Option<AlbumListEvent> {
        if sort == self.sort {
            return None;
        }
        self.sort = sort;
        self.sort_albums();
        debug!(?sort, "Sort order changed");
        self.emit(Some(AlbumListEvent::Reordered))
    }

    pub fn add_album(&mut self, album: Album) -> Option<AlbumListEvent> {
        let event = self.insert(album);
        self.emit(event)
    }

    pub fn remove_album(&mut self, album: &Album) -> Option<AlbumListEvent> {
        let event = self.remove(album);
        self.emit(event)
    }

    pub fn updated_album(&mut self, album: Album) -> Option<AlbumListEvent> {
        let event = self.replace(album.clone(), album);
        self.emit(event)
    }

    pub fn moved_album(&mut self, from: &Album, to: Album) -> Option<AlbumListEvent> {
        let event = self.replace(from.clone(), to);
        self.emit(event)
    }

    /// Applies a batch from the change feed and emits a single coalesced event.
    pub fn apply_changes(&mut self, changes: Vec<AlbumChange>) -> Option<AlbumListEvent> {
        let mut events = Vec::with_capacity(changes.len());
        for change in changes {
            let event = match change {
                AlbumChange::Albums(albums) => self.replace_all(albums),
                AlbumChange::Added(album) => self.insert(album),
                AlbumChange::Deleted(album) => self.remove(&album),
                AlbumChange::InfoUpdated(album) => self.replace(album.clone(), album),
                AlbumChange::Moved { from, to } => self.replace(from, to),
            };
            events.extend(event);
        }
        self.emit(coalesce(&events))
    }

    /// Separator to show above the album at `index`, if any.
    ///
    /// The first album of each group (shortcuts, then regular albums) gets
    /// the group label. Inside the regular group a new year gets its own
    /// separator.
    pub fn section_at(&self, index: usize) -> Result<Option<Section>> {
        let album = self.album_at(index)?;
        let previous = index.checked_sub(1).map(|i| &self.sequence[i]);
        let section = match previous {
            Some(prev) if prev.is_shortcut() == album.is_shortcut() => {
                (!album.is_shortcut() && prev.year() != album.year())
                    .then(|| Section::Year(album.year().to_string()))
            }
            _ if album.is_shortcut() => Some(Section::Shortcuts),
            _ => Some(Section::Albums),
        };
        Ok(section)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn album_at(&self, index: usize) -> Result<Album> {
        self.sequence
            .get(index)
            .cloned()
            .ok_or(BrowserError::OutOfBounds {
                index,
                len: self.sequence.len(),
            })
    }

    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.sequence.iter().position(|a| a.key == key)
    }

    /// Looks an album up by key among the visible albums.
    pub fn album_by_key(&self, key: &str) -> Result<Album> {
        self.sequence
            .iter()
            .find(|a| a.key == key)
            .cloned()
            .ok_or_else(|| BrowserError::UnknownAlbum(key.to_string()))
    }

    fn emit(&self, event: Option<AlbumListEvent>) -> Option<AlbumListEvent> {
        if let Some(event) = &event {
            trace!(?event, "Emitting album list event");
            self.events.emit(event.clone());
        }
        event
    }

    fn replace_all(&mut self, albums: Vec<Album>) -> Option<AlbumListEvent> {
        let mut seen = HashSet::with_capacity(albums.len());
        let before = albums.len();
        self.all = albums
            .into_iter()
            .filter(|a| seen.insert(a.key.clone()))
            .collect();
        if self.all.len() != before {
            debug!(dropped = before - self.all.len(), "Ignored duplicate album keys");
        }
        self.sort_albums();
        debug!(albums = self.all.len(), visible = self.sequence.len(), "Resynced album list");
        Some(AlbumListEvent::InvalidateFrom { index: 0, to: None })
    }

    fn insert(&mut self, album: Album) -> Option<AlbumListEvent> {
        if self.all.iter().any(|a| a.key == album.key) {
            trace!(key = %album.key, "Album already known");
            return None;
        }
        let key = album.key.clone();
        self.all.push(album);
        self.sort_albums();
        // Filtered-out albums change nothing visible.
        let index = self.index_of_key(&key)?;
        Some(AlbumListEvent::InvalidateFrom { index, to: None })
    }

    fn remove(&mut self, album: &Album) -> Option<AlbumListEvent> {
        self.all.retain(|a| a.key != album.key);
        let index = self.index_of_key(&album.key)?;
        self.sequence.remove(index);
        Some(AlbumListEvent::InvalidateFrom { index, to: None })
    }

    fn replace(&mut self, from: Album, to: Album) -> Option<AlbumListEvent> {
        if !self.all.iter().any(|a| a.key == from.key) {
            return self.insert(to);
        }
        let old_index = self.index_of_key(&from.key);
        self.all.retain(|a| a.key != from.key && a.key != to.key);
        let key = to.key.clone();
        self.all.push(to);
        self.sort_albums();
        let new_index = self.index_of_key(&key);

        match (old_index, new_index) {
            (Some(old), Some(new)) if old == new => Some(AlbumListEvent::InvalidateAt { index: old }),
            (Some(old), Some(new)) => Some(AlbumListEvent::InvalidateFrom {
                index: old.min(new),
                to: None,
            }),
            (Some(index), None) | (None, Some(index)) => {
                Some(AlbumListEvent::InvalidateFrom { index, to: None })
            }
            (None, None) => None,
        }
    }

    fn sort_albums(&mut self) {
        let filter = self.filter.as_ref();
        self.sequence = self
            .all
            .iter()
            .filter(|a| filter.map_or(true, |f| f.matches(a)))
            .cloned()
            .collect();
        self.sequence.sort_by(Album::listing_order);
        // Shortcuts stay on top in either direction.
        if self.sort == SortOrder::RecentFirst {
            let shortcuts = self.sequence.partition_point(Album::is_shortcut);
            self.sequence[shortcuts..].reverse();
        }
    }
}

impl AlbumIndex for RwLock<AlbumDataSource> {
    fn len(&self) -> usize {
        self.read().len()
    }

    fn album_at(&self, index: usize) -> Result<Album> {
        self.read().album_at(index)
    }

    fn index_of_key(&self, key: &str) -> Option<usize> {
        self.read().index_of_key(key)
    }
}

/// Collapses a batch of invalidations into the single event a windowed
/// consumer needs.
fn coalesce(events: &[AlbumListEvent]) -> Option<AlbumListEvent> {
    let first = events.first()?;
    if let AlbumListEvent::InvalidateAt { index } = first {
        let same_spot = events
            .iter()
            .all(|e| matches!(e, AlbumListEvent::InvalidateAt { index: i } if i == index));
        if same_spot {
            return Some(first.clone());
        }
    }
    let index = events
        .iter()
        .filter_map(|e| match e {
            AlbumListEvent::InvalidateAt { index } => Some(*index),
            AlbumListEvent::InvalidateFrom { index, .. } => Some(*index),
            AlbumListEvent::Selected { .. } | AlbumListEvent::Reordered => None,
        })
        .min()?;
    Some(AlbumListEvent::InvalidateFrom { index, to: None })
}
