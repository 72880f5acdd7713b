use super::Album;

/// A change reported by the album feed (filesystem walker or backend).
#[derive(Debug, Clone, PartialEq)]
pub enum AlbumChange {
    /// Full album list; replaces everything known so far.
    Albums(Vec<Album>),
    Added(Album),
    Deleted(Album),
    /// Count or metadata changed; the album normally keeps its position.
    InfoUpdated(Album),
    /// Renamed or re-keyed: `from` is replaced by `to`.
    Moved { from: Album, to: Album },
}
