use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    /// An index outside `0..len` was requested from the data source.
    ///
    /// This means the renderer's window drifted out of sync with the
    /// sequence, so callers abort the current operation instead of clamping.
    #[error("album index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("unknown album: {0}")]
    UnknownAlbum(String),

    #[error("unknown sort order: {0:?}")]
    UnknownSortOrder(String),

    #[error("failed to scan {path:?}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, BrowserError>;
