use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::BrowserError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    NameAscending,
    /// Album names start with their date, so reversing the name order puts
    /// the most recent albums first.
    #[default]
    RecentFirst,
}

impl FromStr for SortOrder {
    type Err = BrowserError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" | "forward" | "forwarddate" => Ok(Self::NameAscending),
            "recent" | "reverse" | "reversedate" => Ok(Self::RecentFirst),
            _ => Err(BrowserError::UnknownSortOrder(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    /// Stable identity, unique across the library.
    pub key: String,
    pub name: String,
    /// Number of media entries in the album.
    pub count: usize,
    /// Keyboard shortcut assigned to the album. Shortcut albums are listed
    /// as their own group ahead of the others.
    pub shortcut: Option<String>,
}

impl Album {
    pub fn new(key: impl Into<String>, name: impl Into<String>, count: usize) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            count,
            shortcut: None,
        }
    }

    pub fn with_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }

    pub fn is_shortcut(&self) -> bool {
        self.shortcut.is_some()
    }

    /// Year prefix of the album name, used for section separators.
    pub fn year(&self) -> &str {
        match self.name.char_indices().nth(4) {
            Some((end, _)) => &self.name[..end],
            None => &self.name,
        }
    }

    /// Listing order before the sort direction is applied: shortcut albums
    /// first (by shortcut, then name), then every other album by name.
    pub fn listing_order(a: &Album, b: &Album) -> Ordering {
        let by_name = || a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key));
        match (&a.shortcut, &b.shortcut) {
            (Some(x), Some(y)) => x.cmp(y).then_with(by_name),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_name(),
        }
    }
}

/// Separator shown above an album in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// Start of the shortcut group.
    Shortcuts,
    /// Start of the regular albums.
    Albums,
    Year(String),
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Shortcuts => f.write_str("Shortcut"),
            Section::Albums => f.write_str("Album"),
            Section::Year(year) => f.write_str(year),
        }
    }
}

/// Lowercases and strips diacritics, so "Été" and "ete" compare equal.
fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Case- and accent-insensitive substring filter on album names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumFilter {
    needle: String,
}

impl AlbumFilter {
    /// Returns `None` for an empty or whitespace-only filter.
    pub fn new(text: &str) -> Option<Self> {
        let needle = fold(text.trim());
        if needle.is_empty() {
            None
        } else {
            Some(Self { needle })
        }
    }

    pub fn matches(&self, album: &Album) -> bool {
        fold(&album.name).contains(&self.needle)
    }
}
