use super::surface::VisualNode;
use crate::models::Album;

/// What a displayed node currently shows.
///
/// `generation` changes every time a node is (re)bound, so an asynchronous
/// fetch can tell whether the binding it started from is still current.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub index: usize,
    pub album: Album,
    pub generation: u64,
}

impl Binding {
    pub fn key(&self) -> &str {
        &self.album.key
    }
}

/// A node owned by the displayed list. Unbound nodes live in the pool.
#[derive(Debug, Clone)]
pub struct RenderElement<N> {
    pub node: N,
    pub binding: Binding,
}

impl<N: VisualNode> RenderElement<N> {
    pub fn index(&self) -> usize {
        self.binding.index
    }

    pub fn top(&self) -> f64 {
        self.node.top()
    }

    pub fn bottom(&self) -> f64 {
        self.node.bottom()
    }

    /// True when the element lies entirely outside `[top - margin, bottom + margin]`.
    pub fn is_outside(&self, top: f64, bottom: f64, margin: f64) -> bool {
        self.bottom() < top - margin || self.top() > bottom + margin
    }
}
