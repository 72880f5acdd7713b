//! Seams between the windowed renderer and the toolkit that draws albums.
//!
//! Nodes are cheap handles (think DOM element or widget reference): all
//! setters take `&self` and are synchronous.

use std::future::Future;

use crate::models::Album;

/// A positionable album card.
pub trait VisualNode: Clone + Send + Sync + 'static {
    fn top(&self) -> f64;
    fn set_top(&self, top: f64);
    fn opacity(&self) -> f64;
    fn set_opacity(&self, opacity: f64);
    fn measured_height(&self) -> f64;

    fn bottom(&self) -> f64 {
        self.top() + self.measured_height()
    }

    fn is_hidden(&self) -> bool {
        self.opacity() == 0.0
    }
}

/// The scrolling container albums are materialized into.
pub trait Viewport: Send + Sync + 'static {
    type Node: VisualNode;

    fn scroll_top(&self) -> f64;
    fn client_height(&self) -> f64;
    fn scroll_to(&self, top: f64);

    /// Allocates a fresh, detached node.
    fn create_node(&self) -> Self::Node;
    /// Attaches `node` before `before`, or at the end when `before` is `None`.
    fn insert_before(&self, node: &Self::Node, before: Option<&Self::Node>);
    fn remove(&self, node: &Self::Node);
}

/// Fills an album card with its nested thumbnail grid.
///
/// Population is split so the renderer can check, after the asynchronous
/// fetch completes, that the node is still bound to the same album before
/// anything is written into it.
pub trait AlbumPopulator<N: VisualNode>: Send + Sync + 'static {
    type Content: Send;

    fn fetch(&self, album: &Album) -> impl Future<Output = anyhow::Result<Self::Content>> + Send;

    /// Renders `content` into `node`. Returns whether the node's measured
    /// footprint changed.
    fn fill(&self, node: &N, album: &Album, content: Self::Content) -> bool;

    /// Empty state for a node whose fetch failed before it was ever filled
    /// for `album`.
    fn placeholder(&self, node: &N, album: &Album);
}
