//! In-memory rendering target.
//!
//! Keeps the geometry a real toolkit would (scroll offset, ordered children,
//! per-node top/opacity/height) without drawing anything. The binary drives
//! it from the terminal and the tests use it to observe layout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::surface::{AlbumPopulator, Viewport, VisualNode};
use crate::models::Album;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct NodeState {
    top: f64,
    opacity: f64,
    height: f64,
    label: String,
}

#[derive(Debug, Clone)]
pub struct HeadlessNode {
    id: u64,
    state: Arc<Mutex<NodeState>>,
}

impl HeadlessNode {
    fn new() -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(Mutex::new(NodeState {
                top: 0.0,
                opacity: 1.0,
                height: 0.0,
                label: String::new(),
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sets the rendered height, returning whether it changed.
    pub fn set_height(&self, height: f64) -> bool {
        let mut state = self.state.lock();
        let changed = state.height != height;
        state.height = height;
        changed
    }

    pub fn label(&self) -> String {
        self.state.lock().label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.state.lock().label = label.into();
    }
}

impl PartialEq for HeadlessNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl VisualNode for HeadlessNode {
    fn top(&self) -> f64 {
        self.state.lock().top
    }

    fn set_top(&self, top: f64) {
        self.state.lock().top = top;
    }

    fn opacity(&self) -> f64 {
        self.state.lock().opacity
    }

    fn set_opacity(&self, opacity: f64) {
        self.state.lock().opacity = opacity;
    }

    fn measured_height(&self) -> f64 {
        self.state.lock().height
    }
}

#[derive(Debug)]
struct ViewportState {
    scroll_top: f64,
    client_height: f64,
    children: Vec<HeadlessNode>,
    created: usize,
}

#[derive(Debug)]
pub struct HeadlessViewport {
    state: Mutex<ViewportState>,
}

impl HeadlessViewport {
    pub fn new(client_height: f64) -> Self {
        Self {
            state: Mutex::new(ViewportState {
                scroll_top: 0.0,
                client_height,
                children: Vec::new(),
                created: 0,
            }),
        }
    }

    pub fn set_client_height(&self, height: f64) {
        self.state.lock().client_height = height;
    }

    /// Attached nodes in document order.
    pub fn children(&self) -> Vec<HeadlessNode> {
        self.state.lock().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Number of nodes ever handed out by `create_node`.
    pub fn created_count(&self) -> usize {
        self.state.lock().created
    }
}

impl Viewport for HeadlessViewport {
    type Node = HeadlessNode;

    fn scroll_top(&self) -> f64 {
        self.state.lock().scroll_top
    }

    fn client_height(&self) -> f64 {
        self.state.lock().client_height
    }

    fn scroll_to(&self, top: f64) {
        self.state.lock().scroll_top = top.max(0.0);
    }

    fn create_node(&self) -> HeadlessNode {
        self.state.lock().created += 1;
        HeadlessNode::new()
    }

    fn insert_before(&self, node: &HeadlessNode, before: Option<&HeadlessNode>) {
        let mut state = self.state.lock();
        state.children.retain(|c| c != node);
        let position = before
            .and_then(|b| state.children.iter().position(|c| c == b))
            .unwrap_or(state.children.len());
        state.children.insert(position, node.clone());
    }

    fn remove(&self, node: &HeadlessNode) {
        self.state.lock().children.retain(|c| c != node);
    }
}

/// Sizes album cards from their entry count alone: a header plus one row
/// per `columns` thumbnails.
#[derive(Debug, Clone)]
pub struct CountGridPopulator {
    pub header_height: f64,
    pub row_height: f64,
    pub columns: usize,
}

impl Default for CountGridPopulator {
    fn default() -> Self {
        Self {
            header_height: 40.0,
            row_height: 160.0,
            columns: 6,
        }
    }
}

impl CountGridPopulator {
    pub fn card_height(&self, entries: usize) -> f64 {
        let rows = entries.div_ceil(self.columns.max(1));
        self.header_height + rows as f64 * self.row_height
    }
}

impl AlbumPopulator<HeadlessNode> for CountGridPopulator {
    type Content = usize;

    async fn fetch(&self, album: &Album) -> anyhow::Result<usize> {
        Ok(album.count)
    }

    fn fill(&self, node: &HeadlessNode, album: &Album, entries: usize) -> bool {
        node.set_label(album.name.clone());
        node.set_height(self.card_height(entries))
    }

    fn placeholder(&self, node: &HeadlessNode, album: &Album) {
        node.set_label(album.name.clone());
        node.set_height(self.header_height);
    }
}
