//! Event plumbing between the data source, the renderer and their listeners.
//!
//! Listeners receive events over a flume channel. `subscribe` hands back a
//! [`Subscription`] that the owner must keep: dropping it (or calling
//! [`Subscription::unsubscribe`]) detaches the listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::trace;

use crate::models::Album;

/// Events produced by the album data source (and the sidebar).
#[derive(Debug, Clone, PartialEq)]
pub enum AlbumListEvent {
    /// The album at `index` changed in place; no reordering happened.
    InvalidateAt { index: usize },
    /// Albums in `[index, to]` (or `[index, end]`) can no longer be trusted.
    InvalidateFrom { index: usize, to: Option<usize> },
    /// The user navigated to `album` (e.g. from the sidebar).
    Selected { album: Album },
    /// The whole sequence was re-sorted. Positions are meaningless now;
    /// consumers should find their album again by key.
    Reordered,
}

/// Events emitted by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// The anchor (topmost visible album) changed.
    Scrolled { album: Album },
}

type Listeners<E> = Mutex<Vec<(u64, Sender<E>)>>;

pub struct EventHub<E> {
    listeners: Arc<Listeners<E>>,
    next_id: AtomicU64,
}

impl<E: Clone + Send + 'static> EventHub<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a listener. Events are delivered in emission order.
    #[must_use = "dropping the subscription detaches the listener"]
    pub fn subscribe(&self) -> (Subscription, Receiver<E>) {
        let (tx, rx) = flume::unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, tx));

        let listeners = Arc::downgrade(&self.listeners);
        let detach = move || {
            if let Some(listeners) = Weak::upgrade(&listeners) {
                listeners.lock().retain(|(other, _)| *other != id);
            }
        };
        (
            Subscription {
                detach: Some(Box::new(detach)),
            },
            rx,
        )
    }

    pub fn emit(&self, event: E) {
        let mut listeners = self.listeners.lock();
        // Receivers dropped without unsubscribing are cleaned up here.
        listeners.retain(|(id, tx)| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                trace!(listener = id, "Dropping disconnected listener");
                false
            }
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<E: Clone + Send + 'static> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a listener attached for as long as it is alive.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
