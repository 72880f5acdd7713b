//! Windowed album renderer.
//!
//! Keeps a contiguous run of albums `[top_index, bottom_index]` materialized
//! around the viewport, recycling nodes through a pool. Work happens in
//! frame ticks: each tick either reflows (positions elements around the
//! anchor) or repopulates (prunes far elements and extends the window by at
//! most one album at each end), never both.
//!
//! `displayed` and `pool` are only touched while holding the state lock, by
//! a tick or by an invalidation handler.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use flume::Receiver;
use tokio::sync::{oneshot, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use super::element::{Binding, RenderElement};
use super::reflow::{self, REFLOW_FULL, REFLOW_TRIGGER};
use super::surface::{AlbumPopulator, Viewport, VisualNode};
use crate::config::RendererConfig;
use crate::error::Result;
use crate::events::{AlbumListEvent, EventHub, RendererEvent, Subscription};
use crate::models::Album;
use crate::source::AlbumIndex;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was pending.
    Idle,
    Reflowed,
    /// Albums were added at the top and/or bottom; a reflow follows.
    Extended,
    /// Fold margins are satisfied; nothing more to do until the next scroll.
    Settled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    pub index: usize,
    pub key: String,
    pub top: f64,
    pub height: f64,
    pub opacity: f64,
}

/// Read-only view of the renderer for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub top_index: Option<usize>,
    pub bottom_index: Option<usize>,
    pub displayed: Vec<ElementSnapshot>,
    pub pool_len: usize,
    /// Index of the anchor album, if any.
    pub anchor: Option<usize>,
}

struct WindowState<N> {
    top_index: Option<usize>,
    bottom_index: Option<usize>,
    displayed: Vec<RenderElement<N>>,
    pool: Vec<N>,
    last_scrolled: Option<String>,
}

impl<N: VisualNode> WindowState<N> {
    fn element_at(&self, index: usize) -> Option<&RenderElement<N>> {
        self.displayed.iter().find(|e| e.index() == index)
    }

    fn sync_bounds(&mut self) {
        self.top_index = self.displayed.first().map(|e| e.index());
        self.bottom_index = self.displayed.last().map(|e| e.index());
    }
}

/// Marks a tick as in flight for as long as it lives.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        assert!(
            !flag.swap(true, Ordering::SeqCst),
            "renderer tick re-entered while the previous tick is still running"
        );
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct WindowedRenderer<V: Viewport, P: AlbumPopulator<V::Node>> {
    viewport: Arc<V>,
    populator: Arc<P>,
    source: Arc<dyn AlbumIndex>,
    config: RendererConfig,
    state: Mutex<WindowState<V::Node>>,
    reflow: AtomicU8,
    repopulate: AtomicBool,
    running: AtomicBool,
    generation: AtomicU64,
    events: EventHub<RendererEvent>,
}

impl<V: Viewport, P: AlbumPopulator<V::Node>> WindowedRenderer<V, P> {
    pub fn new(
        viewport: Arc<V>,
        populator: Arc<P>,
        source: Arc<dyn AlbumIndex>,
        config: RendererConfig,
    ) -> Self {
        Self {
            viewport,
            populator,
            source,
            config,
            state: Mutex::new(WindowState {
                top_index: None,
                bottom_index: None,
                displayed: Vec::new(),
                pool: Vec::new(),
                last_scrolled: None,
            }),
            reflow: AtomicU8::new(0),
            repopulate: AtomicBool::new(false),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            events: EventHub::new(),
        }
    }

    /// Listens for `Scrolled` notifications (sidebar highlight sync).
    pub fn subscribe(&self) -> (Subscription, Receiver<RendererEvent>) {
        self.events.subscribe()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// True when no reflow or population pass is pending.
    pub fn is_quiescent(&self) -> bool {
        self.reflow.load(Ordering::SeqCst) == 0 && !self.repopulate.load(Ordering::SeqCst)
    }

    /// Currently materialized index range.
    pub async fn window(&self) -> Option<(usize, usize)> {
        let state = self.state.lock().await;
        let first = state.displayed.first()?;
        let last = state.displayed.last()?;
        Some((first.index(), last.index()))
    }

    pub async fn snapshot(&self) -> WindowSnapshot {
        let state = self.state.lock().await;
        let anchor = self.anchor_position(&state).map(|p| state.displayed[p].index());
        WindowSnapshot {
            top_index: state.top_index,
            bottom_index: state.bottom_index,
            displayed: state
                .displayed
                .iter()
                .map(|e| ElementSnapshot {
                    index: e.index(),
                    key: e.binding.key().to_string(),
                    top: e.top(),
                    height: e.node.measured_height(),
                    opacity: e.node.opacity(),
                })
                .collect(),
            pool_len: state.pool.len(),
            anchor,
        }
    }

    /// Runs one frame of work.
    ///
    /// # Panics
    /// If called while another tick has not finished; that is a scheduling
    /// bug in the caller.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let _running = RunningGuard::enter(&self.running);
        let mut state = self.state.lock().await;

        self.bootstrap(&mut state).await?;

        if self.reflow.load(Ordering::SeqCst) != 0 {
            self.reflow_pass(&mut state);
            return Ok(TickOutcome::Reflowed);
        }
        if !self.repopulate.load(Ordering::SeqCst) {
            return Ok(TickOutcome::Idle);
        }

        self.prune(&mut state);
        if self.extend(&mut state).await? {
            self.reflow.fetch_or(REFLOW_TRIGGER, Ordering::SeqCst);
            Ok(TickOutcome::Extended)
        } else {
            self.repopulate.store(false, Ordering::SeqCst);
            Ok(TickOutcome::Settled)
        }
    }

    /// Ticks until nothing is pending, at most `max_ticks` times. Returns the
    /// number of ticks run.
    pub async fn settle(&self, max_ticks: usize) -> Result<usize> {
        let mut ticks = 0;
        while ticks < max_ticks && !self.is_quiescent() {
            self.tick().await?;
            ticks += 1;
        }
        Ok(ticks)
    }

    /// Frame loop: ticks every `frame_interval` until `shutdown` fires.
    /// Tick failures are logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut frames = tokio::time::interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = frames.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Renderer tick failed");
                    }
                }
            }
        }
        debug!("Renderer frame loop stopped");
    }

    /// Applies data source events in emission order until the channel closes.
    pub async fn pump(&self, events: Receiver<AlbumListEvent>) {
        while let Ok(event) = events.recv_async().await {
            if let Err(e) = self.handle_event(event).await {
                error!(error = %e, "Failed to apply album list event");
            }
        }
        debug!("Album list event stream closed");
    }

    pub async fn handle_event(&self, event: AlbumListEvent) -> Result<()> {
        match event {
            AlbumListEvent::InvalidateAt { index } => self.invalidate_at(index).await,
            AlbumListEvent::InvalidateFrom { index, to } => self.invalidate_from(index, to).await,
            AlbumListEvent::Selected { album } => {
                self.selected(&album).await;
                Ok(())
            }
            AlbumListEvent::Reordered => self.reordered().await,
        }
    }

    /// Scroll handler: reports the anchor and asks for a population check.
    pub async fn on_scroll(&self) {
        let mut state = self.state.lock().await;
        self.emit_scrolled(&mut state);
        self.repopulate.store(true, Ordering::SeqCst);
    }

    /// The viewport was resized; everything is repositioned around the anchor.
    pub fn on_resize(&self) {
        self.reflow.fetch_or(REFLOW_FULL, Ordering::SeqCst);
        self.repopulate.store(true, Ordering::SeqCst);
    }

    /// Rebuilds the window anchored at `album`.
    pub async fn selected(&self, album: &Album) {
        let mut state = self.state.lock().await;
        for element in std::mem::take(&mut state.displayed) {
            self.release(&mut state, element.node);
        }
        let index = self.source.index_of_key(&album.key);
        match index {
            Some(index) => info!(index, name = %album.name, "Rebuilding view from album"),
            None => warn!(key = %album.key, "Selected album is not in the list"),
        }
        state.top_index = index;
        state.bottom_index = index;
        state.last_scrolled = None;
        self.reflow.fetch_or(REFLOW_FULL, Ordering::SeqCst);
        self.repopulate.store(true, Ordering::SeqCst);
    }

    /// The sequence was re-sorted: rebuild around the album that was in view,
    /// wherever it landed.
    pub async fn reordered(&self) -> Result<()> {
        let anchor = {
            let state = self.state.lock().await;
            self.anchor_position(&state)
                .map(|position| state.displayed[position].binding.album.clone())
        };
        match anchor {
            Some(album) => {
                self.selected(&album).await;
                Ok(())
            }
            None => self.invalidate_from(0, None).await,
        }
    }

    /// The album at `index` changed in place: refresh its node if displayed.
    ///
    /// The fetch runs without the state lock; its result is only applied if
    /// the node is still bound to the same album slot when it completes.
    pub async fn invalidate_at(&self, index: usize) -> Result<()> {
        let (generation, album) = {
            let state = self.state.lock().await;
            let Some(element) = state.element_at(index) else {
                return Ok(());
            };
            (element.binding.generation, self.source.album_at(index)?)
        };

        let content = match self.populator.fetch(&album).await {
            Ok(content) => content,
            Err(e) => {
                warn!(index, key = %album.key, error = ?e, "Failed to refresh album");
                return Ok(());
            }
        };

        let mut state = self.state.lock().await;
        let Some(element) = state
            .displayed
            .iter_mut()
            .find(|e| e.binding.generation == generation && e.index() == index)
        else {
            debug!(index, key = %album.key, "Discarding stale album refresh");
            return Ok(());
        };
        let changed = self.populator.fill(&element.node, &album, content);
        element.binding.album = album;
        if changed {
            trace!(index, "Album size changed, full reflow");
            self.reflow.fetch_or(REFLOW_FULL, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Albums in `[index, to]` (or `[index, end]`) can no longer be trusted.
    ///
    /// The anchor stays in place and is refetched for its slot; every other
    /// element in the range goes back to the pool. Only the contiguous run
    /// around the anchor is kept so the window never has holes.
    pub async fn invalidate_from(&self, index: usize, to: Option<usize>) -> Result<()> {
        let mut state = self.state.lock().await;
        let (Some(first), Some(last)) = (
            state.displayed.first().map(|e| e.index()),
            state.displayed.last().map(|e| e.index()),
        ) else {
            // Nothing shown yet; make sure a pending rebuild gets its tick.
            if state.top_index.is_some() {
                self.repopulate.store(true, Ordering::SeqCst);
            }
            return Ok(());
        };
        let to = to.unwrap_or(usize::MAX);
        if first > to || last < index {
            return Ok(());
        }

        let len = self.source.len();
        let anchor = self.anchor_position(&state);
        let in_range = |i: usize| i >= index && i <= to;
        let anchor_album = match anchor {
            Some(position) if len > 0 && in_range(state.displayed[position].index()) => {
                let slot = state.displayed[position].index().min(len - 1);
                Some((slot, self.source.album_at(slot)?))
            }
            _ => None,
        };

        let mut kept: Vec<RenderElement<V::Node>> = Vec::with_capacity(state.displayed.len());
        let mut pivot = None;
        for (position, mut element) in std::mem::take(&mut state.displayed).into_iter().enumerate() {
            let is_anchor = anchor == Some(position);
            if !in_range(element.index()) {
                if is_anchor {
                    pivot = Some(kept.len());
                }
                kept.push(element);
                continue;
            }
            match (&anchor_album, is_anchor) {
                (Some((slot, album)), true) => {
                    match self.populator.fetch(album).await {
                        Ok(content) => {
                            self.populator.fill(&element.node, album, content);
                        }
                        Err(e) => {
                            warn!(index = slot, key = %album.key, error = ?e, "Failed to refresh anchor album")
                        }
                    }
                    element.binding = self.bind(*slot, album.clone());
                    debug!(index = slot, key = %album.key, "Pinned anchor to refreshed album");
                    pivot = Some(kept.len());
                    kept.push(element);
                }
                _ => self.release(&mut state, element.node),
            }
        }

        // Keep the contiguous run around the anchor (or the first survivor).
        if let Some(center) = pivot.or(if kept.is_empty() { None } else { Some(0) }) {
            let mut start = center;
            while start > 0 && kept[start - 1].index() + 1 == kept[start].index() {
                start -= 1;
            }
            let mut end = center;
            while end + 1 < kept.len() && kept[end].index() + 1 == kept[end + 1].index() {
                end += 1;
            }
            let tail = kept.split_off(end + 1);
            let run = kept.split_off(start);
            for element in kept.into_iter().chain(tail) {
                self.release(&mut state, element.node);
            }
            state.displayed = run;
        }

        state.sync_bounds();
        if state.displayed.is_empty() {
            // Rebuild from where the invalidation started once there is
            // something to show. An empty list keeps the slot for later.
            state.top_index = Some(index.min(len.saturating_sub(1)));
            state.bottom_index = state.top_index;
            self.repopulate.store(true, Ordering::SeqCst);
        }
        debug!(
            index,
            top = ?state.top_index,
            bottom = ?state.bottom_index,
            pool = state.pool.len(),
            "Invalidated album range"
        );
        self.reflow.fetch_or(REFLOW_FULL, Ordering::SeqCst);
        Ok(())
    }

    async fn bootstrap(&self, state: &mut WindowState<V::Node>) -> Result<()> {
        if !state.displayed.is_empty() {
            return Ok(());
        }
        let Some(top_index) = state.top_index else {
            return Ok(());
        };
        let len = self.source.len();
        if len == 0 {
            return Ok(());
        }
        let index = top_index.min(len - 1);
        let album = self.source.album_at(index)?;

        let node = self.take_node(state);
        let fetched = self.populator.fetch(&album).await;
        self.fill_fresh(&node, &album, fetched);
        node.set_top(self.config.initial_offset);
        node.set_opacity(1.0);
        self.viewport.insert_before(&node, None);
        self.viewport.scroll_to(self.config.initial_offset);

        debug!(index, name = %album.name, "Bootstrapped window");
        let binding = self.bind(index, album);
        state.displayed.push(RenderElement { node, binding });
        state.sync_bounds();
        self.emit_scrolled(state);
        Ok(())
    }

    fn reflow_pass(&self, state: &mut WindowState<V::Node>) {
        let flags = self.reflow.swap(0, Ordering::SeqCst);
        if state.displayed.is_empty() {
            return;
        }
        if flags & REFLOW_FULL != 0 {
            if let Some(anchor) = self.anchor_position(state) {
                reflow::hide_all_but(&state.displayed, anchor);
            }
            self.emit_scrolled(state);
        }
        reflow::restack(&state.displayed);

        let shift = reflow::normalize_drift(&state.displayed);
        if shift > 0.0 {
            let scroll_top = self.viewport.scroll_top();
            debug!(shift, "Window drifted above origin, shifting contents");
            self.viewport.scroll_to(scroll_top + shift);
        }
    }

    fn prune(&self, state: &mut WindowState<V::Node>) {
        if state.displayed.len() <= self.config.prune_threshold {
            return;
        }
        let top = self.viewport.scroll_top();
        let bottom = top + self.viewport.client_height();
        let margin = self.config.prune_margin();

        let mut pruned = 0;
        while state.displayed.len() > 1 && state.displayed[0].is_outside(top, bottom, margin) {
            let element = state.displayed.remove(0);
            trace!(index = element.index(), top = element.top(), "Pruning album above");
            self.release(state, element.node);
            pruned += 1;
        }
        while state.displayed.len() > 1
            && state
                .displayed
                .last()
                .is_some_and(|e| e.is_outside(top, bottom, margin))
        {
            if let Some(element) = state.displayed.pop() {
                trace!(index = element.index(), top = element.top(), "Pruning album below");
                self.release(state, element.node);
                pruned += 1;
            }
        }
        if pruned > 0 {
            state.sync_bounds();
            debug!(pruned, top = ?state.top_index, bottom = ?state.bottom_index, "Pruned window");
        }
    }

    /// Adds at most one album above and one below when the fold margins are
    /// not covered. Both fetches run concurrently.
    async fn extend(&self, state: &mut WindowState<V::Node>) -> Result<bool> {
        let (Some(first), Some(last)) = (state.displayed.first(), state.displayed.last()) else {
            return Ok(false);
        };
        let scroll_top = self.viewport.scroll_top();
        let scroll_bottom = scroll_top + self.viewport.client_height();
        let fold = self.config.fold_margin;
        let len = self.source.len();
        let (top_index, bottom_index) = (first.index(), last.index());

        let want_top = first.top() > scroll_top - fold && top_index > 0;
        let want_bottom = last.bottom() <= scroll_bottom + fold && bottom_index + 1 < len;
        if !want_top && !want_bottom {
            return Ok(false);
        }

        let above = if want_top {
            Some((top_index - 1, self.source.album_at(top_index - 1)?))
        } else {
            None
        };
        let below = if want_bottom {
            Some((bottom_index + 1, self.source.album_at(bottom_index + 1)?))
        } else {
            None
        };

        let populator = &self.populator;
        let (above_content, below_content) = tokio::join!(
            async {
                match &above {
                    Some((_, album)) => Some(populator.fetch(album).await),
                    None => None,
                }
            },
            async {
                match &below {
                    Some((_, album)) => Some(populator.fetch(album).await),
                    None => None,
                }
            },
        );

        if let (Some((index, album)), Some(fetched)) = (above, above_content) {
            let node = self.take_node(state);
            self.fill_fresh(&node, &album, fetched);
            node.set_top(0.0);
            node.set_opacity(0.0);
            let before = state.displayed.first().map(|e| e.node.clone());
            self.viewport.insert_before(&node, before.as_ref());
            debug!(index, name = %album.name, "Adding album at top");
            let binding = self.bind(index, album);
            state.displayed.insert(0, RenderElement { node, binding });
        }
        if let (Some((index, album)), Some(fetched)) = (below, below_content) {
            let node = self.take_node(state);
            self.fill_fresh(&node, &album, fetched);
            node.set_top(0.0);
            node.set_opacity(0.0);
            self.viewport.insert_before(&node, None);
            debug!(index, name = %album.name, "Adding album at bottom");
            let binding = self.bind(index, album);
            state.displayed.push(RenderElement { node, binding });
        }
        state.sync_bounds();
        Ok(true)
    }

    fn anchor_position(&self, state: &WindowState<V::Node>) -> Option<usize> {
        reflow::find_anchor(
            &state.displayed,
            self.viewport.scroll_top(),
            self.viewport.client_height(),
        )
    }

    /// Emits `Scrolled` when the anchor album differs from the last one reported.
    fn emit_scrolled(&self, state: &mut WindowState<V::Node>) {
        let Some(position) = self.anchor_position(state) else {
            return;
        };
        let album = &state.displayed[position].binding.album;
        if state.last_scrolled.as_deref() == Some(album.key.as_str()) {
            return;
        }
        trace!(name = %album.name, "Now visible album");
        state.last_scrolled = Some(album.key.clone());
        self.events.emit(RendererEvent::Scrolled {
            album: album.clone(),
        });
    }

    fn bind(&self, index: usize, album: Album) -> Binding {
        Binding {
            index,
            album,
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn take_node(&self, state: &mut WindowState<V::Node>) -> V::Node {
        state.pool.pop().unwrap_or_else(|| self.viewport.create_node())
    }

    fn release(&self, state: &mut WindowState<V::Node>, node: V::Node) {
        self.viewport.remove(&node);
        state.pool.push(node);
    }

    /// Fills a freshly bound node; a failed fetch leaves a placeholder.
    fn fill_fresh(&self, node: &V::Node, album: &Album, fetched: anyhow::Result<P::Content>) {
        match fetched {
            Ok(content) => {
                self.populator.fill(node, album, content);
            }
            Err(e) => {
                warn!(key = %album.key, error = ?e, "Failed to populate album");
                self.populator.placeholder(node, album);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use parking_lot::Mutex as SyncMutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::BrowserError;
    use crate::models::SortOrder;
    use crate::render::headless::{HeadlessNode, HeadlessViewport};
    use crate::source::{AlbumDataSource, SharedDataSource};

    const PLACEHOLDER_HEIGHT: f64 = 20.0;

    /// Holds the fetch of `key` until released.
    struct Gate {
        key: String,
        started: Notify,
        release: Notify,
    }

    struct TestPopulator {
        height: f64,
        heights: SyncMutex<HashMap<String, f64>>,
        failing: SyncMutex<HashSet<String>>,
        gate: SyncMutex<Option<Arc<Gate>>>,
    }

    impl TestPopulator {
        fn new(height: f64) -> Self {
            Self {
                height,
                heights: SyncMutex::new(HashMap::new()),
                failing: SyncMutex::new(HashSet::new()),
                gate: SyncMutex::new(None),
            }
        }
    }

    impl AlbumPopulator<HeadlessNode> for TestPopulator {
        type Content = f64;

        async fn fetch(&self, album: &Album) -> anyhow::Result<f64> {
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate.filter(|g| g.key == album.key) {
                gate.started.notify_one();
                gate.release.notified().await;
            }
            if self.failing.lock().contains(&album.key) {
                anyhow::bail!("no entries for {}", album.key);
            }
            Ok(self.heights.lock().get(&album.key).copied().unwrap_or(self.height))
        }

        fn fill(&self, node: &HeadlessNode, album: &Album, height: f64) -> bool {
            node.set_label(album.name.clone());
            node.set_height(height)
        }

        fn placeholder(&self, node: &HeadlessNode, album: &Album) {
            node.set_label(album.name.clone());
            node.set_height(PLACEHOLDER_HEIGHT);
        }
    }

    struct Fixture {
        source: SharedDataSource,
        viewport: Arc<HeadlessViewport>,
        populator: Arc<TestPopulator>,
        renderer: WindowedRenderer<HeadlessViewport, TestPopulator>,
    }

    impl Fixture {
        fn album(&self, index: usize) -> Album {
            self.source.read().album_at(index).unwrap()
        }
    }

    fn albums(n: usize) -> Vec<Album> {
        (0..n)
            .map(|i| Album::new(format!("k{i:02}"), format!("album-{i:02}"), 1))
            .collect()
    }

    fn tight_config() -> RendererConfig {
        RendererConfig {
            fold_margin: 250.0,
            prune_threshold: 7,
            prune_factor: 1.5,
            initial_offset: 10_000.0,
            frame_interval: Duration::from_millis(1),
        }
    }

    fn fixture(n: usize, config: RendererConfig, client_height: f64, height: f64) -> Fixture {
        let mut source = AlbumDataSource::new(SortOrder::NameAscending);
        source.resync(albums(n));
        let source = source.shared();
        let viewport = Arc::new(HeadlessViewport::new(client_height));
        let populator = Arc::new(TestPopulator::new(height));
        let renderer = WindowedRenderer::new(viewport.clone(), populator.clone(), source.clone(), config);
        Fixture {
            source,
            viewport,
            populator,
            renderer,
        }
    }

    /// Window settled around album 15 of `n`, 100px cards in a 300px viewport.
    async fn settled(n: usize) -> Fixture {
        let fx = fixture(n, tight_config(), 300.0, 100.0);
        fx.renderer.selected(&fx.album(15)).await;
        fx.renderer.settle(100).await.unwrap();
        assert!(fx.renderer.is_quiescent());
        fx
    }

    fn element(snapshot: &WindowSnapshot, index: usize) -> &ElementSnapshot {
        snapshot
            .displayed
            .iter()
            .find(|e| e.index == index)
            .unwrap_or_else(|| panic!("album {index} not displayed"))
    }

    fn indices(snapshot: &WindowSnapshot) -> Vec<usize> {
        snapshot.displayed.iter().map(|e| e.index).collect()
    }

    async fn assert_window_consistent(fx: &Fixture) {
        let snapshot = fx.renderer.snapshot().await;
        for pair in snapshot.displayed.windows(2) {
            assert_eq!(pair[0].index + 1, pair[1].index, "window has a hole");
            assert_eq!(pair[0].top + pair[0].height, pair[1].top, "cards overlap or gap");
        }
        assert_eq!(snapshot.top_index, snapshot.displayed.first().map(|e| e.index));
        assert_eq!(snapshot.bottom_index, snapshot.displayed.last().map(|e| e.index));
        for e in &snapshot.displayed {
            assert_eq!(e.key, fx.album(e.index).key);
            assert_eq!(e.opacity, 1.0);
        }
        // Every node is either attached and displayed or pooled, never both.
        assert_eq!(fx.viewport.child_count(), snapshot.displayed.len());
        assert_eq!(fx.viewport.created_count(), snapshot.displayed.len() + snapshot.pool_len);
    }

    #[tokio::test]
    async fn test_settles_around_selected_album() {
        let fx = settled(21).await;
        let snapshot = fx.renderer.snapshot().await;

        assert_eq!(indices(&snapshot), (12..=20).collect::<Vec<_>>());
        assert_eq!(snapshot.anchor, Some(15));
        assert_eq!(element(&snapshot, 15).top, 10_000.0);
        assert_eq!(element(&snapshot, 12).top, 9_700.0);
        assert_eq!(fx.viewport.scroll_top(), 10_000.0);
        assert_eq!(snapshot.pool_len, 0);
        assert_window_consistent(&fx).await;

        assert_eq!(fx.renderer.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_growth_at_head_keeps_anchor_in_place() {
        let fx = fixture(26, RendererConfig::default(), 800.0, 200.0);
        fx.renderer.selected(&fx.album(12)).await;

        assert_eq!(fx.renderer.tick().await.unwrap(), TickOutcome::Reflowed);
        assert_eq!(fx.renderer.window().await, Some((12, 12)));

        assert_eq!(fx.renderer.tick().await.unwrap(), TickOutcome::Extended);
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(snapshot.top_index, Some(11));
        assert_eq!(snapshot.displayed[0].index, 11);
        assert_eq!(snapshot.displayed[0].key, "k11");
        // New cards stay hidden until the reflow positions them.
        assert_eq!(snapshot.displayed[0].opacity, 0.0);

        assert_eq!(fx.renderer.tick().await.unwrap(), TickOutcome::Reflowed);
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(element(&snapshot, 11).top, 9_800.0);
        assert_eq!(element(&snapshot, 12).top, 10_000.0);
        assert_eq!(element(&snapshot, 13).top, 10_200.0);
    }

    #[tokio::test]
    async fn test_prune_past_threshold_after_scroll() {
        let fx = settled(21).await;
        let (_sub, events) = fx.renderer.subscribe();

        fx.viewport.scroll_to(10_400.0);
        fx.renderer.on_scroll().await;
        assert_eq!(fx.renderer.tick().await.unwrap(), TickOutcome::Settled);

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(indices(&snapshot), (15..=20).collect::<Vec<_>>());
        assert_eq!(snapshot.top_index, Some(15));
        assert_eq!(snapshot.bottom_index, Some(20));
        assert_eq!(snapshot.pool_len, 3);
        assert_window_consistent(&fx).await;

        let RendererEvent::Scrolled { album } = events.try_recv().unwrap();
        assert_eq!(album.key, "k19");
    }

    #[tokio::test]
    async fn test_scrolled_only_when_anchor_changes() {
        let fx = fixture(21, tight_config(), 300.0, 100.0);
        let (_sub, events) = fx.renderer.subscribe();
        fx.renderer.selected(&fx.album(15)).await;
        fx.renderer.settle(100).await.unwrap();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            [RendererEvent::Scrolled {
                album: fx.album(15)
            }]
        );

        fx.renderer.on_scroll().await;
        assert!(events.try_recv().is_err());

        fx.viewport.scroll_to(10_100.0);
        fx.renderer.on_scroll().await;
        let RendererEvent::Scrolled { album } = events.try_recv().unwrap();
        assert_eq!(album.key, "k16");
    }

    #[tokio::test]
    async fn test_invalidate_from_below_anchor_keeps_anchor() {
        let fx = settled(30).await;

        fx.renderer.invalidate_from(18, None).await.unwrap();
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(indices(&snapshot), (12..=17).collect::<Vec<_>>());
        assert_eq!(snapshot.pool_len, 3);

        assert_eq!(fx.renderer.tick().await.unwrap(), TickOutcome::Reflowed);
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(snapshot.anchor, Some(15));
        assert_eq!(element(&snapshot, 15).top, 10_000.0);

        fx.renderer.on_scroll().await;
        fx.renderer.settle(100).await.unwrap();
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(indices(&snapshot), (12..=20).collect::<Vec<_>>());
        assert_eq!(snapshot.pool_len, 0);
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_insert_above_rebinds_anchor_slot() {
        let fx = settled(30).await;

        let event = fx
            .source
            .write()
            .add_album(Album::new("k02b", "album-02b", 1))
            .unwrap();
        assert_eq!(event, AlbumListEvent::InvalidateFrom { index: 3, to: None });
        fx.renderer.handle_event(event).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(indices(&snapshot), [15]);
        assert_eq!(snapshot.displayed[0].key, "k14");
        assert_eq!(snapshot.displayed[0].top, 10_000.0);

        fx.renderer.settle(100).await.unwrap();
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(snapshot.anchor, Some(15));
        assert_eq!(element(&snapshot, 15).top, 10_000.0);
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_window_returns_after_library_refills() {
        let fx = settled(21).await;

        let event = fx.source.write().resync(Vec::new()).unwrap();
        fx.renderer.handle_event(event).await.unwrap();
        fx.renderer.settle(100).await.unwrap();
        assert!(fx.renderer.is_quiescent());
        assert_eq!(fx.renderer.window().await, None);
        assert_eq!(fx.viewport.child_count(), 0);

        let event = fx.source.write().resync(albums(21)).unwrap();
        fx.renderer.handle_event(event).await.unwrap();
        assert!(!fx.renderer.is_quiescent());
        fx.renderer.settle(100).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(snapshot.anchor, Some(0));
        assert_eq!(element(&snapshot, 0).key, "k00");
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_sort_change_keeps_album_in_view() {
        let fx = settled(30).await;

        let event = fx.source.write().set_sort(SortOrder::RecentFirst).unwrap();
        assert_eq!(event, AlbumListEvent::Reordered);
        fx.renderer.handle_event(event).await.unwrap();
        fx.renderer.settle(100).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(snapshot.anchor, Some(14));
        assert_eq!(element(&snapshot, 14).key, "k15");
        assert_eq!(element(&snapshot, 14).top, fx.viewport.scroll_top());
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_invalidation_outside_window_is_noop() {
        let fx = settled(30).await;
        let before = fx.renderer.snapshot().await;

        fx.renderer.invalidate_from(0, Some(5)).await.unwrap();
        fx.renderer.invalidate_at(25).await.unwrap();
        fx.renderer.settle(100).await.unwrap();

        assert_eq!(fx.renderer.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_invalidate_at_is_idempotent() {
        let fx = settled(21).await;
        let before = fx.renderer.snapshot().await;

        fx.renderer.invalidate_at(15).await.unwrap();
        assert!(fx.renderer.is_quiescent());
        assert_eq!(fx.renderer.snapshot().await, before);

        fx.renderer.invalidate_at(15).await.unwrap();
        assert_eq!(fx.renderer.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_invalidate_at_size_change_reflows() {
        let fx = settled(21).await;
        fx.populator.heights.lock().insert("k15".into(), 250.0);

        fx.renderer.invalidate_at(15).await.unwrap();
        assert!(!fx.renderer.is_quiescent());
        fx.renderer.settle(100).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(element(&snapshot, 15).top, 10_000.0);
        assert_eq!(element(&snapshot, 15).height, 250.0);
        assert_eq!(element(&snapshot, 16).top, 10_250.0);
        assert_eq!(element(&snapshot, 14).top, 9_900.0);
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_reselect_reuses_pooled_nodes() {
        let fx = settled(30).await;
        let (_sub, events) = fx.renderer.subscribe();
        let created = fx.viewport.created_count();

        fx.renderer.selected(&fx.album(27)).await;
        let snapshot = fx.renderer.snapshot().await;
        assert!(snapshot.displayed.is_empty());
        assert_eq!(snapshot.top_index, Some(27));

        fx.renderer.settle(100).await.unwrap();
        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(snapshot.anchor, Some(27));
        assert_eq!(element(&snapshot, 27).key, "k27");
        assert_eq!(indices(&snapshot), (24..=29).collect::<Vec<_>>());
        assert_eq!(fx.viewport.created_count(), created);
        assert_window_consistent(&fx).await;

        let RendererEvent::Scrolled { album } = events.try_recv().unwrap();
        assert_eq!(album.key, "k27");
    }

    #[tokio::test]
    async fn test_resize_fills_taller_viewport() {
        let fx = settled(30).await;

        fx.viewport.set_client_height(600.0);
        fx.renderer.on_resize();
        assert!(!fx.renderer.is_quiescent());
        fx.renderer.settle(100).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(fx.renderer.window().await, Some((12, 28)));
        assert_eq!(element(&snapshot, 15).top, 10_000.0);
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_selecting_unknown_album_renders_nothing() {
        let fx = fixture(5, tight_config(), 300.0, 100.0);
        fx.renderer.selected(&Album::new("missing", "missing", 1)).await;
        fx.renderer.settle(10).await.unwrap();
        assert_eq!(fx.renderer.window().await, None);
    }

    #[tokio::test]
    async fn test_stale_refresh_is_discarded() {
        let fx = settled(21).await;
        let node = fx
            .viewport
            .children()
            .into_iter()
            .find(|n| n.label() == "album-16")
            .unwrap();

        fx.populator.heights.lock().insert("k16".into(), 999.0);
        let gate = Arc::new(Gate {
            key: "k16".into(),
            started: Notify::new(),
            release: Notify::new(),
        });
        *fx.populator.gate.lock() = Some(gate.clone());

        let other = fx.album(3);
        let (refreshed, ()) = tokio::join!(fx.renderer.invalidate_at(16), async {
            gate.started.notified().await;
            fx.renderer.selected(&other).await;
            gate.release.notify_one();
        });
        refreshed.unwrap();

        assert_eq!(node.measured_height(), 100.0);
        assert!(fx.renderer.snapshot().await.displayed.is_empty());
    }

    #[tokio::test]
    async fn test_population_failure_leaves_placeholder() {
        let fx = fixture(21, tight_config(), 300.0, 100.0);
        fx.populator.failing.lock().insert("k14".into());
        fx.renderer.selected(&fx.album(15)).await;
        fx.renderer.settle(100).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert_eq!(element(&snapshot, 14).height, PLACEHOLDER_HEIGHT);
        assert_eq!(element(&snapshot, 14).key, "k14");
        assert_eq!(element(&snapshot, 13).height, 100.0);
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    #[should_panic(expected = "re-entered")]
    async fn test_reentrant_tick_panics() {
        let fx = fixture(3, tight_config(), 300.0, 100.0);
        fx.renderer.running.store(true, Ordering::SeqCst);
        let _ = fx.renderer.tick().await;
    }

    #[tokio::test]
    async fn test_out_of_bounds_aborts_refresh() {
        let fx = settled(21).await;
        // Shrink the list without telling the renderer.
        fx.source.write().resync(albums(10));

        let err = fx.renderer.invalidate_at(15).await.unwrap_err();
        assert!(matches!(err, BrowserError::OutOfBounds { index: 15, len: 10 }));
    }

    #[tokio::test]
    async fn test_drift_above_origin_is_normalized() {
        let config = RendererConfig {
            initial_offset: 150.0,
            ..tight_config()
        };
        let fx = fixture(30, config, 300.0, 100.0);
        fx.renderer.selected(&fx.album(10)).await;
        fx.renderer.settle(100).await.unwrap();

        let snapshot = fx.renderer.snapshot().await;
        assert!(snapshot.displayed.iter().all(|e| e.top >= 0.0));
        assert_eq!(snapshot.displayed[0].index, 7);
        assert_eq!(snapshot.displayed[0].top, 0.0);
        assert_eq!(snapshot.anchor, Some(10));
        // The anchor sits at the top of the viewport, as it did when bootstrapped.
        assert_eq!(element(&snapshot, 10).top, fx.viewport.scroll_top());
        assert_window_consistent(&fx).await;
    }

    #[tokio::test]
    async fn test_pump_applies_events_in_order() {
        let fx = settled(21).await;
        let (sub, events) = fx.source.read().subscribe();

        let updated = Album::new("k15", "album-15", 2);
        fx.source.write().updated_album(updated);
        let target = fx.album(3);
        fx.source.read().select(target);
        sub.unsubscribe();

        fx.renderer.pump(events).await;
        let snapshot = fx.renderer.snapshot().await;
        assert!(snapshot.displayed.is_empty());
        assert_eq!(snapshot.top_index, Some(3));

        fx.renderer.settle(100).await.unwrap();
        assert_eq!(fx.renderer.snapshot().await.anchor, Some(3));
    }

    #[tokio::test]
    async fn test_run_ticks_until_shutdown() {
        let fx = fixture(21, tight_config(), 300.0, 100.0);
        fx.renderer.selected(&fx.album(15)).await;

        let (stop, shutdown) = oneshot::channel();
        let renderer = &fx.renderer;
        tokio::join!(renderer.run(shutdown), async {
            while !renderer.is_quiescent() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            let _ = stop.send(());
        });

        assert_eq!(fx.renderer.window().await, Some((12, 20)));
    }
}
