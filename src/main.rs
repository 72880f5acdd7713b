use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use albumscroll::events::RendererEvent;
use albumscroll::models::SortOrder;
use albumscroll::render::{HeadlessViewport, Viewport, WindowedRenderer};
use albumscroll::scanner::{AlbumScanner, FolderPopulator, ScanConfig};
use albumscroll::source::AlbumDataSource;
use albumscroll::RendererConfig;

const CLIENT_HEIGHT: f64 = 900.0;
const SCROLL_STEP: f64 = 450.0;
const SCROLL_STEPS: usize = 12;
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

type Renderer = WindowedRenderer<HeadlessViewport, FolderPopulator>;

async fn wait_settled(renderer: &Renderer) {
    let frame = renderer.config().frame_interval;
    let settled = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while !renderer.is_quiescent() {
            tokio::time::sleep(frame).await;
        }
    })
    .await;
    if settled.is_err() {
        warn!("Renderer did not settle in time");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("albumscroll=info".parse()?),
        )
        .init();

    let mut args = std::env::args_os().skip(1);
    let root: PathBuf = args
        .next()
        .map(PathBuf::from)
        .context("usage: albumscroll <photo-root> [start-album-key]")?;
    let start = args.next().map(|key| key.to_string_lossy().into_owned());
    let sort = std::env::var("ALBUMSCROLL_SORT")
        .ok()
        .and_then(|value| value.parse::<SortOrder>().ok())
        .unwrap_or_default();

    let scan_config = ScanConfig::default();
    let mut scanner = AlbumScanner::new(&root, scan_config.clone());
    let albums = scanner.scan().await?;
    if albums.is_empty() {
        warn!(root = ?root, "No albums found");
        return Ok(());
    }

    let mut source = AlbumDataSource::new(sort);
    source.resync(albums);
    let source = source.shared();

    let viewport = Arc::new(HeadlessViewport::new(CLIENT_HEIGHT));
    let populator = Arc::new(FolderPopulator::new(&root, scan_config));
    let renderer = Arc::new(WindowedRenderer::new(
        viewport.clone(),
        populator,
        source.clone(),
        RendererConfig::from_env(),
    ));
    info!(?sort, config = ?renderer.config(), "Renderer ready");

    let (list_sub, list_events) = source.read().subscribe();
    let (scroll_sub, scroll_events) = renderer.subscribe();

    let pump = tokio::spawn({
        let renderer = renderer.clone();
        async move { renderer.pump(list_events).await }
    });
    let (stop, shutdown) = oneshot::channel();
    let frames = tokio::spawn({
        let renderer = renderer.clone();
        async move { renderer.run(shutdown).await }
    });
    let sidebar = tokio::spawn(async move {
        while let Ok(RendererEvent::Scrolled { album }) = scroll_events.recv_async().await {
            info!(name = %album.name, entries = album.count, "Now viewing");
        }
    });

    let first = {
        let source = source.read();
        match &start {
            Some(key) => source.album_by_key(key)?,
            None => source.album_at(0)?,
        }
    };
    source.read().select(first);
    // The selection reaches the renderer through the pump.
    tokio::time::sleep(renderer.config().frame_interval).await;
    wait_settled(&renderer).await;

    for step in 0..SCROLL_STEPS {
        viewport.scroll_to(viewport.scroll_top() + SCROLL_STEP);
        renderer.on_scroll().await;
        wait_settled(&renderer).await;

        let snapshot = renderer.snapshot().await;
        let section = match snapshot.anchor {
            Some(index) => source.read().section_at(index)?,
            None => None,
        };
        info!(
            step,
            top = ?snapshot.top_index,
            bottom = ?snapshot.bottom_index,
            anchor = ?snapshot.anchor,
            section = %section.map_or_else(|| "-".to_string(), |s| s.to_string()),
            pooled = snapshot.pool_len,
            "Window"
        );
    }

    info!("Watching for album changes, press Ctrl-C to exit");
    let mut rescans = tokio::time::interval(RESCAN_INTERVAL);
    rescans.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = rescans.tick() => match scanner.rescan().await {
                Ok(changes) if changes.is_empty() => debug!("No album changes"),
                Ok(changes) => {
                    info!(changes = changes.len(), "Applying album changes");
                    source.write().apply_changes(changes);
                }
                Err(e) => warn!(error = ?e, "Rescan failed"),
            },
        }
    }

    let _ = stop.send(());
    frames.await.context("Frame loop panicked")?;
    list_sub.unsubscribe();
    pump.await.context("Event pump panicked")?;
    scroll_sub.unsubscribe();
    sidebar.await.context("Sidebar listener panicked")?;
    info!("Shut down");
    Ok(())
}
