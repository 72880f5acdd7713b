//! Renderer tuning knobs.
//!
//! Defaults match the values the browser ships with; each can be overridden
//! from the environment for experimentation without a rebuild.

use std::time::Duration;

/// Distance (px) beyond the visible edges within which albums stay materialized.
const DEFAULT_FOLD_MARGIN: f64 = 1000.0;
/// Pruning is skipped while at most this many elements are displayed.
const DEFAULT_PRUNE_THRESHOLD: usize = 7;
/// Pruning keeps everything within `fold_margin * prune_factor` of the viewport.
const DEFAULT_PRUNE_FACTOR: f64 = 1.5;
/// Vertical offset of the first materialized album, leaving room to grow upward.
const DEFAULT_INITIAL_OFFSET: f64 = 10_000.0;
const DEFAULT_FRAME_MS: u64 = 16; // ~60fps

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub fold_margin: f64,
    pub prune_threshold: usize,
    pub prune_factor: f64,
    pub initial_offset: f64,
    pub frame_interval: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fold_margin: DEFAULT_FOLD_MARGIN,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            prune_factor: DEFAULT_PRUNE_FACTOR,
            initial_offset: DEFAULT_INITIAL_OFFSET,
            frame_interval: Duration::from_millis(DEFAULT_FRAME_MS),
        }
    }
}

impl RendererConfig {
    /// Builds a config from `ALBUMSCROLL_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fold_margin: env_positive("ALBUMSCROLL_FOLD_MARGIN").unwrap_or(defaults.fold_margin),
            prune_threshold: env_positive::<usize>("ALBUMSCROLL_PRUNE_THRESHOLD")
                .unwrap_or(defaults.prune_threshold),
            prune_factor: defaults.prune_factor,
            initial_offset: env_positive("ALBUMSCROLL_INITIAL_OFFSET")
                .unwrap_or(defaults.initial_offset),
            frame_interval: env_positive::<u64>("ALBUMSCROLL_FRAME_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_interval),
        }
    }

    /// Margin used when deciding which elements to prune.
    pub fn prune_margin(&self) -> f64 {
        self.fold_margin * self.prune_factor
    }
}

fn env_positive<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}
