//! Core of a scrolling album browser.
//!
//! An [`AlbumDataSource`](source::AlbumDataSource) owns the ordered album
//! sequence and announces changes as index invalidations; a
//! [`WindowedRenderer`](render::WindowedRenderer) keeps only the albums near
//! the viewport materialized and consumes those invalidations.

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod render;
pub mod scanner;
pub mod source;

pub use config::RendererConfig;
pub use error::{BrowserError, Result};
