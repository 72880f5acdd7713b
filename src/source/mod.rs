//! Ordered album data source feeding the windowed renderer.

pub mod data_source;

pub use data_source::*;
