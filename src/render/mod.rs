//! Windowed rendering engine.
//!
//! - `surface` - Seams to the drawing toolkit (`VisualNode`, `Viewport`, `AlbumPopulator`)
//! - `renderer` - The population / reflow / pruning state machine
//! - `reflow` - Anchor-preserving relayout
//! - `headless` - Toolkit-free rendering target

pub mod element;
pub mod headless;
pub mod reflow;
pub mod renderer;
pub mod surface;

pub use element::{Binding, RenderElement};
pub use headless::{CountGridPopulator, HeadlessNode, HeadlessViewport};
pub use renderer::{ElementSnapshot, TickOutcome, WindowSnapshot, WindowedRenderer};
pub use surface::{AlbumPopulator, Viewport, VisualNode};
