pub mod album;
pub mod change;

pub use album::*;
pub use change::*;
