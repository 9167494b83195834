pub mod coords;
pub mod grid;

// Foundation crate: small, well-tested primitives only.
pub use coords::*;
pub use grid::*;
