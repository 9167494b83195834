pub mod lifecycle;
pub mod view;

pub use lifecycle::*;
pub use view::*;
