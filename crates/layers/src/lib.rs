pub mod dynamic_icons;
pub mod fanout;
pub mod source;

pub use dynamic_icons::*;
pub use fanout::*;
pub use source::*;
