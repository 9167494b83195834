pub mod bucket;
pub mod icons;
pub mod pipeline;
pub mod record;
pub mod watery;

pub use bucket::*;
pub use icons::*;
pub use pipeline::*;
pub use record::*;
pub use watery::*;
