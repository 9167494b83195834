pub mod items;
pub mod look;
pub mod table;

pub use items::*;
pub use look::*;
pub use table::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetError {
    /// A compact "look" string decoded to fewer than four numeric tokens.
    MalformedCoordinate { raw: String },
    /// A plane cell did not hold a number.
    MalformedPlane { raw: String },
}

impl std::fmt::Display for SheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetError::MalformedCoordinate { raw } => {
                write!(f, "malformed look coordinate: {raw:?}")
            }
            SheetError::MalformedPlane { raw } => write!(f, "malformed plane cell: {raw:?}"),
        }
    }
}

impl std::error::Error for SheetError {}
