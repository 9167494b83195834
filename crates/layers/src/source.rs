use markers::WateryTiles;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    Network(String),
    Data(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Network(msg) => write!(f, "marker data fetch failed: {msg}"),
            SourceError::Data(msg) => write!(f, "marker data is malformed: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Remote data the layer loads on add: the spreadsheet-shaped marker table
/// and the watery-tile lookup. Both fetches must succeed before any marker
/// appears (all-or-nothing); the HTTP implementation lives with the host.
pub trait MarkerSource {
    fn fetch_sheet(&self) -> Result<Vec<Vec<String>>, SourceError>;
    fn fetch_watery(&self) -> Result<WateryTiles, SourceError>;
}

/// Pre-fetched source, used by tests and by hosts that load out of band.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    pub rows: Vec<Vec<String>>,
    pub watery: WateryTiles,
}

impl MarkerSource for InMemorySource {
    fn fetch_sheet(&self) -> Result<Vec<Vec<String>>, SourceError> {
        Ok(self.rows.clone())
    }

    fn fetch_watery(&self) -> Result<WateryTiles, SourceError> {
        Ok(self.watery.clone())
    }
}
