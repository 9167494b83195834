use std::collections::{BTreeMap, BTreeSet};

use foundation::coords::WorldPosition;

/// Lookup of submerged tiles, keyed by coarse cell `(x >> 6, y >> 6)`.
///
/// Within a cell a tile is identified as `(x << 14) + y` of its world
/// coordinate. Positions found here sit one plane lower than the sheet
/// records them, so the pipeline decrements their plane.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WateryTiles {
    cells: BTreeMap<(i32, i32), BTreeSet<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WateryError {
    Json(String),
    BadCellKey(String),
}

impl std::fmt::Display for WateryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WateryError::Json(msg) => write!(f, "watery table is not valid JSON: {msg}"),
            WateryError::BadCellKey(raw) => write!(f, "watery cell key is not \"x:y\": {raw:?}"),
        }
    }
}

impl std::error::Error for WateryError {}

impl WateryTiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags the tile containing the given world coordinate.
    pub fn insert(&mut self, x: i32, y: i32) {
        self.cells
            .entry((x >> 6, y >> 6))
            .or_default()
            .insert(tile_id(x, y));
    }

    pub fn is_watery(&self, pos: &WorldPosition) -> bool {
        self.cells
            .get(&pos.coarse_cell())
            .is_some_and(|ids| ids.contains(&tile_id(pos.x, pos.y)))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Parses the JSON endpoint shape: an object of `"x:y"` coarse-cell keys
    /// to arrays of tile identifiers.
    pub fn from_json(raw: &str) -> Result<Self, WateryError> {
        let table: BTreeMap<String, Vec<i64>> =
            serde_json::from_str(raw).map_err(|e| WateryError::Json(e.to_string()))?;

        let mut out = Self::new();
        for (key, ids) in table {
            let cell = parse_cell_key(&key)?;
            out.cells.entry(cell).or_default().extend(ids);
        }
        Ok(out)
    }
}

fn tile_id(x: i32, y: i32) -> i64 {
    ((x as i64) << 14) + y as i64
}

fn parse_cell_key(raw: &str) -> Result<(i32, i32), WateryError> {
    let mut parts = raw.split(':');
    let x = parts.next().and_then(|p| p.parse::<i32>().ok());
    let y = parts.next().and_then(|p| p.parse::<i32>().ok());
    match (x, y, parts.next()) {
        (Some(x), Some(y), None) => Ok((x, y)),
        _ => Err(WateryError::BadCellKey(raw.to_string())),
    }
}
