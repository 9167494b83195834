const CELL_SHIFT: i32 = 6;
const KEY_DELIMITER: char = ':';

/// Absolute in-world coordinate. 64 world units per grid cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorldPosition {
    pub plane: i32,
    pub x: i32,
    pub y: i32,
}

impl WorldPosition {
    pub fn new(plane: i32, x: i32, y: i32) -> Self {
        Self { plane, x, y }
    }

    /// The coarse cell this position falls in (cell size 64).
    pub fn coarse_cell(&self) -> (i32, i32) {
        (self.x >> CELL_SHIFT, self.y >> CELL_SHIFT)
    }
}

/// Grid cell address at a given zoom level.
///
/// Derived from a `WorldPosition` by dividing out the cell size and flipping
/// the y axis into screen space. Many world positions map to one tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub plane: i32,
}

impl TileCoordinate {
    pub fn new(x: i32, y: i32, z: i32, plane: i32) -> Self {
        Self { x, y, z, plane }
    }
}

/// Converts a world position to its tile at the layer's native zoom.
pub fn world_to_tile(pos: WorldPosition, native_zoom: i32) -> TileCoordinate {
    TileCoordinate {
        x: pos.x >> CELL_SHIFT,
        y: -(pos.y >> CELL_SHIFT),
        z: native_zoom,
        plane: pos.plane,
    }
}

/// String form of a tile address, used as the bucket/grid mapping key.
///
/// Format is `"<foldedPlane>:<x>:<y>"`; zoom is not part of the key because
/// the icon grid operates at a single native zoom.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey(String);

impl TileKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Parse(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Parse(raw) => write!(f, "malformed tile key: {raw:?}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Pure tile-key codec.
///
/// With `fold_plane` enabled every plane encodes to 0, so markers on all
/// planes of a column share one bucket; decode then reports plane 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    pub fold_plane: bool,
}

impl KeyCodec {
    pub fn new(fold_plane: bool) -> Self {
        Self { fold_plane }
    }

    pub fn encode(&self, coords: &TileCoordinate) -> TileKey {
        let plane = if self.fold_plane { 0 } else { coords.plane };
        TileKey(format!(
            "{plane}{KEY_DELIMITER}{}{KEY_DELIMITER}{}",
            coords.x, coords.y
        ))
    }

    /// Inverse of `encode` for the fields folding preserves; `z` is not part
    /// of the key and decodes as 0.
    pub fn decode(&self, key: &TileKey) -> Result<TileCoordinate, CodecError> {
        let mut fields = key.0.split(KEY_DELIMITER);
        let plane = parse_field(&key.0, fields.next())?;
        let x = parse_field(&key.0, fields.next())?;
        let y = parse_field(&key.0, fields.next())?;
        if fields.next().is_some() {
            return Err(CodecError::Parse(key.0.clone()));
        }
        Ok(TileCoordinate {
            x,
            y,
            z: 0,
            plane: if self.fold_plane { 0 } else { plane },
        })
    }

    /// Key for a world position at the native zoom.
    pub fn key_for_position(&self, pos: WorldPosition, native_zoom: i32) -> TileKey {
        self.encode(&world_to_tile(pos, native_zoom))
    }
}

fn parse_field(raw: &str, field: Option<&str>) -> Result<i32, CodecError> {
    field
        .and_then(|f| f.parse::<i32>().ok())
        .ok_or_else(|| CodecError::Parse(raw.to_string()))
}
