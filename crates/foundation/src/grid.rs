/// Pixel-space bounding box of a viewport.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelBounds {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl PixelBounds {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        PixelBounds { min, max }
    }

    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
    }
}

/// Inclusive tile-index rectangle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileRange {
    pub min: (i32, i32),
    pub max: (i32, i32),
}

impl TileRange {
    pub fn new(min: (i32, i32), max: (i32, i32)) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min.0 && x <= self.max.0 && y >= self.min.1 && y <= self.max.1
    }

    /// Grows the range by `margin` tiles on every side.
    pub fn expand(&self, margin: i32) -> Self {
        Self {
            min: (self.min.0 - margin, self.min.1 - margin),
            max: (self.max.0 + margin, self.max.1 + margin),
        }
    }

    /// Row-major iteration over every (x, y) in the range.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let range = *self;
        (range.min.1..=range.max.1)
            .flat_map(move |y| (range.min.0..=range.max.0).map(move |x| (x, y)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// The projected tile range contains a non-finite bound. Loading it
    /// would mean materializing an unbounded number of tiles, so the render
    /// cycle is abandoned.
    NonFiniteRange(PixelBounds),
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::NonFiniteRange(bounds) => {
                write!(f, "tile range is not finite (pixel bounds {bounds:?})")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// Converts a pixel bounding box to the tile-index range covering it.
pub fn tile_range_from_pixel_bounds(
    bounds: PixelBounds,
    tile_size: f64,
) -> Result<TileRange, GridError> {
    if !bounds.is_finite() || !(tile_size > 0.0) {
        return Err(GridError::NonFiniteRange(bounds));
    }
    let min_x = (bounds.min[0] / tile_size).floor();
    let min_y = (bounds.min[1] / tile_size).floor();
    let max_x = (bounds.max[0] / tile_size).ceil();
    let max_y = (bounds.max[1] / tile_size).ceil();
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return Err(GridError::NonFiniteRange(bounds));
    }
    Ok(TileRange::new(
        (min_x as i32, min_y as i32),
        (max_x as i32, max_y as i32),
    ))
}

#[cfg(test)]
mod tests {
    use super::{PixelBounds, TileRange, tile_range_from_pixel_bounds};

    #[test]
    fn pixel_bounds_floor_and_ceil_to_tiles() {
        let bounds = PixelBounds::new([100.0, -30.0], [700.0, 500.0]);
        let range = tile_range_from_pixel_bounds(bounds, 256.0).unwrap();
        assert_eq!(range, TileRange::new((0, -1), (3, 2)));
    }

    #[test]
    fn non_finite_bounds_are_rejected() {
        let bounds = PixelBounds::new([f64::NEG_INFINITY, 0.0], [10.0, 10.0]);
        assert!(tile_range_from_pixel_bounds(bounds, 256.0).is_err());
    }

    #[test]
    fn expand_adds_margin_on_all_sides() {
        let range = TileRange::new((0, 0), (2, 2)).expand(2);
        assert_eq!(range, TileRange::new((-2, -2), (4, 4)));
        assert!(range.contains(-2, 4));
        assert!(!range.contains(-3, 0));
    }

    #[test]
    fn iteration_is_row_major() {
        let range = TileRange::new((0, 0), (1, 1));
        let cells: Vec<_> = range.iter().collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }
}
