use foundation::grid::PixelBounds;

/// Snapshot of the host map's current view, taken on every move-end or
/// zoom-animate event. Pixel bounds are expressed at the layer's native
/// zoom, so the tile range derivation is a plain unscale-by-tile-size.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub pixel_bounds: PixelBounds,
    /// Display zoom (may differ from the native tile zoom).
    pub zoom: f64,
    /// Currently displayed plane (floor).
    pub plane: i32,
}

impl Viewport {
    pub fn new(pixel_bounds: PixelBounds, zoom: f64, plane: i32) -> Self {
        Self {
            pixel_bounds,
            zoom,
            plane,
        }
    }
}
