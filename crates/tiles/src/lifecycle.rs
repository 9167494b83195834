use std::collections::BTreeMap;

use foundation::coords::{KeyCodec, TileCoordinate, TileKey};
use foundation::grid::{GridError, tile_range_from_pixel_bounds};
use markers::{MarkerRecord, TileBuckets};
use tracing::debug;

use crate::view::Viewport;

/// How many zoom-out levels the retention pass probes for an active
/// ancestor, and how deep it probes the descendant subtree.
const ANCESTOR_LEVELS: i32 = 5;
const DESCENDANT_LEVELS: i32 = 2;

/// Capability interface the life-cycle manager renders through.
///
/// The manager never touches a mapping library directly; the host implements
/// attach/detach/restyle against whatever rendering substrate it uses.
pub trait RenderSurface {
    type Handle;

    /// Materializes one marker. `ghost` asks for the greyed icon used for
    /// markers on a plane other than the displayed one.
    fn attach(&mut self, record: &MarkerRecord, ghost: bool) -> Self::Handle;
    fn detach(&mut self, handle: Self::Handle);
    fn restyle(&mut self, handle: &mut Self::Handle, ghost: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEvent {
    /// First tile of a load batch is about to materialize.
    LoadStart,
    /// A tile's markers were detached and its entry removed. The coordinate
    /// is decoded from the tile key, so it carries the folded plane under
    /// show3d and no zoom.
    Unload(TileCoordinate),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileOptions {
    /// Zoom level at which one tile corresponds to one unit of granularity
    /// of the marker data. The grid always operates here.
    pub native_zoom: i32,
    /// Pixel size of one tile at the native zoom.
    pub native_tile_size: f64,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    /// Extra tile margin kept materialized around the visible range.
    pub keep_buffer: i32,
    /// Fold tile keys across planes and grey out off-plane markers.
    pub show3d: bool,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            native_zoom: 2,
            native_tile_size: 256.0,
            min_zoom: None,
            max_zoom: None,
            keep_buffer: 2,
            show3d: true,
        }
    }
}

#[derive(Debug)]
struct RenderedMarker<H> {
    plane: i32,
    handle: H,
}

#[derive(Debug)]
struct LiveTile<H> {
    coords: TileCoordinate,
    markers: Vec<RenderedMarker<H>>,
    current: bool,
    retain: bool,
    active: bool,
    loaded: bool,
}

/// Viewport-driven cache of materialized marker tiles.
///
/// Per-key states: absent, current (in the visible range this cycle),
/// stale-retained (left the range but kept one extra prune cycle by the
/// ancestor/descendant heuristic), then absent again. At most one live tile
/// exists per key.
#[derive(Debug)]
pub struct TileLifecycle<H> {
    options: TileOptions,
    codec: KeyCodec,
    tiles: BTreeMap<TileKey, LiveTile<H>>,
    tile_zoom: Option<i32>,
    loading: bool,
    events: Vec<TileEvent>,
}

impl<H> TileLifecycle<H> {
    pub fn new(options: TileOptions) -> Self {
        Self {
            codec: KeyCodec::new(options.show3d),
            options,
            tiles: BTreeMap::new(),
            tile_zoom: None,
            loading: false,
            events: Vec::new(),
        }
    }

    /// True while a batch of tiles is materializing.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn live_tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_live(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    /// Hands pending notifications (load-start, unload) to the host.
    pub fn drain_events(&mut self) -> Vec<TileEvent> {
        std::mem::take(&mut self.events)
    }

    /// Full view reset: re-derives the tile zoom, aborts any in-flight load,
    /// reloads the grid and (unless `no_prune`) runs the retention pass.
    pub fn set_view<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        buckets: &TileBuckets,
        surface: &mut S,
        no_prune: bool,
        no_update: bool,
    ) -> Result<(), GridError> {
        let tile_zoom = if self.zoom_in_range(viewport.zoom) {
            Some(self.options.native_zoom)
        } else {
            None
        };

        let tile_zoom_changed = tile_zoom != self.tile_zoom;
        if !no_update || tile_zoom_changed {
            self.tile_zoom = tile_zoom;
            self.abort_loading();

            if tile_zoom.is_some() {
                self.update_inner(viewport, buckets, surface, false)?;
            }
            if !no_prune {
                self.prune(viewport, surface);
            }
        }
        Ok(())
    }

    /// Incremental update on a viewport change: evicts tiles that left the
    /// buffered range, then materializes newly visible tiles with bucket
    /// data. Defers to a full view reset when the display zoom has drifted
    /// more than one level from the tile zoom.
    pub fn update<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        buckets: &TileBuckets,
        surface: &mut S,
    ) -> Result<(), GridError> {
        self.update_inner(viewport, buckets, surface, true)
    }

    fn update_inner<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        buckets: &TileBuckets,
        surface: &mut S,
        allow_reset: bool,
    ) -> Result<(), GridError> {
        let Some(tile_zoom) = self.tile_zoom else {
            return Ok(());
        };

        let range =
            tile_range_from_pixel_bounds(viewport.pixel_bounds, self.options.native_tile_size)?;
        let no_prune_range = range.expand(self.options.keep_buffer);

        let stale: Vec<TileKey> = self
            .tiles
            .iter()
            .filter(|(_, tile)| {
                tile.coords.z != tile_zoom
                    || !no_prune_range.contains(tile.coords.x, tile.coords.y)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.remove_tile(key, surface);
        }

        if allow_reset && (viewport.zoom - tile_zoom as f64).abs() > 1.0 {
            return self.set_view(viewport, buckets, surface, false, false);
        }

        let mut queue: Vec<TileCoordinate> = Vec::new();
        for (x, y) in range.iter() {
            let coords = TileCoordinate::new(x, y, tile_zoom, viewport.plane);
            let key = self.codec.encode(&coords);
            if let Some(tile) = self.tiles.get_mut(&key) {
                tile.current = true;
            } else if buckets.contains(&key) {
                queue.push(coords);
            }
        }

        if !queue.is_empty() {
            if !self.loading {
                self.loading = true;
                self.events.push(TileEvent::LoadStart);
            }
            debug!(tiles = queue.len(), "materializing marker tiles");
            for coords in queue {
                self.add_icons(coords, buckets, surface, viewport.plane);
            }
            self.loading = false;
        }
        Ok(())
    }

    /// Retention pass, run after explicit resets.
    ///
    /// Every live tile outside the current range is kept one extra cycle if
    /// an ancestor within a bounded number of zoom-out levels is active, or
    /// failing that if any descendant within a bounded depth is active or
    /// loaded. Everything else is evicted. This briefly over-renders instead
    /// of flickering during rapid zoom changes.
    pub fn prune<S: RenderSurface<Handle = H>>(&mut self, viewport: &Viewport, surface: &mut S) {
        if !self.zoom_in_range(viewport.zoom) {
            self.remove_all(surface);
            return;
        }

        for tile in self.tiles.values_mut() {
            tile.retain = tile.current;
        }

        let candidates: Vec<(TileKey, TileCoordinate)> = self
            .tiles
            .iter()
            .filter(|(_, tile)| !tile.current)
            .map(|(key, tile)| (key.clone(), tile.coords))
            .collect();
        for (key, coords) in candidates {
            if self.ancestor_is_active(coords) || self.descendant_is_resident(coords) {
                if let Some(tile) = self.tiles.get_mut(&key) {
                    tile.retain = true;
                }
            }
        }

        let evict: Vec<TileKey> = self
            .tiles
            .iter()
            .filter(|(_, tile)| !tile.retain)
            .map(|(key, _)| key.clone())
            .collect();
        for key in evict {
            self.remove_tile(&key, surface);
        }
    }

    /// Detaches everything and clears the grid.
    pub fn remove_all<S: RenderSurface<Handle = H>>(&mut self, surface: &mut S) {
        let keys: Vec<TileKey> = self.tiles.keys().cloned().collect();
        for key in keys {
            self.remove_tile(&key, surface);
        }
    }

    /// Clears all tiles and materializes the current view again.
    pub fn redraw<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        buckets: &TileBuckets,
        surface: &mut S,
    ) -> Result<(), GridError> {
        self.remove_all(surface);
        self.update_inner(viewport, buckets, surface, true)
    }

    /// Re-evaluates each live marker's icon for the new plane without
    /// reconstructing any marker.
    pub fn on_plane_change<S: RenderSurface<Handle = H>>(
        &mut self,
        new_plane: i32,
        surface: &mut S,
    ) {
        let show3d = self.options.show3d;
        for tile in self.tiles.values_mut() {
            for marker in &mut tile.markers {
                surface.restyle(&mut marker.handle, show3d && marker.plane != new_plane);
            }
        }
    }

    fn abort_loading(&mut self) {
        // Materialization runs synchronously to completion, so aborting an
        // in-flight load only needs the flag cleared before the reload.
        self.loading = false;
    }

    fn zoom_in_range(&self, zoom: f64) -> bool {
        if self.options.max_zoom.is_some_and(|max| zoom > max) {
            return false;
        }
        if self.options.min_zoom.is_some_and(|min| zoom < min) {
            return false;
        }
        true
    }

    fn add_icons<S: RenderSurface<Handle = H>>(
        &mut self,
        coords: TileCoordinate,
        buckets: &TileBuckets,
        surface: &mut S,
        display_plane: i32,
    ) {
        let key = self.codec.encode(&coords);
        let Some(data) = buckets.get(&key) else {
            return;
        };
        let markers = data
            .iter()
            .map(|record| RenderedMarker {
                plane: record.plane,
                handle: surface.attach(record, self.options.show3d && record.plane != display_plane),
            })
            .collect();
        self.tiles.insert(
            key,
            LiveTile {
                coords,
                markers,
                current: true,
                retain: false,
                active: true,
                loaded: true,
            },
        );
    }

    fn remove_tile<S: RenderSurface<Handle = H>>(&mut self, key: &TileKey, surface: &mut S) {
        let Some(tile) = self.tiles.remove(key) else {
            return;
        };
        for marker in tile.markers {
            surface.detach(marker.handle);
        }
        // Keys only come from `encode`, so decoding cannot fail.
        if let Ok(coords) = self.codec.decode(key) {
            self.events.push(TileEvent::Unload(coords));
        }
    }

    /// Bounded upward walk over the implicit quad-tree: coordinates halve
    /// per level. Explicitly iterative, never the call stack.
    fn ancestor_is_active(&self, coords: TileCoordinate) -> bool {
        let (mut x, mut y, mut z) = (coords.x, coords.y, coords.z);
        let min_z = coords.z - ANCESTOR_LEVELS;
        while z > min_z {
            x = x.div_euclid(2);
            y = y.div_euclid(2);
            z -= 1;
            let key = self.codec.encode(&TileCoordinate::new(x, y, z, coords.plane));
            if let Some(tile) = self.tiles.get(&key)
                && tile.active
            {
                return true;
            }
        }
        false
    }

    /// Bounded depth-first probe of the 2×2 descendant subtree, driven by an
    /// explicit stack.
    fn descendant_is_resident(&self, coords: TileCoordinate) -> bool {
        let max_z = coords.z + DESCENDANT_LEVELS;
        let mut stack = vec![(coords.x, coords.y, coords.z)];
        while let Some((x, y, z)) = stack.pop() {
            if z >= max_z {
                continue;
            }
            for i in (2 * x)..(2 * x + 2) {
                for j in (2 * y)..(2 * y + 2) {
                    let key = self.codec.encode(&TileCoordinate::new(i, j, z + 1, coords.plane));
                    if let Some(tile) = self.tiles.get(&key)
                        && (tile.active || tile.loaded)
                    {
                        return true;
                    }
                    stack.push((i, j, z + 1));
                }
            }
        }
        false
    }

    #[cfg(test)]
    fn insert_raw(&mut self, coords: TileCoordinate, current: bool, active: bool) {
        let key = self.codec.encode(&coords);
        self.tiles.insert(
            key,
            LiveTile {
                coords,
                markers: Vec::new(),
                current,
                retain: false,
                active,
                loaded: active,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use foundation::coords::{KeyCodec, TileCoordinate, WorldPosition};
    use foundation::grid::PixelBounds;
    use markers::{PipelineConfig, TileBuckets, WateryTiles, build_markers};
    use sheets::parse_table;

    use crate::view::Viewport;

    use super::{RenderSurface, TileEvent, TileLifecycle, TileOptions};

    /// Counting surface; handles are sequence numbers.
    #[derive(Debug, Default)]
    struct Surface {
        next: u64,
        attached: Vec<u64>,
        restyled: Vec<(u64, bool)>,
    }

    impl RenderSurface for Surface {
        type Handle = u64;

        fn attach(&mut self, _record: &markers::MarkerRecord, _ghost: bool) -> u64 {
            self.next += 1;
            self.attached.push(self.next);
            self.next
        }

        fn detach(&mut self, handle: u64) {
            self.attached.retain(|h| *h != handle);
        }

        fn restyle(&mut self, handle: &mut u64, ghost: bool) {
            self.restyled.push((*handle, ghost));
        }
    }

    fn buckets_with_marker_at(world: WorldPosition) -> TileBuckets {
        let look = format!(
            "({}, {}, {}, {})",
            world.x >> 6,
            world.y >> 6,
            world.x & 63,
            world.y & 63
        );
        let rows: Vec<Vec<String>> = vec![
            vec!["Lodestones".into(), "Pos".into(), "Look".into()],
            vec!["Marker".into(), world.plane.to_string(), look],
        ];
        let groups = parse_table(&rows);
        build_markers(&groups, &WateryTiles::new(), &PipelineConfig::default()).unwrap()
    }

    fn viewport_over_tile(x: i32, y: i32) -> Viewport {
        let min = [x as f64 * 256.0 + 1.0, y as f64 * 256.0 + 1.0];
        let max = [min[0] + 254.0, min[1] + 254.0];
        Viewport::new(PixelBounds::new(min, max), 2.0, 0)
    }

    #[test]
    fn visible_tile_with_bucket_data_materializes() {
        // World (3200, 3200) is tile (50, -50) at the native zoom.
        let buckets = buckets_with_marker_at(WorldPosition::new(0, 3200, 3200));
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions::default());
        let mut surface = Surface::default();

        let viewport = viewport_over_tile(50, -50);
        grid.set_view(&viewport, &buckets, &mut surface, true, false)
            .unwrap();

        assert_eq!(grid.live_tile_count(), 1);
        assert_eq!(surface.attached.len(), 1);
        assert!(!grid.is_loading());
        assert!(grid.drain_events().contains(&TileEvent::LoadStart));
    }

    #[test]
    fn leaving_the_buffered_range_unloads_exactly_once() {
        let buckets = buckets_with_marker_at(WorldPosition::new(0, 3200, 3200));
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions::default());
        let mut surface = Surface::default();

        grid.set_view(&viewport_over_tile(50, -50), &buckets, &mut surface, true, false)
            .unwrap();
        grid.drain_events();

        // Move far away; the key leaves the buffered range.
        grid.update(&viewport_over_tile(0, 0), &buckets, &mut surface)
            .unwrap();
        let unloads: Vec<_> = grid
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, TileEvent::Unload(_)))
            .collect();
        assert_eq!(
            unloads,
            vec![TileEvent::Unload(TileCoordinate::new(50, -50, 0, 0))]
        );
        assert_eq!(grid.live_tile_count(), 0);
        assert!(surface.attached.is_empty());

        // A second update must not fire another unload for the same key.
        grid.update(&viewport_over_tile(0, 0), &buckets, &mut surface)
            .unwrap();
        assert!(grid.drain_events().is_empty());
    }

    #[test]
    fn unload_event_carries_the_decoded_key() {
        // Marker on plane 1; show3d folds the key, so the notification
        // reports plane 0 and zoom 0 regardless of the stored coordinate.
        let buckets = buckets_with_marker_at(WorldPosition::new(1, 3200, 3200));
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions::default());
        let mut surface = Surface::default();
        grid.set_view(&viewport_over_tile(50, -50), &buckets, &mut surface, true, false)
            .unwrap();
        grid.drain_events();

        grid.update(&viewport_over_tile(0, 0), &buckets, &mut surface)
            .unwrap();
        assert_eq!(
            grid.drain_events(),
            vec![TileEvent::Unload(TileCoordinate::new(50, -50, 0, 0))]
        );
    }

    #[test]
    fn tiles_without_bucket_data_are_skipped() {
        let buckets = TileBuckets::new();
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions::default());
        let mut surface = Surface::default();
        grid.set_view(&viewport_over_tile(50, -50), &buckets, &mut surface, true, false)
            .unwrap();
        assert_eq!(grid.live_tile_count(), 0);
        assert!(grid.drain_events().is_empty());
    }

    #[test]
    fn non_finite_viewport_is_fatal_for_the_cycle() {
        let buckets = TileBuckets::new();
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions::default());
        let mut surface = Surface::default();
        let viewport = Viewport::new(
            PixelBounds::new([f64::INFINITY, 0.0], [1.0, 1.0]),
            2.0,
            0,
        );
        assert!(grid
            .set_view(&viewport, &buckets, &mut surface, true, false)
            .is_err());
    }

    #[test]
    fn prune_retains_tile_with_active_ancestor() {
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions {
            show3d: false,
            ..TileOptions::default()
        });
        let mut surface = Surface::default();

        // Stale tile at (8, 8, z4); its ancestor (1, 1, z1) is active —
        // three zoom-out levels, within the bounded walk.
        grid.insert_raw(TileCoordinate::new(8, 8, 4, 0), false, false);
        grid.insert_raw(TileCoordinate::new(1, 1, 1, 0), true, true);

        let viewport = viewport_over_tile(1, 1);
        grid.prune(&viewport, &mut surface);

        let codec = KeyCodec::new(false);
        assert!(grid.is_live(&codec.encode(&TileCoordinate::new(8, 8, 4, 0))));
    }

    #[test]
    fn prune_retains_tile_with_loaded_descendant() {
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions {
            show3d: false,
            ..TileOptions::default()
        });
        let mut surface = Surface::default();

        grid.insert_raw(TileCoordinate::new(3, 3, 2, 0), false, false);
        // One of its four children is loaded.
        grid.insert_raw(TileCoordinate::new(6, 7, 3, 0), true, true);

        grid.prune(&viewport_over_tile(6, 7), &mut surface);

        let codec = KeyCodec::new(false);
        assert!(grid.is_live(&codec.encode(&TileCoordinate::new(3, 3, 2, 0))));
    }

    #[test]
    fn prune_evicts_uncovered_stale_tiles() {
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions {
            show3d: false,
            ..TileOptions::default()
        });
        let mut surface = Surface::default();

        grid.insert_raw(TileCoordinate::new(40, 40, 4, 0), false, false);
        grid.prune(&viewport_over_tile(0, 0), &mut surface);

        assert_eq!(grid.live_tile_count(), 0);
        assert!(matches!(
            grid.drain_events().as_slice(),
            [TileEvent::Unload(_)]
        ));
    }

    #[test]
    fn out_of_zoom_bounds_prune_removes_everything() {
        let buckets = buckets_with_marker_at(WorldPosition::new(0, 3200, 3200));
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions {
            max_zoom: Some(4.0),
            ..TileOptions::default()
        });
        let mut surface = Surface::default();
        grid.set_view(&viewport_over_tile(50, -50), &buckets, &mut surface, true, false)
            .unwrap();
        assert_eq!(grid.live_tile_count(), 1);

        let mut zoomed = viewport_over_tile(50, -50);
        zoomed.zoom = 5.0;
        grid.prune(&zoomed, &mut surface);
        assert_eq!(grid.live_tile_count(), 0);
    }

    #[test]
    fn plane_change_restyles_markers_in_place() {
        let buckets = buckets_with_marker_at(WorldPosition::new(1, 3200, 3200));
        let mut grid: TileLifecycle<u64> = TileLifecycle::new(TileOptions::default());
        let mut surface = Surface::default();
        grid.set_view(&viewport_over_tile(50, -50), &buckets, &mut surface, true, false)
            .unwrap();
        let attached_before = surface.attached.clone();

        grid.on_plane_change(1, &mut surface);
        assert_eq!(surface.restyled, vec![(attached_before[0], false)]);

        grid.on_plane_change(0, &mut surface);
        assert_eq!(surface.restyled.last(), Some(&(attached_before[0], true)));
        // No marker was reconstructed.
        assert_eq!(surface.attached, attached_before);
    }
}
