use foundation::coords::TileKey;
use foundation::grid::GridError;
use markers::{FilterFn, MapFn, MarkerRecord, PipelineConfig, TileBuckets, build_markers};
use sheets::parse_table;
use tiles::{RenderSurface, TileEvent, TileLifecycle, TileOptions, Viewport};
use tracing::{error, info};

use crate::fanout::{FanCandidate, FanOutConfig, FanOutController, MarkerId, MarkerMove};
use crate::source::MarkerSource;

pub struct DynamicIconsOptions {
    pub tile: TileOptions,
    pub fan: FanOutConfig,
    pub icon_base_url: String,
    /// Applied to the final record list, filter before map.
    pub filter: Option<FilterFn>,
    pub map: Option<MapFn>,
    pub source: Option<Box<dyn MarkerSource>>,
}

impl Default for DynamicIconsOptions {
    fn default() -> Self {
        Self {
            tile: TileOptions::default(),
            fan: FanOutConfig::default(),
            icon_base_url: "icons".to_string(),
            filter: None,
            map: None,
            source: None,
        }
    }
}

#[derive(Debug)]
pub enum LayerError {
    /// A required option is missing; raised synchronously at setup.
    Configuration(String),
    /// The projected tile range was unusable; fatal for this render cycle.
    Projection(GridError),
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::Configuration(msg) => write!(f, "layer misconfigured: {msg}"),
            LayerError::Projection(e) => write!(f, "projection failed: {e}"),
        }
    }
}

impl std::error::Error for LayerError {}

impl From<GridError> for LayerError {
    fn from(e: GridError) -> Self {
        LayerError::Projection(e)
    }
}

/// The dynamic icon layer: marker data load, viewport-driven tile
/// materialization, plane-aware icon selection, and hover fan-out.
///
/// The host owns the rendering substrate and drives this layer from its
/// event loop: `on_add` when the layer joins the map, `update` on move-end,
/// `reset_view` on zoom transitions, `on_plane_change` on floor switches,
/// `on_remove` on teardown.
pub struct DynamicIconsLayer<H> {
    pipeline: PipelineConfig,
    fan_config: FanOutConfig,
    source: Option<Box<dyn MarkerSource>>,
    buckets: TileBuckets,
    lifecycle: TileLifecycle<H>,
    fan: FanOutController,
}

impl<H> DynamicIconsLayer<H> {
    pub fn new(options: DynamicIconsOptions) -> Self {
        let pipeline = PipelineConfig {
            native_zoom: options.tile.native_zoom,
            fold_plane: options.tile.show3d,
            icon_base_url: options.icon_base_url,
            filter: options.filter,
            map: options.map,
        };
        Self {
            lifecycle: TileLifecycle::new(options.tile),
            pipeline,
            fan_config: options.fan,
            source: options.source,
            buckets: TileBuckets::new(),
            fan: FanOutController::new(),
        }
    }

    /// Loads marker data and materializes the first view.
    ///
    /// The sheet and watery fetches are joined all-or-nothing: if either
    /// fails, the failure is logged and the layer stays empty. A missing
    /// data source is a configuration error and fails immediately.
    pub fn on_add<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        surface: &mut S,
    ) -> Result<(), LayerError> {
        let Some(source) = &self.source else {
            return Err(LayerError::Configuration(
                "no data source specified".to_string(),
            ));
        };

        let joined = source
            .fetch_sheet()
            .and_then(|rows| source.fetch_watery().map(|watery| (rows, watery)));
        let (rows, watery) = match joined {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "marker data load failed; layer stays empty");
                return Ok(());
            }
        };

        let groups = parse_table(&rows);
        self.buckets = match build_markers(&groups, &watery, &self.pipeline) {
            Ok(buckets) => buckets,
            Err(e) => {
                error!(error = %e, "marker pipeline failed; layer stays empty");
                return Ok(());
            }
        };
        info!(buckets = self.buckets.len(), "marker layer data ready");

        self.lifecycle
            .set_view(viewport, &self.buckets, surface, true, false)?;
        Ok(())
    }

    /// Detaches all markers and releases the pointer subscription.
    pub fn on_remove<S: RenderSurface<Handle = H>>(&mut self, surface: &mut S) {
        self.fan.release();
        self.lifecycle.remove_all(surface);
    }

    /// Incremental move-end update.
    pub fn update<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        surface: &mut S,
    ) -> Result<(), LayerError> {
        self.lifecycle.update(viewport, &self.buckets, surface)?;
        Ok(())
    }

    /// Full reset on zoom transitions.
    pub fn reset_view<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        surface: &mut S,
        no_prune: bool,
    ) -> Result<(), LayerError> {
        self.lifecycle
            .set_view(viewport, &self.buckets, surface, no_prune, false)?;
        Ok(())
    }

    /// Clears all tiles and requests them again.
    pub fn redraw<S: RenderSurface<Handle = H>>(
        &mut self,
        viewport: &Viewport,
        surface: &mut S,
    ) -> Result<(), LayerError> {
        self.lifecycle.redraw(viewport, &self.buckets, surface)?;
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    pub fn drain_events(&mut self) -> Vec<TileEvent> {
        self.lifecycle.drain_events()
    }

    pub fn buckets(&self) -> &TileBuckets {
        &self.buckets
    }

    pub fn live_tile_count(&self) -> usize {
        self.lifecycle.live_tile_count()
    }

    pub fn on_plane_change<S: RenderSurface<Handle = H>>(
        &mut self,
        new_plane: i32,
        surface: &mut S,
    ) {
        self.lifecycle.on_plane_change(new_plane, surface);
    }

    /// Gathers the fan candidates of one tile bucket: its teleport records,
    /// paired with the id and screen position the host resolves for each
    /// rendered marker (`None` for records not currently rendered).
    pub fn teleport_candidates(
        &self,
        key: &TileKey,
        mut resolve: impl FnMut(&MarkerRecord) -> Option<(MarkerId, [f64; 2])>,
    ) -> Vec<FanCandidate> {
        self.buckets
            .get(key)
            .into_iter()
            .flatten()
            .filter(|record| record.is_teleport())
            .filter_map(|record| {
                resolve(record).map(|(id, position)| FanCandidate { id, position })
            })
            .collect()
    }

    /// Hover on a teleport marker. `candidates` are the rendered teleport
    /// markers of the hovered marker's tile bucket; the controller decides
    /// which coincide and whether to fan at this zoom.
    pub fn hover_teleport(
        &mut self,
        zoom: f64,
        hovered: MarkerId,
        candidates: &[FanCandidate],
    ) -> Vec<MarkerMove> {
        self.fan.fan_out(&self.fan_config, zoom, hovered, candidates)
    }

    pub fn on_pointer_move(&mut self, pointer: [f64; 2]) -> Vec<MarkerMove> {
        self.fan.on_pointer_move(pointer)
    }
}
