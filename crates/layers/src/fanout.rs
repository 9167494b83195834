use std::f64::consts::PI;

/// Host-assigned identity of a rendered marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(pub u64);

/// Coincidence tolerance at zoom 0, in layer coordinate units. Halves per
/// zoom level so fanning stays proportional to what the eye can separate.
const BASE_TOLERANCE: f64 = 4.0;

/// Once the pointer is this many radii from the fan centroid, the fan folds
/// back up.
const RELEASE_FACTOR: f64 = 1.5;

pub fn coincidence_tolerance(zoom: f64) -> f64 {
    BASE_TOLERANCE / 2f64.powf(zoom)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FanOutConfig {
    /// Polygon radius scale.
    pub fan_radius: f64,
    /// Minimum display zoom at which hovering fans coincident markers.
    pub fan_zoom: f64,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            fan_radius: 3.0,
            fan_zoom: 2.0,
        }
    }
}

/// A marker eligible for fanning: same tile bucket as the hovered marker and
/// of teleport type. The caller gathers these; the controller decides which
/// actually coincide.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FanCandidate {
    pub id: MarkerId,
    pub position: [f64; 2],
}

/// A position change the host must apply to a rendered marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerMove {
    pub id: MarkerId,
    pub to: [f64; 2],
}

#[derive(Debug, Clone)]
struct ActiveFan {
    centroid: [f64; 2],
    radius: f64,
    originals: Vec<(MarkerId, [f64; 2])>,
}

/// Repositions coincident markers along a regular polygon on hover and
/// restores them when the pointer leaves.
///
/// One controller per layer; its pointer subscription is released with the
/// layer, never through any process-wide registry.
#[derive(Debug, Default)]
pub struct FanOutController {
    active: Option<ActiveFan>,
}

impl FanOutController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_fanned(&self, id: MarkerId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|fan| fan.originals.iter().any(|(m, _)| *m == id))
    }

    /// Fans the markers coinciding with `hovered` out to a regular polygon
    /// around their centroid. Returns the moves to apply; empty when zoom is
    /// below the threshold, a fan is already open, or fewer than two markers
    /// coincide.
    pub fn fan_out(
        &mut self,
        config: &FanOutConfig,
        zoom: f64,
        hovered: MarkerId,
        candidates: &[FanCandidate],
    ) -> Vec<MarkerMove> {
        if zoom < config.fan_zoom || self.active.is_some() {
            return Vec::new();
        }
        let Some(hovered_pos) = candidates
            .iter()
            .find(|c| c.id == hovered)
            .map(|c| c.position)
        else {
            return Vec::new();
        };

        let tolerance = coincidence_tolerance(zoom);
        let coincident: Vec<FanCandidate> = candidates
            .iter()
            .filter(|c| distance(c.position, hovered_pos) <= tolerance)
            .copied()
            .collect();
        if coincident.len() < 2 {
            return Vec::new();
        }

        let sides = coincident.len();
        let radius = config.fan_radius * tolerance / (PI / sides as f64).sin();
        let centroid = mean_position(&coincident);

        let moves: Vec<MarkerMove> = coincident
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let angle = 2.0 * PI * k as f64 / sides as f64;
                MarkerMove {
                    id: c.id,
                    to: [
                        centroid[0] + radius * angle.cos(),
                        centroid[1] + radius * angle.sin(),
                    ],
                }
            })
            .collect();

        self.active = Some(ActiveFan {
            centroid,
            radius,
            originals: coincident.iter().map(|c| (c.id, c.position)).collect(),
        });
        moves
    }

    /// Pointer-move hook. Once the pointer exceeds `1.5 × radius` from the
    /// fan centroid, all fanned markers snap back to their original
    /// positions and the fan closes.
    pub fn on_pointer_move(&mut self, pointer: [f64; 2]) -> Vec<MarkerMove> {
        let Some(fan) = &self.active else {
            return Vec::new();
        };
        if distance(pointer, fan.centroid) <= RELEASE_FACTOR * fan.radius {
            return Vec::new();
        }
        self.release()
    }

    /// Unconditional restore, used on layer teardown.
    pub fn release(&mut self) -> Vec<MarkerMove> {
        match self.active.take() {
            Some(fan) => fan
                .originals
                .into_iter()
                .map(|(id, to)| MarkerMove { id, to })
                .collect(),
            None => Vec::new(),
        }
    }
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

fn mean_position(candidates: &[FanCandidate]) -> [f64; 2] {
    let n = candidates.len() as f64;
    let sum = candidates.iter().fold([0.0, 0.0], |acc, c| {
        [acc[0] + c.position[0], acc[1] + c.position[1]]
    });
    [sum[0] / n, sum[1] / n]
}
