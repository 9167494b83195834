use foundation::coords::{KeyCodec, WorldPosition};
use serde::Serialize;
use sheets::{Endpoint, SheetError, SheetGroup, SheetItem, parse_items};
use std::collections::BTreeMap;
use tracing::info;

use crate::bucket::TileBuckets;
use crate::icons::{fallback_sprite, hashed_icon_url};
use crate::record::{MarkerRecord, TransitMode};
use crate::watery::WateryTiles;

const ICON_KEY: &str = "Icon";
const TELEPORT_KIND: &str = "teleport";
const INSTANCE_NEEDLES: [&str; 2] = ["template", "instance"];
const SHORTCUT_NEEDLE: &str = "agility";

pub type FilterFn = Box<dyn Fn(&MarkerRecord) -> bool>;
pub type MapFn = Box<dyn Fn(MarkerRecord) -> MarkerRecord>;

pub struct PipelineConfig {
    pub native_zoom: i32,
    /// Mirrors the layer's "show3d" option: when set, tile keys fold every
    /// plane to 0 so one bucket holds a whole column.
    pub fold_plane: bool,
    pub icon_base_url: String,
    pub filter: Option<FilterFn>,
    pub map: Option<MapFn>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            native_zoom: 2,
            fold_plane: true,
            icon_base_url: "icons".to_string(),
            filter: None,
            map: None,
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("native_zoom", &self.native_zoom)
            .field("fold_plane", &self.fold_plane)
            .field("icon_base_url", &self.icon_base_url)
            .field("filter", &self.filter.is_some())
            .field("map", &self.map.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    Sheet(SheetError),
    Serialize(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Sheet(e) => write!(f, "sheet parse failed: {e}"),
            PipelineError::Serialize(msg) => write!(f, "record serialization failed: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<SheetError> for PipelineError {
    fn from(e: SheetError) -> Self {
        PipelineError::Sheet(e)
    }
}

/// Pre-finalization record view. Serialized (lowercased) as the haystack for
/// the instance/shortcut content heuristics, so it deliberately excludes the
/// fields those heuristics decide.
#[derive(Debug, Clone, Serialize)]
struct Seed {
    name: Option<String>,
    group: String,
    row_number: usize,
    #[serde(rename = "type")]
    kind: Option<String>,
    mode: Option<TransitMode>,
    plane: i32,
    x: i32,
    y: i32,
    start: Option<Endpoint>,
    destination: Option<Endpoint>,
    watery: bool,
    cells: BTreeMap<String, String>,
}

/// Runs the full marker pipeline over parsed sheet groups.
///
/// Order is significant: watery plane correction happens before transit
/// splitting, keys and heuristics after, caller filter/map hooks last.
pub fn build_markers(
    groups: &[SheetGroup],
    watery: &WateryTiles,
    config: &PipelineConfig,
) -> Result<TileBuckets, PipelineError> {
    let mut items: Vec<SheetItem> = Vec::new();
    for group in groups {
        items.extend(parse_items(group)?);
    }

    for item in &mut items {
        if let Some(start) = &mut item.start {
            correct_watery(start, watery);
        }
        correct_watery(&mut item.destination, watery);
    }

    // Transit pairs fan out into an endpoint record per end; destination-only
    // items without an explicit type are pure teleports.
    let mut starts = Vec::new();
    let mut destinations = Vec::new();
    let mut teleports = Vec::new();
    for item in items {
        if item.start.is_some() {
            starts.push(seed(&item, Some(TransitMode::Start)));
            destinations.push(seed(&item, Some(TransitMode::Destination)));
        } else {
            let mut s = seed(&item, None);
            if s.kind.is_none() {
                s.kind = Some(TELEPORT_KIND.to_string());
            }
            teleports.push(s);
        }
    }

    let mut seeds = starts;
    seeds.append(&mut destinations);
    seeds.append(&mut teleports);

    for s in &mut seeds {
        s.watery = watery.is_watery(&WorldPosition::new(s.plane, s.x, s.y));
    }

    let codec = KeyCodec::new(config.fold_plane);
    let mut records = Vec::with_capacity(seeds.len());
    for s in seeds {
        let key =
            codec.key_for_position(WorldPosition::new(s.plane, s.x, s.y), config.native_zoom);

        let haystack = serde_json::to_string(&s)
            .map_err(|e| PipelineError::Serialize(e.to_string()))?
            .to_lowercase();
        let actually_instance = INSTANCE_NEEDLES.iter().any(|n| haystack.contains(n));
        let agility = haystack.contains(SHORTCUT_NEEDLE);

        let icon_url = match icon_name(&s.cells) {
            Some(name) => hashed_icon_url(&config.icon_base_url, name),
            None => fallback_sprite(actually_instance, agility).to_string(),
        };

        records.push(MarkerRecord {
            name: s.name,
            group: s.group,
            row_number: s.row_number,
            kind: s.kind,
            mode: s.mode,
            plane: s.plane,
            x: s.x,
            y: s.y,
            start: s.start,
            destination: s.destination,
            watery: s.watery,
            actually_instance,
            icon_url,
            key,
            cells: s.cells,
        });
    }

    if let Some(filter) = &config.filter {
        records.retain(|r| filter(r));
    }
    if let Some(map) = &config.map {
        records = records.into_iter().map(|r| map(r)).collect();
    }

    let mut buckets = TileBuckets::new();
    for record in records {
        buckets.push(record);
    }
    info!(
        records = buckets.total_records(),
        buckets = buckets.len(),
        "bucketed marker records"
    );
    Ok(buckets)
}

fn correct_watery(endpoint: &mut Endpoint, watery: &WateryTiles) {
    let pos = endpoint.position();
    if watery.is_watery(&pos) {
        endpoint.plane -= 1;
    }
}

fn seed(item: &SheetItem, mode: Option<TransitMode>) -> Seed {
    let endpoint = match mode {
        Some(TransitMode::Start) => item.start.as_ref().unwrap_or(&item.destination),
        _ => &item.destination,
    };
    Seed {
        name: item.name.clone(),
        group: item.group.clone(),
        row_number: item.row_number,
        kind: item.kind.clone(),
        mode,
        plane: endpoint.plane,
        x: endpoint.x,
        y: endpoint.y,
        start: item.start.clone(),
        destination: Some(item.destination.clone()),
        watery: false,
        cells: item.cells.clone(),
    }
}

fn icon_name(cells: &BTreeMap<String, String>) -> Option<&str> {
    cells
        .get(ICON_KEY)
        .or_else(|| cells.get("icon"))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "-")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sheets::parse_table;

    use crate::icons::{INSTANCE_SPRITE, SHORTCUT_SPRITE, TRAVEL_SPRITE};
    use crate::record::TransitMode;
    use crate::watery::WateryTiles;

    use super::{PipelineConfig, build_markers};

    fn groups(raw: &[&[&str]]) -> Vec<sheets::SheetGroup> {
        let rows: Vec<Vec<String>> = raw
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        parse_table(&rows)
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            fold_plane: false,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn untyped_destination_becomes_teleport() {
        let g = groups(&[&["Lodestones", "Pos", "Look"], &["Varrock", "1", "(50, 50, 0, 0)"]]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        assert_eq!(buckets.total_records(), 1);
        let (_, records) = buckets.iter().next().unwrap();
        assert_eq!(records[0].kind.as_deref(), Some("teleport"));
        assert_eq!(records[0].mode, None);
        assert_eq!(records[0].plane, 1);
    }

    #[test]
    fn typed_destination_keeps_its_type() {
        let g = groups(&[
            &["Rides", "Pos", "Look", "Type"],
            &["Cart", "0", "(50, 50, 0, 0)", "transport"],
        ]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        let (_, records) = buckets.iter().next().unwrap();
        assert_eq!(records[0].kind.as_deref(), Some("transport"));
    }

    #[test]
    fn transit_pairs_split_into_two_endpoint_records() {
        let g = groups(&[
            &["Ferries", "Pos (Start)", "Look (Start)", "Pos (End)", "Look (End)"],
            &["Ferry", "0", "(10, 10, 0, 0)", "0", "(20, 20, 0, 0)"],
        ]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        assert_eq!(buckets.total_records(), 2);

        let mut modes = Vec::new();
        for (_, records) in buckets.iter() {
            for r in records {
                assert!(r.start.is_some() && r.destination.is_some());
                modes.push(r.mode);
            }
        }
        modes.sort_by_key(|m| format!("{m:?}"));
        assert_eq!(
            modes,
            vec![Some(TransitMode::Destination), Some(TransitMode::Start)]
        );
    }

    #[test]
    fn watery_tile_lowers_the_plane_by_one() {
        // (50 << 6) | 0 = 3200
        let mut watery = WateryTiles::new();
        watery.insert(3200, 3200);

        let g = groups(&[&["Lodestones", "Pos", "Look"], &["Sunken", "1", "(50, 50, 0, 0)"]]);
        let buckets = build_markers(&g, &watery, &config()).unwrap();
        let (_, records) = buckets.iter().next().unwrap();
        assert_eq!(records[0].plane, 0);
        assert!(records[0].watery);
    }

    #[test]
    fn instance_heuristic_matches_serialized_content() {
        let g = groups(&[
            &["Dungeons", "Pos", "Look", "Notes"],
            &["Hideout", "0", "(50, 50, 0, 0)", "Uses a Template square"],
        ]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        let (_, records) = buckets.iter().next().unwrap();
        assert!(records[0].actually_instance);
        assert_eq!(records[0].icon_url, INSTANCE_SPRITE);
    }

    #[test]
    fn agility_heuristic_selects_shortcut_sprite() {
        let g = groups(&[
            &["Shortcuts", "Pos", "Look", "Type"],
            &["Pipe", "0", "(50, 50, 0, 0)", "Agility shortcut"],
        ]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        let (_, records) = buckets.iter().next().unwrap();
        assert!(!records[0].actually_instance);
        assert_eq!(records[0].icon_url, SHORTCUT_SPRITE);
    }

    #[test]
    fn plain_records_fall_back_to_travel_sprite() {
        let g = groups(&[&["Lodestones", "Pos", "Look"], &["Plain", "0", "(50, 50, 0, 0)"]]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        let (_, records) = buckets.iter().next().unwrap();
        assert_eq!(records[0].icon_url, TRAVEL_SPRITE);
    }

    #[test]
    fn explicit_icon_names_are_content_hashed() {
        let g = groups(&[
            &["Lodestones", "Pos", "Look", "Icon"],
            &["Varrock", "0", "(50, 50, 0, 0)", "Varrock lodestone"],
        ]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        let (_, records) = buckets.iter().next().unwrap();
        assert!(records[0].icon_url.ends_with("/Varrock lodestone.png"));
        assert!(records[0].icon_url.starts_with("icons/"));
    }

    #[test]
    fn filter_runs_before_map() {
        let g = groups(&[
            &["Lodestones", "Pos", "Look"],
            &["Keep", "0", "(50, 50, 0, 0)"],
            &["Drop", "0", "(51, 51, 0, 0)"],
        ]);
        let cfg = PipelineConfig {
            fold_plane: false,
            filter: Some(Box::new(|r| r.name.as_deref() == Some("Keep"))),
            map: Some(Box::new(|mut r| {
                r.group = "Mapped".to_string();
                r
            })),
            ..PipelineConfig::default()
        };
        let buckets = build_markers(&g, &WateryTiles::new(), &cfg).unwrap();
        assert_eq!(buckets.total_records(), 1);
        let (_, records) = buckets.iter().next().unwrap();
        assert_eq!(records[0].group, "Mapped");
    }

    #[test]
    fn records_bucket_by_tile_key() {
        let g = groups(&[
            &["Lodestones", "Pos", "Look"],
            &["A", "0", "(50, 50, 1, 1)"],
            &["B", "0", "(50, 50, 2, 2)"],
            &["Far", "0", "(51, 51, 0, 0)"],
        ]);
        let buckets = build_markers(&g, &WateryTiles::new(), &config()).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.total_records(), 3);
    }
}
