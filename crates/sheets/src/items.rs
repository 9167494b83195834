use std::collections::BTreeMap;

use foundation::coords::WorldPosition;
use serde::Serialize;

use crate::look::{parse_look, parse_plane};
use crate::table::{NAME_KEY, RawItem, SheetGroup};
use crate::SheetError;

const POS_KEY: &str = "Pos";
const LOOK_KEY: &str = "Look";
const POS_START_KEY: &str = "Pos (Start)";
const LOOK_START_KEY: &str = "Look (Start)";
const POS_END_KEY: &str = "Pos (End)";
const LOOK_END_KEY: &str = "Look (End)";
const TYPE_KEY: &str = "Type";
const NONE_CELL: &str = "-";

/// A resolved start or destination coordinate, keeping the raw sheet cells
/// so two endpoints can be compared the way the sheet spelled them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub plane: i32,
    pub x: i32,
    pub y: i32,
    pub pos_raw: String,
    pub look_raw: String,
}

impl Endpoint {
    pub fn position(&self) -> WorldPosition {
        WorldPosition::new(self.plane, self.x, self.y)
    }

    /// Same cell contents, regardless of which columns they came from.
    pub fn same_cells(&self, other: &Endpoint) -> bool {
        self.pos_raw == other.pos_raw && self.look_raw == other.look_raw
    }
}

/// One sheet row with its coordinates resolved.
///
/// Rows without a usable destination never become items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetItem {
    pub name: Option<String>,
    pub group: String,
    pub row_number: usize,
    pub kind: Option<String>,
    pub start: Option<Endpoint>,
    pub destination: Endpoint,
    pub cells: BTreeMap<String, String>,
}

/// Resolves the items of one parsed group.
///
/// `destination` comes from the `Pos (End)`/`Look (End)` cells, falling back
/// to the unsuffixed `Pos`/`Look` pair; rows where it is absent or `"-"` are
/// dropped. `start` resolves the same way from the `(Start)` variants but is
/// kept only when its cells differ from the destination's.
pub fn parse_items(group: &SheetGroup) -> Result<Vec<SheetItem>, SheetError> {
    let mut out = Vec::new();
    for item in &group.items {
        let Some(destination) = endpoint(item, POS_END_KEY, LOOK_END_KEY)? else {
            continue;
        };
        let start = endpoint(item, POS_START_KEY, LOOK_START_KEY)?
            .filter(|s| !s.same_cells(&destination));

        out.push(SheetItem {
            name: item.cell(NAME_KEY).map(|s| s.to_string()),
            group: item.group.clone(),
            row_number: item.row_number,
            kind: kind_cell(item),
            start,
            destination,
            cells: item.cells.clone(),
        });
    }
    Ok(out)
}

fn kind_cell(item: &RawItem) -> Option<String> {
    item.cell(TYPE_KEY)
        .or_else(|| item.cell("type"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn endpoint(
    item: &RawItem,
    pos_key: &str,
    look_key: &str,
) -> Result<Option<Endpoint>, SheetError> {
    let pos = present(item.cell(pos_key)).or_else(|| present(item.cell(POS_KEY)));
    let look = present(item.cell(look_key)).or_else(|| present(item.cell(LOOK_KEY)));
    let (Some(pos), Some(look)) = (pos, look) else {
        return Ok(None);
    };

    let plane = parse_plane(pos)?;
    let position = parse_look(look, plane)?;
    Ok(Some(Endpoint {
        plane,
        x: position.x,
        y: position.y,
        pos_raw: pos.to_string(),
        look_raw: look.to_string(),
    }))
}

fn present(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim)
        .filter(|c| !c.is_empty() && *c != NONE_CELL)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::table::parse_table;

    use super::parse_items;

    fn groups(raw: &[&[&str]]) -> Vec<crate::table::SheetGroup> {
        let rows: Vec<Vec<String>> = raw
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        parse_table(&rows)
    }

    #[test]
    fn destination_falls_back_to_unsuffixed_columns() {
        let groups = groups(&[
            &["Teleports", "Pos", "Look"],
            &["Lodestone", "0", "(10, 20, 5, 6)"],
        ]);
        let items = parse_items(&groups[0]).unwrap();
        assert_eq!(items.len(), 1);
        let dest = &items[0].destination;
        assert_eq!((dest.plane, dest.x, dest.y), (0, (10 << 6) | 5, (20 << 6) | 6));
        assert!(items[0].start.is_none());
        assert_eq!(items[0].name.as_deref(), Some("Lodestone"));
    }

    #[test]
    fn dash_destination_drops_the_row() {
        let groups = groups(&[
            &["Teleports", "Pos", "Look"],
            &["Nowhere", "-", "-"],
            &["Somewhere", "0", "(1, 1, 0, 0)"],
        ]);
        let items = parse_items(&groups[0]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name.as_deref(), Some("Somewhere"));
    }

    #[test]
    fn start_kept_only_when_it_differs() {
        let groups = groups(&[
            &[
                "Transit",
                "Pos (Start)",
                "Look (Start)",
                "Pos (End)",
                "Look (End)",
            ],
            &["Ferry", "0", "(1, 1, 0, 0)", "0", "(2, 2, 0, 0)"],
            &["Stuck", "0", "(3, 3, 0, 0)", "0", "(3, 3, 0, 0)"],
        ]);
        let items = parse_items(&groups[0]).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].start.is_some());
        assert!(items[1].start.is_none());
    }

    #[test]
    fn malformed_look_aborts_the_group() {
        let groups = groups(&[&["Teleports", "Pos", "Look"], &["Broken", "0", "(1)"]]);
        assert!(parse_items(&groups[0]).is_err());
    }
}
