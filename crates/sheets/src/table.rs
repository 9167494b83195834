use std::collections::BTreeMap;

use serde::Deserialize;

/// Column key the first header cell is renamed to. The header's own first
/// cell holds the group name, so items read their display name from here.
pub const NAME_KEY: &str = "name";

/// Wire shape of a remote sheet payload (the `values` range response).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SheetValues {
    #[serde(default)]
    pub values: Vec<Vec<String>>,
}

/// One data row, keyed by the column names of its group's header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub group: String,
    /// 1-based row number in the source table.
    pub row_number: usize,
    pub cells: BTreeMap<String, String>,
}

impl RawItem {
    pub fn cell(&self, key: &str) -> Option<&str> {
        self.cells.get(key).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetGroup {
    pub name: String,
    /// 1-based row number of the header row.
    pub row_number: usize,
    pub items: Vec<RawItem>,
}

/// Scans a rectangular table into named groups.
///
/// A row starts a new group iff the previous row was empty (or absent, for
/// the first row) and the row has more than one cell. Rows following a
/// header are items; each cell takes the column key of the most recent
/// header at the same index. Non-empty rows before any header have no group
/// context and are dropped.
pub fn parse_table(rows: &[Vec<String>]) -> Vec<SheetGroup> {
    let mut groups: Vec<SheetGroup> = Vec::new();
    let mut columns: Option<Vec<String>> = None;
    let mut prev_empty = true;

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            prev_empty = true;
            continue;
        }

        if prev_empty && row.len() > 1 {
            let mut keys = row.clone();
            let name = std::mem::replace(&mut keys[0], NAME_KEY.to_string());
            columns = Some(keys);
            groups.push(SheetGroup {
                name,
                row_number,
                items: Vec::new(),
            });
        } else if let (Some(keys), Some(group)) = (&columns, groups.last_mut()) {
            let cells = row
                .iter()
                .enumerate()
                .filter_map(|(i, cell)| keys.get(i).map(|k| (k.clone(), cell.clone())))
                .collect();
            group.items.push(RawItem {
                group: group.name.clone(),
                row_number,
                cells,
            });
        }

        prev_empty = false;
    }

    groups
}
