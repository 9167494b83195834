use std::collections::BTreeMap;

use foundation::coords::TileKey;
use serde::{Serialize, Serializer};
use sheets::Endpoint;

/// Which end of a transit pair a record represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitMode {
    Start,
    Destination,
}

/// A fully processed marker, filed under its tile bucket.
///
/// Records are immutable once bucketed; the only later positional change is
/// the fan-out disambiguator's transient override, which lives outside the
/// record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerRecord {
    pub name: Option<String>,
    pub group: String,
    pub row_number: usize,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub mode: Option<TransitMode>,
    pub plane: i32,
    pub x: i32,
    pub y: i32,
    /// Transit records keep both endpoints for navigation, whichever end
    /// this record stands on.
    pub start: Option<Endpoint>,
    pub destination: Option<Endpoint>,
    pub watery: bool,
    pub actually_instance: bool,
    pub icon_url: String,
    #[serde(serialize_with = "serialize_key")]
    pub key: TileKey,
    /// Remaining sheet cells, carried for popups and heuristics.
    pub cells: BTreeMap<String, String>,
}

impl MarkerRecord {
    pub fn is_teleport(&self) -> bool {
        self.kind.as_deref() == Some("teleport")
    }
}

fn serialize_key<S: Serializer>(key: &TileKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(key.as_str())
}
