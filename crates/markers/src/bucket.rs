use std::collections::BTreeMap;

use foundation::coords::TileKey;

use crate::record::MarkerRecord;

/// Markers grouped by tile key. Built once per data load; read-only after.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TileBuckets {
    map: BTreeMap<TileKey, Vec<MarkerRecord>>,
}

impl TileBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MarkerRecord) {
        self.map.entry(record.key.clone()).or_default().push(record);
    }

    pub fn get(&self, key: &TileKey) -> Option<&[MarkerRecord]> {
        self.map.get(key).map(|v| v.as_slice())
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn total_records(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &[MarkerRecord])> {
        self.map.iter().map(|(k, v)| (k, v.as_slice()))
    }
}
