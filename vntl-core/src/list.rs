use crate::domain::EntryRow;
use crate::read::opened::Opened;
use std::io::{Read, Seek};

/// Rows for every entry of an opened archive, in name order.
pub fn rows<R: Read + Seek>(arc: &Opened<R>) -> Vec<EntryRow> {
    arc.index
        .iter()
        .map(|(name, entry)| EntryRow {
            name: name.clone(),
            size: entry.size(),
            offset: entry.segments.first().map(|s| s.offset).unwrap_or(0),
            segments: entry.segments.len(),
        })
        .collect()
}
