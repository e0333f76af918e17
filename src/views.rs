//! Lookup Façade
//!
//! Presents baseline and overlay as one document without building the merged
//! document. The overlay always takes precedence; a tombstone hides the
//! baseline record underneath it.

use crate::baseline::Baseline;
use crate::store::{Entry, OverlayStore, Slot};
use crate::types::{Record, RECORD_SECTIONS};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Two-layer read view: overlay over baseline
pub struct OverlayView<'a, B: Baseline + ?Sized> {
    baseline: &'a B,
    overlay: &'a OverlayStore,
}

impl<'a, B: Baseline + ?Sized> Clone for OverlayView<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: Baseline + ?Sized> Copy for OverlayView<'a, B> {}

impl<'a, B: Baseline + ?Sized> OverlayView<'a, B> {
    pub fn new(baseline: &'a B, overlay: &'a OverlayStore) -> Self {
        Self { baseline, overlay }
    }

    /// Merged record, or `None` when deleted or unknown
    pub fn lookup(&self, section: &str, key: &str) -> Option<&'a Record> {
        match self.overlay.get(section, key) {
            Slot::Present(record) => Some(record),
            Slot::Deleted => None,
            Slot::NotPresent => self.baseline.record(section, key),
        }
    }

    /// Every live record of `section`, in no particular order.
    ///
    /// Yields overlay records first, then baseline records the overlay does
    /// not shadow. Each call starts a fresh pass.
    pub fn enumerate(&self, section: &str) -> impl Iterator<Item = (&'a str, &'a Record)> + 'a {
        let overlay = self.overlay;
        let owned = section.to_string();

        let from_overlay = overlay.entries(section).filter_map(|(key, entry)| match entry {
            Entry::Present(record) => Some((key, record)),
            Entry::Deleted => None,
        });
        let from_baseline = self
            .baseline
            .records(section)
            .filter(move |(key, _)| matches!(overlay.get(&owned, key), Slot::NotPresent));

        from_overlay.chain(from_baseline)
    }

    /// Merged top-level value such as `info`
    pub fn top(&self, name: &str) -> Option<&'a Record> {
        match self.overlay.get_top(name) {
            Slot::Present(record) => Some(record),
            Slot::Deleted => None,
            Slot::NotPresent => self.baseline.top(name),
        }
    }

    /// Names of live top-level values, sorted
    pub fn top_names(&self) -> Vec<&'a str> {
        let mut names: BTreeSet<&'a str> = self.baseline.top_names().collect();
        for (name, entry) in self.overlay.top_entries() {
            match entry {
                Entry::Present(_) => {
                    names.insert(name);
                }
                Entry::Deleted => {
                    names.remove(name);
                }
            }
        }
        names.into_iter().collect()
    }

    /// Build the full merged document.
    ///
    /// Readers never need this; it exists for export and inspection.
    pub fn materialize(&self) -> Value {
        let mut document = Map::new();
        for name in self.top_names() {
            if let Some(value) = self.top(name) {
                document.insert(name.to_string(), value.clone());
            }
        }

        let touched: BTreeSet<&str> = self.overlay.section_names().collect();
        for section in RECORD_SECTIONS {
            if !self.baseline.has_section(section) && !touched.contains(section) {
                continue;
            }
            let records: Map<String, Value> = self
                .enumerate(section)
                .map(|(key, record)| (key.to_string(), record.clone()))
                .collect();
            document.insert(section.to_string(), Value::Object(records));
        }
        Value::Object(document)
    }
}
