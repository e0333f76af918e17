//! Overlay Store
//!
//! Copy-on-write container mapping (section, package filename) to either a
//! replacement record or a tombstone. Keys absent from the overlay defer to the
//! baseline document, which the store never reads on its own.

pub mod persistence;

use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;

/// Overlay entry: a full replacement record or an explicit deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entry {
    #[serde(rename = "value")]
    Present(Record),
    Deleted,
}

/// Result of an overlay lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot<'a> {
    Present(&'a Record),
    Deleted,
    /// Untouched by the overlay; the baseline is authoritative.
    NotPresent,
}

impl<'a> Slot<'a> {
    fn from_entry(entry: Option<&'a Entry>) -> Self {
        match entry {
            Some(Entry::Present(record)) => Slot::Present(record),
            Some(Entry::Deleted) => Slot::Deleted,
            None => Slot::NotPresent,
        }
    }
}

/// One bucket of overlay entries with its running serialized size.
#[derive(Debug, Clone, Default, PartialEq)]
struct Bucket {
    entries: HashMap<String, Entry>,
}

impl Bucket {
    /// Insert and return (old cost, new cost).
    fn put(&mut self, key: &str, entry: Entry) -> (usize, usize) {
        let new_cost = entry_cost(key, &entry);
        let old_cost = self
            .entries
            .insert(key.to_string(), entry)
            .map(|old| entry_cost(key, &old))
            .unwrap_or(0);
        (old_cost, new_cost)
    }

    fn copy_in<T, E>(
        &mut self,
        key: &str,
        baseline: Option<&Record>,
        mutate: impl FnOnce(&mut Record) -> Result<T, E>,
    ) -> (usize, usize, Result<Option<T>, E>) {
        let old_cost = match self.entries.get(key) {
            Some(Entry::Deleted) => return (0, 0, Ok(None)),
            Some(entry) => entry_cost(key, entry),
            None => match baseline {
                Some(value) => {
                    self.entries
                        .insert(key.to_string(), Entry::Present(value.clone()));
                    0
                }
                None => return (0, 0, Ok(None)),
            },
        };

        let entry = self.entries.get_mut(key);
        let result = match entry {
            Some(Entry::Present(record)) => mutate(record).map(Some),
            _ => Ok(None),
        };
        let new_cost = self
            .entries
            .get(key)
            .map(|entry| entry_cost(key, entry))
            .unwrap_or(0);
        (old_cost, new_cost, result)
    }
}

/// Copy-on-write overlay over a repodata document
#[derive(Debug, Clone, Default)]
pub struct OverlayStore {
    sections: HashMap<String, Bucket>,
    top: Bucket,
    byte_size: usize,
}

impl PartialEq for OverlayStore {
    fn eq(&self, other: &Self) -> bool {
        let live = |store: &Self| {
            store
                .sections
                .iter()
                .filter(|(_, bucket)| !bucket.entries.is_empty())
                .count()
        };
        self.top == other.top
            && live(self) == live(other)
            && self
                .sections
                .iter()
                .filter(|(_, bucket)| !bucket.entries.is_empty())
                .all(|(name, bucket)| other.sections.get(name) == Some(bucket))
    }
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay state for a record; never consults the baseline.
    pub fn get(&self, section: &str, key: &str) -> Slot<'_> {
        Slot::from_entry(self.sections.get(section).and_then(|b| b.entries.get(key)))
    }

    /// Insert or overwrite a record. `Entry::Deleted` keeps a tombstone.
    pub fn put(&mut self, section: &str, key: &str, entry: Entry) {
        let (old, new) = self
            .sections
            .entry(section.to_string())
            .or_default()
            .put(key, entry);
        self.account(old, new);
    }

    /// Seed `(section, key)` from the baseline the first time it is touched,
    /// then run `mutate` on the overlaid copy.
    ///
    /// A key already in the overlay is edited in place without re-copying.
    /// Returns `Ok(None)` when there is nothing to edit: the key is
    /// tombstoned, or absent from both overlay and baseline.
    pub fn copy_in<T, E>(
        &mut self,
        section: &str,
        key: &str,
        baseline: Option<&Record>,
        mutate: impl FnOnce(&mut Record) -> Result<T, E>,
    ) -> Result<Option<T>, E> {
        let (old, new, result) = self
            .sections
            .entry(section.to_string())
            .or_default()
            .copy_in(key, baseline, mutate);
        self.account(old, new);
        result
    }

    /// Overlay state for a top-level value such as `info` or `removed`.
    pub fn get_top(&self, name: &str) -> Slot<'_> {
        Slot::from_entry(self.top.entries.get(name))
    }

    pub fn put_top(&mut self, name: &str, entry: Entry) {
        let (old, new) = self.top.put(name, entry);
        self.account(old, new);
    }

    /// Same as [`OverlayStore::copy_in`] for top-level values.
    pub fn copy_in_top<T, E>(
        &mut self,
        name: &str,
        baseline: Option<&Record>,
        mutate: impl FnOnce(&mut Record) -> Result<T, E>,
    ) -> Result<Option<T>, E> {
        let (old, new, result) = self.top.copy_in(name, baseline, mutate);
        self.account(old, new);
        result
    }

    /// Entries for one record section, in no particular order
    pub fn entries(&self, section: &str) -> impl Iterator<Item = (&str, &Entry)> {
        self.sections
            .get(section)
            .into_iter()
            .flat_map(|bucket| bucket.entries.iter())
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Names of record sections the overlay has touched
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn top_entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.top.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of overlay entries, tombstones included
    pub fn len(&self) -> usize {
        self.top.entries.len()
            + self
                .sections
                .values()
                .map(|bucket| bucket.entries.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated serialized size of the overlay in bytes
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    fn account(&mut self, old: usize, new: usize) {
        self.byte_size = self.byte_size - old.min(self.byte_size) + new;
    }
}

/// Serialized size of one entry as written to the side file: quoted key,
/// separator and the tagged entry.
fn entry_cost(key: &str, entry: &Entry) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, entry) {
        Ok(()) => key.len() + 4 + counter.0,
        Err(_) => key.len() + 4,
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
