//! Baseline Document
//!
//! The complete `repodata.json` previously downloaded by the fetch layer.
//! Immutable for the duration of an overlay session.

use crate::error::StorageError;
use crate::hasher::blake2_256;
use crate::types::{is_record_section, to_hex, Digest, Record};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read-only access to baseline records
pub trait Baseline {
    /// Record `key` in record section `section`
    fn record(&self, section: &str, key: &str) -> Option<&Record>;

    /// All records of a section, in no particular order
    fn records<'a>(&'a self, section: &str) -> Box<dyn Iterator<Item = (&'a str, &'a Record)> + 'a>;

    /// Whether the document carries `section` at all, even if empty
    fn has_section(&self, section: &str) -> bool;

    /// Top-level value other than a record section
    fn top(&self, name: &str) -> Option<&Record>;

    /// Names of top-level values other than record sections
    fn top_names<'a>(&'a self) -> Box<dyn Iterator<Item = &'a str> + 'a>;
}

impl Baseline for Value {
    fn record(&self, section: &str, key: &str) -> Option<&Record> {
        self.get(section)?.as_object()?.get(key)
    }

    fn records<'a>(&'a self, section: &str) -> Box<dyn Iterator<Item = (&'a str, &'a Record)> + 'a> {
        match self.get(section).and_then(Value::as_object) {
            Some(map) => Box::new(map.iter().map(|(k, v)| (k.as_str(), v))),
            None => Box::new(std::iter::empty()),
        }
    }

    fn has_section(&self, section: &str) -> bool {
        self.get(section).map(Value::is_object).unwrap_or(false)
    }

    fn top(&self, name: &str) -> Option<&Record> {
        if is_record_section(name) {
            return None;
        }
        self.get(name)
    }

    fn top_names<'a>(&'a self) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match self.as_object() {
            Some(map) => Box::new(
                map.keys()
                    .map(String::as_str)
                    .filter(|name| !is_record_section(name)),
            ),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// Parsed baseline document with its provenance
#[derive(Debug, Clone)]
pub struct BaselineDocument {
    document: Value,
    nominal_hash: Digest,
    size: u64,
    mtime_ns: Option<u64>,
}

impl BaselineDocument {
    /// Read the whole file, hash its bytes and parse it.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let mut file = std::fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BaselineMissing(path.display().to_string())
            } else {
                StorageError::io(path, e)
            }
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| StorageError::io(path, e))?;
        let metadata = file.metadata().map_err(|e| StorageError::io(path, e))?;
        drop(file);

        let mut baseline = Self::from_bytes(&bytes).map_err(|e| match e {
            StorageError::Serialization(err) => StorageError::Corrupt {
                path: path.display().to_string(),
                reason: err.to_string(),
            },
            other => other,
        })?;
        baseline.mtime_ns = mtime_ns(&metadata);
        tracing::debug!(
            path = %path.display(),
            size = baseline.size,
            nominal_hash = %baseline.nominal_hash_hex(),
            "Loaded baseline document"
        );
        Ok(baseline)
    }

    /// Stand-in used before the first full download
    pub fn empty() -> Self {
        let bytes = b"{}";
        Self {
            document: Value::Object(serde_json::Map::new()),
            nominal_hash: blake2_256(bytes),
            size: bytes.len() as u64,
            mtime_ns: None,
        }
    }

    /// Parse in-memory bytes; no file metadata is recorded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let document: Value = serde_json::from_slice(bytes)?;
        if !document.is_object() {
            return Err(StorageError::Corrupt {
                path: String::new(),
                reason: "repodata document is not a JSON object".to_string(),
            });
        }
        Ok(Self {
            document,
            nominal_hash: blake2_256(bytes),
            size: bytes.len() as u64,
            mtime_ns: None,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Hash of the baseline bytes alone
    pub fn nominal_hash(&self) -> &Digest {
        &self.nominal_hash
    }

    pub fn nominal_hash_hex(&self) -> String {
        to_hex(&self.nominal_hash)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime_ns(&self) -> Option<u64> {
        self.mtime_ns
    }
}

impl Baseline for BaselineDocument {
    fn record(&self, section: &str, key: &str) -> Option<&Record> {
        self.document.record(section, key)
    }

    fn records<'a>(&'a self, section: &str) -> Box<dyn Iterator<Item = (&'a str, &'a Record)> + 'a> {
        self.document.records(section)
    }

    fn has_section(&self, section: &str) -> bool {
        self.document.has_section(section)
    }

    fn top(&self, name: &str) -> Option<&Record> {
        self.document.top(name)
    }

    fn top_names<'a>(&'a self) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        self.document.top_names()
    }
}

/// Modification time in nanoseconds since the Unix epoch
pub fn mtime_ns(metadata: &std::fs::Metadata) -> Option<u64> {
    let modified = metadata.modified().ok()?;
    let duration = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    u64::try_from(duration.as_nanos()).ok()
}
