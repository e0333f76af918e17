//! Overlay side file
//!
//! The overlay is persisted next to the baseline as `<name>.overlay.json`.
//! The baseline file is never rewritten.

use super::{Entry, OverlayStore};
use crate::error::StorageError;
use crate::state::OverlayProvenance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

/// On-disk form of the overlay, sorted for stable bytes
#[derive(Debug, Serialize, Deserialize)]
struct OverlayFile {
    version: u32,
    #[serde(default)]
    sections: BTreeMap<String, BTreeMap<String, Entry>>,
    #[serde(default)]
    top: BTreeMap<String, Entry>,
}

impl From<&OverlayStore> for OverlayFile {
    fn from(store: &OverlayStore) -> Self {
        let mut sections: BTreeMap<String, BTreeMap<String, Entry>> = BTreeMap::new();
        for section in store.section_names() {
            let entries = store
                .entries(section)
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            sections.insert(section.to_string(), entries);
        }
        let top = store
            .top_entries()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        OverlayFile {
            version: FORMAT_VERSION,
            sections,
            top,
        }
    }
}

/// blake3 digest of side-file bytes, hex encoded
pub fn digest_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Serialize the overlay to its side-file bytes
pub fn to_bytes(store: &OverlayStore) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(&OverlayFile::from(store))?)
}

/// Rebuild an overlay from side-file bytes
pub fn from_bytes(bytes: &[u8]) -> Result<OverlayStore, StorageError> {
    let file: OverlayFile = serde_json::from_slice(bytes)?;
    if file.version != FORMAT_VERSION {
        return Err(StorageError::Corrupt {
            path: String::new(),
            reason: format!("unsupported overlay version {}", file.version),
        });
    }

    let mut store = OverlayStore::new();
    for (section, entries) in file.sections {
        for (key, entry) in entries {
            store.put(&section, &key, entry);
        }
    }
    for (name, entry) in file.top {
        store.put_top(&name, entry);
    }
    Ok(store)
}

/// Atomically write the overlay side file; returns the digest and length of what was written.
pub fn save(store: &OverlayStore, path: &Path) -> Result<OverlayProvenance, StorageError> {
    let bytes = to_bytes(store)?;
    write_atomic(path, &bytes)?;
    Ok(OverlayProvenance {
        digest: digest_bytes(&bytes),
        bytes: bytes.len() as u64,
    })
}

/// Load the overlay side file, verifying its digest when one is recorded.
pub fn load(path: &Path, expected_digest: Option<&str>) -> Result<OverlayStore, StorageError> {
    let bytes = std::fs::read(path).map_err(|e| StorageError::io(path, e))?;
    if let Some(expected) = expected_digest {
        let actual = digest_bytes(&bytes);
        if actual != expected {
            return Err(StorageError::Corrupt {
                path: path.display().to_string(),
                reason: format!("digest {} does not match recorded {}", actual, expected),
            });
        }
    }
    from_bytes(&bytes).map_err(|e| match e {
        StorageError::Corrupt { reason, .. } => StorageError::Corrupt {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// Remove the side file if it exists.
pub fn remove(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename over it.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = std::fs::write(&temp_path, bytes)
        .and_then(|()| std::fs::rename(&temp_path, path))
        .map_err(|e| StorageError::io(path, e));
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
