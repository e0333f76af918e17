//! Core types for the repodata overlay.

use serde_json::Value;

/// Digest: blake2b-256 hash of a repodata document or JLAP line
pub type Digest = [u8; 32];

/// Record: a single package record or top-level value
pub type Record = Value;

/// Sections whose values map package filenames to records.
pub const RECORD_SECTIONS: [&str; 3] = ["packages", "packages.conda", "signatures"];

/// Whether `name` is a record section rather than a plain top-level value.
pub fn is_record_section(name: &str) -> bool {
    RECORD_SECTIONS.contains(&name)
}

/// Lowercase hex encoding of a digest
pub fn to_hex(digest: &Digest) -> String {
    hex::encode(digest)
}

/// Decode a 64-character hex string into a digest
pub fn from_hex(s: &str) -> Option<Digest> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Abbreviate a hex digest for log lines.
pub fn short_hex(s: &str) -> &str {
    match s.char_indices().nth(16) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
