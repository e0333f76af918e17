//! JLAP stream construction, following the same checksum rules as the reader.

use super::Footer;
use crate::error::PatchError;
use crate::hasher::keyed_blake2_256;
use crate::patch::PatchSet;
use crate::types::{to_hex, Digest};

/// Builds a terminated JLAP stream line by line
#[derive(Debug, Clone)]
pub struct JlapWriter {
    lines: Vec<String>,
    checksum: Digest,
}

impl JlapWriter {
    pub fn new(iv: Digest) -> Self {
        Self {
            lines: vec![to_hex(&iv)],
            checksum: iv,
        }
    }

    /// Append one line, advancing the running checksum
    pub fn push(&mut self, line: &str) -> Result<&mut Self, PatchError> {
        if line.contains('\n') {
            return Err(PatchError::MalformedStream("newline inside JLAP line".to_string()));
        }
        self.checksum = keyed_blake2_256(line.as_bytes(), &self.checksum)?;
        self.lines.push(line.to_string());
        Ok(self)
    }

    pub fn push_patch(&mut self, patch: &PatchSet) -> Result<&mut Self, PatchError> {
        let line = serde_json::to_string(patch)
            .map_err(|e| PatchError::MalformedStream(format!("unserializable patch: {e}")))?;
        self.push(&line)
    }

    /// Running checksum after the last pushed line
    pub fn checksum(&self) -> &Digest {
        &self.checksum
    }

    /// Append the footer and trailing checksum and return the stream bytes.
    pub fn finish(mut self, footer: &Footer) -> Result<Vec<u8>, PatchError> {
        let line = serde_json::to_string(footer)
            .map_err(|e| PatchError::MalformedStream(format!("unserializable footer: {e}")))?;
        self.push(&line)?;
        let trailing = to_hex(&self.checksum);
        self.lines.push(trailing);
        Ok(self.lines.join("\n").into_bytes())
    }
}
