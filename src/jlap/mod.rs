//! JLAP patch streams
//!
//! A JLAP stream is a sequence of `\n`-separated lines:
//!
//! ```text
//! <hex initialization vector>
//! {"from": ..., "to": ..., "patch": [...]}   (zero or more)
//! {"latest": ..., "url": ...}                (footer)
//! <hex checksum of the footer line>
//! ```
//!
//! Each line after the first has a running checksum: BLAKE2b-256 of the line
//! keyed with the previous checksum. Streams can be read from the middle,
//! starting at a recorded byte position with the checksum recorded there.

mod writer;

pub use writer::JlapWriter;

use crate::error::PatchError;
use crate::hasher::keyed_blake2_256;
use crate::patch::PatchSet;
use crate::types::{from_hex, to_hex, Digest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// All-zero initialization vector
pub const DEFAULT_IV: Digest = [0u8; 32];

/// One line with its byte offset and running checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JlapLine {
    pub offset: u64,
    pub text: String,
    pub checksum: Digest,
}

/// Footer line: hash of the newest document reachable through the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footer {
    pub latest: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Footer {
    pub fn new(latest: impl Into<String>) -> Self {
        Self {
            latest: latest.into(),
            extra: Map::new(),
        }
    }
}

/// Where to resume reading the stream next time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JlapCursor {
    /// Byte offset of the footer line
    pub pos: u64,
    /// Hex checksum of the line preceding the footer
    pub iv: String,
}

impl JlapCursor {
    pub fn iv_digest(&self) -> Result<Digest, PatchError> {
        from_hex(&self.iv)
            .ok_or_else(|| PatchError::MalformedStream(format!("invalid cursor iv {:?}", self.iv)))
    }
}

/// Parsed and verified JLAP stream
#[derive(Debug, Clone)]
pub struct JlapBuffer {
    /// `lines[0]` carries the starting checksum; body, footer and trailing checksum follow
    lines: Vec<JlapLine>,
}

impl JlapBuffer {
    /// Parse `bytes` read from byte offset `pos` and verify the trailing checksum.
    ///
    /// At `pos == 0` the first line is the initialization vector and `iv` is
    /// ignored; otherwise `iv` is the checksum recorded for that position.
    pub fn parse(bytes: &[u8], iv: &Digest, pos: u64) -> Result<Self, PatchError> {
        let buffer = Self::parse_unverified(bytes, iv, pos)?;
        buffer.verify()?;
        Ok(buffer)
    }

    pub fn parse_unverified(bytes: &[u8], iv: &Digest, pos: u64) -> Result<Self, PatchError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PatchError::MalformedStream(format!("stream is not UTF-8: {e}")))?;
        let text = text.strip_suffix('\n').unwrap_or(text);

        let mut lines = vec![JlapLine {
            offset: pos,
            text: to_hex(iv),
            checksum: *iv,
        }];
        let mut offset = pos;
        let mut checksum = *iv;

        if !text.is_empty() {
            for line in text.split('\n') {
                if offset == 0 {
                    checksum = from_hex(line).ok_or_else(|| {
                        PatchError::MalformedStream("first line is not a hex initialization vector".to_string())
                    })?;
                    lines[0] = JlapLine {
                        offset: 0,
                        text: line.to_string(),
                        checksum,
                    };
                } else {
                    checksum = keyed_blake2_256(line.as_bytes(), &checksum)?;
                    lines.push(JlapLine {
                        offset,
                        text: line.to_string(),
                        checksum,
                    });
                }
                offset += line.len() as u64 + 1;
            }
        }

        debug!(bytes = offset.saturating_sub(pos), lines = lines.len(), "Read JLAP stream");

        if lines.len() < 3 {
            return Err(PatchError::MalformedStream(
                "stream lacks footer and trailing checksum".to_string(),
            ));
        }
        Ok(Self { lines })
    }

    /// The last line must equal the running checksum of the footer line.
    pub fn verify(&self) -> Result<(), PatchError> {
        let expected = to_hex(&self.footer_line().checksum);
        let trailing = &self.last_line().text;
        if *trailing != expected {
            return Err(PatchError::IntegrityMismatch {
                expected: trailing.clone(),
                computed: expected,
            });
        }
        info!("JLAP checksum OK");
        Ok(())
    }

    /// Patch lines between the starting checksum and the footer
    pub fn body(&self) -> &[JlapLine] {
        &self.lines[1..self.lines.len() - 2]
    }

    pub fn footer_line(&self) -> &JlapLine {
        &self.lines[self.lines.len() - 2]
    }

    pub fn last_line(&self) -> &JlapLine {
        &self.lines[self.lines.len() - 1]
    }

    pub fn footer(&self) -> Result<Footer, PatchError> {
        serde_json::from_str(&self.footer_line().text)
            .map_err(|e| PatchError::MalformedStream(format!("invalid footer: {e}")))
    }

    /// Decode every body line as a patch set
    pub fn patches(&self) -> Result<Vec<PatchSet>, PatchError> {
        self.body()
            .iter()
            .map(|line| {
                serde_json::from_str(&line.text).map_err(|e| {
                    PatchError::MalformedStream(format!("invalid patch at offset {}: {e}", line.offset))
                })
            })
            .collect()
    }

    /// Resume point: the footer's offset and the checksum just before it
    pub fn cursor(&self) -> JlapCursor {
        let before_footer = &self.lines[self.lines.len() - 3];
        JlapCursor {
            pos: self.footer_line().offset,
            iv: to_hex(&before_footer.checksum),
        }
    }
}
