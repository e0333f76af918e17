//! Cache Metadata Tracker
//!
//! Provenance sidecar (`<name>.info.json`) stored next to the cached
//! repodata. `blake2_256_nominal` always describes the baseline file on disk,
//! so readers that know nothing about overlays still see a valid hash.
//! `blake2_256` is the hash of the upstream document equivalent to baseline
//! plus overlay.

use crate::baseline::BaselineDocument;
use crate::error::{PatchError, StorageError};
use crate::jlap::{Footer, JlapCursor, DEFAULT_IV};
use crate::store::persistence::write_atomic;
use crate::types::{short_hex, Digest};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// How long a "no JLAP available" answer is trusted before checking again
pub const CHECK_ALTERNATE_FORMAT_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What the caller should do to bring the cache up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    Fresh,
    NeedsPatch,
    NeedsFullRefetch,
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Staleness::Fresh => "fresh",
            Staleness::NeedsPatch => "needs_patch",
            Staleness::NeedsFullRefetch => "needs_full_refetch",
        };
        write!(f, "{}", s)
    }
}

/// File size and mtime of the baseline as currently on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselineStat {
    pub size: u64,
    pub mtime_ns: Option<u64>,
}

impl BaselineStat {
    pub fn of(path: &Path) -> Result<Self, StorageError> {
        let metadata = std::fs::metadata(path).map_err(|e| StorageError::io(path, e))?;
        Ok(Self {
            size: metadata.len(),
            mtime_ns: crate::baseline::mtime_ns(&metadata),
        })
    }
}

/// Side file written for the current overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayProvenance {
    /// blake3 of the side-file bytes
    pub digest: String,
    pub bytes: u64,
}

/// Patch-stream position plus the footer seen there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JlapState {
    #[serde(flatten)]
    pub cursor: JlapCursor,
    pub footer: Footer,
}

/// Whether an alternate format was available when last checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatCheck {
    /// RFC 3339 UTC timestamp, `Z` suffix
    pub last_checked: String,
    pub value: bool,
}

/// Sidecar contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
    #[serde(default, rename = "mod", skip_serializing_if = "String::is_empty")]
    pub last_modified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_control: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_ns: Option<u64>,
    #[serde(default)]
    pub refresh_ns: u64,
    #[serde(default, rename = "blake2_256_nominal", skip_serializing_if = "Option::is_none")]
    pub nominal_hash: Option<String>,
    #[serde(default, rename = "blake2_256", skip_serializing_if = "Option::is_none")]
    pub combined_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayProvenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jlap: Option<JlapState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_jlap: Option<FormatCheck>,
    /// Reason the cache must be downloaded again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidated: Option<String>,
    /// Fields written by other tools, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheState {
    /// Load the sidecar; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    /// A complete document was downloaded: it is its own nominal and combined hash.
    ///
    /// The jlap cursor is kept; the remote stream still continues from it.
    pub fn record_full_fetch(&mut self, baseline: &BaselineDocument, now_ns: u64) {
        let hash = baseline.nominal_hash_hex();
        info!(nominal_hash = short_hex(&hash), size = baseline.size(), "Recorded full fetch");
        self.nominal_hash = Some(hash.clone());
        self.combined_hash = Some(hash);
        self.size = baseline.size();
        self.mtime_ns = baseline.mtime_ns();
        self.refresh_ns = now_ns;
        self.overlay = None;
        self.invalidated = None;
    }

    /// An overlay reaching `want` was built and persisted.
    ///
    /// The nominal hash is left alone.
    pub fn record_overlay_build(
        &mut self,
        want: &str,
        cursor: JlapCursor,
        footer: Footer,
        overlay: Option<OverlayProvenance>,
        now_ns: u64,
    ) {
        info!(
            combined_hash = short_hex(want),
            pos = cursor.pos,
            "Recorded overlay build"
        );
        self.combined_hash = Some(want.to_string());
        self.jlap = Some(JlapState { cursor, footer });
        self.overlay = overlay;
        self.refresh_ns = now_ns;
        self.invalidated = None;
    }

    /// The stream was read but the cache already holds its newest revision.
    pub fn record_cursor(&mut self, cursor: JlapCursor, footer: Footer, now_ns: u64) {
        self.jlap = Some(JlapState { cursor, footer });
        self.refresh_ns = now_ns;
    }

    /// Nothing changed upstream (HTTP 304 or an empty patch chain).
    pub fn record_refresh(&mut self, now_ns: u64) {
        self.refresh_ns = now_ns;
    }

    pub fn set_has_jlap(&mut self, value: bool, now: DateTime<Utc>) {
        self.has_jlap = Some(FormatCheck {
            last_checked: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            value,
        });
    }

    /// JLAP is tried unless it was found missing within the check interval.
    pub fn should_check_jlap(&self, now: DateTime<Utc>) -> bool {
        let check = match &self.has_jlap {
            None => return true,
            Some(check) => check,
        };
        if check.value {
            return true;
        }
        match DateTime::parse_from_rfc3339(&check.last_checked) {
            Ok(when) => {
                let elapsed = now.signed_duration_since(when.with_timezone(&Utc));
                elapsed.to_std().map(|e| e > CHECK_ALTERNATE_FORMAT_INTERVAL).unwrap_or(false)
            }
            Err(e) => {
                warn!(error = %e, "Unparseable has_jlap timestamp");
                true
            }
        }
    }

    /// Drop overlay provenance and cursor; the next step is a full download.
    pub fn invalidate(&mut self, reason: &str) {
        warn!(reason, "Cache state invalidated");
        self.invalidated = Some(reason.to_string());
        self.combined_hash = None;
        self.overlay = None;
        self.jlap = None;
    }

    /// Hash of the document the reader currently sees
    pub fn effective_hash(&self) -> Option<&str> {
        self.combined_hash
            .as_deref()
            .or(self.nominal_hash.as_deref())
    }

    /// Whether `stat` is the baseline file this state was recorded for
    pub fn matches_baseline(&self, stat: &BaselineStat) -> bool {
        self.size == stat.size && (self.mtime_ns.is_none() || self.mtime_ns == stat.mtime_ns)
    }

    /// Check a patch stream starting at byte `pos` continues from our cursor.
    ///
    /// Returns the checksum to resume verification with.
    pub fn check_continuity(&self, pos: u64) -> Result<Digest, PatchError> {
        if pos == 0 {
            return Ok(DEFAULT_IV);
        }
        match &self.jlap {
            Some(jlap) if jlap.cursor.pos == pos => jlap.cursor.iv_digest(),
            Some(jlap) => Err(PatchError::PatchStreamDiscontinuity {
                expected: jlap.cursor.pos.to_string(),
                found: pos.to_string(),
            }),
            None => Err(PatchError::PatchStreamDiscontinuity {
                expected: "0".to_string(),
                found: pos.to_string(),
            }),
        }
    }

    /// Decide between serving the cache, patching it, or downloading it again.
    ///
    /// `remote_latest` is the `latest` hash of a freshly fetched remote
    /// footer; without it, freshness falls back to the local TTL.
    pub fn staleness(
        &self,
        stat: Option<&BaselineStat>,
        remote_latest: Option<&str>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Staleness {
        if self.invalidated.is_some() || self.nominal_hash.is_none() {
            return Staleness::NeedsFullRefetch;
        }
        match stat {
            Some(stat) if self.matches_baseline(stat) => {}
            _ => return Staleness::NeedsFullRefetch,
        }

        let up_to_date = match remote_latest {
            Some(latest) => self.effective_hash() == Some(latest),
            None => {
                let now_ns = u64::try_from(now.timestamp_nanos_opt().unwrap_or(0)).unwrap_or(0);
                let age = Duration::from_nanos(now_ns.saturating_sub(self.refresh_ns));
                age <= ttl
            }
        };

        if up_to_date {
            Staleness::Fresh
        } else if self.should_check_jlap(now) {
            Staleness::NeedsPatch
        } else {
            Staleness::NeedsFullRefetch
        }
    }
}

/// Current time as nanoseconds since the Unix epoch
pub fn now_ns() -> u64 {
    u64::try_from(Utc::now().timestamp_nanos_opt().unwrap_or(0)).unwrap_or(0)
}
