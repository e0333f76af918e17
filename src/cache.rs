//! Cache Handle
//!
//! One cached repodata document: baseline file, overlay side file and
//! provenance sidecar. Patch application is serialized per cache through the
//! [`CacheLockManager`]; readers take a [`Snapshot`] and never block writers.
//! A new overlay becomes visible only once it is fully built and persisted.

use crate::baseline::BaselineDocument;
use crate::concurrency::CacheLockManager;
use crate::config::cache_paths::{CacheConfig, CachePaths};
use crate::error::{ApiError, PatchError, StorageError};
use crate::jlap::{Footer, JlapBuffer, JlapCursor};
use crate::patch::{find_patches, PatchCollector};
use crate::state::{now_ns, BaselineStat, CacheState, Staleness};
use crate::store::persistence::{self, write_atomic};
use crate::store::OverlayStore;
use crate::types::short_hex;
use crate::views::OverlayView;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Published baseline and overlay pair
#[derive(Debug, Clone)]
pub struct Snapshot {
    baseline: Arc<BaselineDocument>,
    overlay: Arc<OverlayStore>,
}

impl Snapshot {
    pub fn view(&self) -> OverlayView<'_, BaselineDocument> {
        OverlayView::new(&*self.baseline, &*self.overlay)
    }

    pub fn baseline(&self) -> &BaselineDocument {
        &self.baseline
    }

    pub fn overlay(&self) -> &OverlayStore {
        &self.overlay
    }
}

/// Result of feeding a patch stream to the cache
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// A new overlay reaching `latest` was published
    Applied { latest: String, patches: usize },
    /// The cache already holds the stream's newest revision
    UpToDate,
    /// Nothing was published; download the complete document instead
    FallbackRequired(PatchError),
}

enum Built {
    UpToDate {
        cursor: JlapCursor,
        footer: Footer,
    },
    Overlay {
        overlay: OverlayStore,
        cursor: JlapCursor,
        footer: Footer,
        patches: usize,
    },
}

pub struct CacheHandle {
    name: String,
    paths: CachePaths,
    max_overlay_bytes: usize,
    ttl: Duration,
    locks: Arc<CacheLockManager>,
    state: RwLock<CacheState>,
    published: RwLock<Snapshot>,
}

impl CacheHandle {
    /// Open cache entry `name` under the configured cache directory.
    ///
    /// A missing baseline opens an empty cache that needs a full download.
    /// An overlay side file that fails its digest check is discarded.
    pub fn open(config: &CacheConfig, name: &str, locks: Arc<CacheLockManager>) -> Result<Self, ApiError> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ApiError::InvalidArgument(format!("invalid cache name {:?}", name)));
        }
        let dir = config.resolve_cache_dir()?;
        let paths = CachePaths::new(&dir, name);
        let mut state = CacheState::load(&paths.state)?;

        let baseline = match BaselineDocument::load(&paths.json) {
            Ok(baseline) => {
                let hash = baseline.nominal_hash_hex();
                if state.nominal_hash.as_ref().is_some_and(|nominal| *nominal != hash) {
                    warn!(
                        cache = name,
                        nominal_hash = short_hex(&hash),
                        "Baseline changed underneath the overlay"
                    );
                    state.invalidate("baseline_changed");
                    state.save(&paths.state)?;
                    persistence::remove(&paths.overlay)?;
                }
                baseline
            }
            Err(StorageError::BaselineMissing(path)) => {
                debug!(path = %path, "No baseline yet");
                BaselineDocument::empty()
            }
            Err(e) => return Err(e.into()),
        };

        let overlay = match state.overlay.clone() {
            Some(provenance) => match persistence::load(&paths.overlay, Some(&provenance.digest)) {
                Ok(overlay) => overlay,
                Err(err) => {
                    warn!(cache = name, error = %err, "Discarding unreadable overlay side file");
                    state.invalidate("overlay_unreadable");
                    state.save(&paths.state)?;
                    persistence::remove(&paths.overlay)?;
                    OverlayStore::new()
                }
            },
            None => {
                if state.combined_hash.is_some() && state.combined_hash != state.nominal_hash {
                    state.invalidate("overlay_missing");
                    state.save(&paths.state)?;
                }
                OverlayStore::new()
            }
        };

        info!(
            cache = name,
            entries = overlay.len(),
            overlay_bytes = overlay.byte_size(),
            "Opened cache"
        );

        Ok(Self {
            name: name.to_string(),
            paths,
            max_overlay_bytes: config.max_overlay_bytes,
            ttl: config.ttl(),
            locks,
            state: RwLock::new(state),
            published: RwLock::new(Snapshot {
                baseline: Arc::new(baseline),
                overlay: Arc::new(overlay),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Copy of the current sidecar contents
    pub fn state(&self) -> CacheState {
        self.state.read().clone()
    }

    /// Currently published view; unaffected by later writes
    pub fn snapshot(&self) -> Snapshot {
        self.published.read().clone()
    }

    /// Install a freshly downloaded complete document.
    ///
    /// The overlay is dropped: the new baseline already contains everything
    /// it described.
    pub fn replace_baseline(&self, bytes: &[u8]) -> Result<(), ApiError> {
        let lock = self.locks.get_lock(&self.name);
        let _guard = lock.lock();

        BaselineDocument::from_bytes(bytes)?;
        write_atomic(&self.paths.json, bytes)?;
        let baseline = BaselineDocument::load(&self.paths.json)?;
        persistence::remove(&self.paths.overlay)?;

        let mut state = self.state.read().clone();
        state.record_full_fetch(&baseline, now_ns());
        state.save(&self.paths.state)?;

        *self.state.write() = state;
        *self.published.write() = Snapshot {
            baseline: Arc::new(baseline),
            overlay: Arc::new(OverlayStore::new()),
        };
        info!(cache = %self.name, "Replaced baseline");
        Ok(())
    }

    /// Apply a JLAP stream read from byte offset `pos` of the remote file.
    ///
    /// Patch failures never surface as errors: the state is invalidated and
    /// [`ApplyOutcome::FallbackRequired`] is returned. Only failures to
    /// read or write cache files are errors.
    pub fn apply_stream(&self, bytes: &[u8], pos: u64) -> Result<ApplyOutcome, ApiError> {
        let lock = self.locks.get_lock(&self.name);
        let _guard = lock.lock();

        let current = self.snapshot();
        let mut state = self.state.read().clone();

        let built = match self.build(&current, &state, bytes, pos) {
            Ok(built) => built,
            Err(err) => {
                warn!(cache = %self.name, kind = err.kind(), error = %err, "Patch application failed");
                state.invalidate(err.kind());
                state.save(&self.paths.state)?;
                *self.state.write() = state;
                return Ok(ApplyOutcome::FallbackRequired(err));
            }
        };

        match built {
            Built::UpToDate { cursor, footer } => {
                state.record_cursor(cursor, footer, now_ns());
                state.save(&self.paths.state)?;
                *self.state.write() = state;
                info!(cache = %self.name, "Cache already up to date");
                Ok(ApplyOutcome::UpToDate)
            }
            Built::Overlay {
                overlay,
                cursor,
                footer,
                patches,
            } => {
                let provenance = persistence::save(&overlay, &self.paths.overlay)?;
                let latest = footer.latest.clone();
                state.record_overlay_build(&latest, cursor, footer, Some(provenance), now_ns());
                state.save(&self.paths.state)?;

                *self.state.write() = state;
                *self.published.write() = Snapshot {
                    baseline: current.baseline.clone(),
                    overlay: Arc::new(overlay),
                };
                info!(
                    cache = %self.name,
                    latest = short_hex(&latest),
                    patches,
                    "Published overlay"
                );
                Ok(ApplyOutcome::Applied { latest, patches })
            }
        }
    }

    fn build(
        &self,
        current: &Snapshot,
        state: &CacheState,
        bytes: &[u8],
        pos: u64,
    ) -> Result<Built, PatchError> {
        let baseline_hash = current.baseline.nominal_hash_hex();
        if let Some(nominal) = state.nominal_hash.as_deref() {
            if nominal != baseline_hash {
                return Err(PatchError::IntegrityMismatch {
                    expected: nominal.to_string(),
                    computed: baseline_hash,
                });
            }
        }

        let iv = state.check_continuity(pos)?;
        let buffer = JlapBuffer::parse(bytes, &iv, pos)?;
        let footer = buffer.footer()?;
        let cursor = buffer.cursor();

        let have = state
            .effective_hash()
            .ok_or_else(|| PatchError::PatchNotFound("no local revision".to_string()))?;
        if have == footer.latest && state.invalidated.is_none() {
            return Ok(Built::UpToDate { cursor, footer });
        }

        // after invalidation the published overlay no longer matches any recorded hash
        let base = if state.invalidated.is_some() {
            Arc::new(OverlayStore::new())
        } else {
            current.overlay.clone()
        };

        let patches = buffer.patches()?;
        let chain = find_patches(&patches, have, &footer.latest)?;
        let count = chain.len();
        let collector = PatchCollector::new(current.baseline.as_ref(), self.max_overlay_bytes);
        let overlay = collector.apply(&base, chain)?;

        Ok(Built::Overlay {
            overlay,
            cursor,
            footer,
            patches: count,
        })
    }

    /// What to do next, given the remote footer's `latest` hash when known
    pub fn staleness(&self, remote_latest: Option<&str>) -> Staleness {
        let stat = match BaselineStat::of(&self.paths.json) {
            Ok(stat) => Some(stat),
            Err(err) => {
                debug!(error = %err, "Baseline not readable");
                None
            }
        };
        self.state
            .read()
            .staleness(stat.as_ref(), remote_latest, self.ttl, Utc::now())
    }

    /// The server reported no change (HTTP 304).
    pub fn refresh(&self) -> Result<(), ApiError> {
        let lock = self.locks.get_lock(&self.name);
        let _guard = lock.lock();

        let mut state = self.state.read().clone();
        state.record_refresh(now_ns());
        state.save(&self.paths.state)?;
        *self.state.write() = state;
        Ok(())
    }

    /// Remember whether the server offers a patch stream for this cache.
    pub fn record_jlap_availability(&self, available: bool) -> Result<(), ApiError> {
        let lock = self.locks.get_lock(&self.name);
        let _guard = lock.lock();

        let mut state = self.state.read().clone();
        state.set_has_jlap(available, Utc::now());
        state.save(&self.paths.state)?;
        *self.state.write() = state;
        Ok(())
    }
}
