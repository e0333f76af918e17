//! CLI Tooling
//!
//! Command-line interface over a single cache entry: import a full download,
//! apply a patch stream, and read the merged view.

use crate::cache::{ApplyOutcome, CacheHandle};
use crate::concurrency::CacheLockManager;
use crate::config::OverlayConfig;
use crate::error::{ApiError, StorageError};
use crate::jlap::{Footer, JlapWriter, DEFAULT_IV};
use crate::patch::PatchSet;
use crate::state::Staleness;
use crate::store::persistence::write_atomic;
use crate::types::{from_hex, is_record_section, short_hex, Record};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// repodata-overlay - Apply JLAP patches to cached repodata without rewriting it
#[derive(Parser)]
#[command(name = "repodata-overlay")]
#[command(about = "Apply incremental repodata patches as an overlay over the cached document")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Cache directory (overrides configuration)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Cache entry name (file stem inside the cache directory)
    #[arg(long, default_value = "repodata")]
    pub name: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a complete repodata.json as the new baseline
    Import {
        /// Downloaded repodata.json
        path: PathBuf,
    },
    /// Apply a JLAP patch stream
    Apply {
        /// Stream bytes, as fetched from the server
        path: PathBuf,
        /// Byte offset of the remote file the stream starts at
        #[arg(long, default_value = "0")]
        pos: u64,
    },
    /// Show one record, or a top-level value when no key is given
    Lookup {
        section: String,
        key: Option<String>,
    },
    /// List every record of a section
    List {
        section: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show cache provenance and what to do next
    Status {
        /// `latest` hash of the current remote footer
        #[arg(long)]
        latest: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Record that the server reported no change
    Refresh,
    /// Write the merged document
    Export {
        /// Destination file
        output: PathBuf,
    },
    /// Build a JLAP stream from patch-set files
    JlapWrite {
        /// Patch-set JSON files, oldest first
        patches: Vec<PathBuf>,
        /// `latest` hash written to the footer
        #[arg(long)]
        latest: String,
        /// Initialization vector as hex (all zeroes when omitted)
        #[arg(long)]
        iv: Option<String>,
        /// Destination file
        #[arg(long)]
        output: PathBuf,
    },
}

impl Cli {
    /// Apply `--log-*` flags on top of the loaded configuration.
    pub fn apply_log_overrides(&self, config: &mut OverlayConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
    }
}

/// CLI context holding the opened cache
pub struct CliContext {
    cache: CacheHandle,
}

impl CliContext {
    /// Open cache `name` with `config`, honoring a `--cache-dir` override.
    pub fn new(config: &OverlayConfig, cache_dir: Option<PathBuf>, name: &str) -> Result<Self, ApiError> {
        let mut cache_config = config.cache.clone();
        if cache_dir.is_some() {
            cache_config.cache_dir = cache_dir;
        }
        let dir = cache_config.resolve_cache_dir()?;
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let locks = Arc::new(CacheLockManager::new());
        let cache = CacheHandle::open(&cache_config, name, locks)?;
        Ok(Self { cache })
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Import { path } => {
                let bytes = read_file(path)?;
                self.cache.replace_baseline(&bytes)?;
                let state = self.cache.state();
                Ok(format!(
                    "Imported {} ({} bytes, nominal {})",
                    path.display(),
                    state.size,
                    short_hex(state.nominal_hash.as_deref().unwrap_or("-"))
                ))
            }
            Commands::Apply { path, pos } => {
                let bytes = read_file(path)?;
                match self.cache.apply_stream(&bytes, *pos)? {
                    ApplyOutcome::Applied { latest, patches } => {
                        self.cache.record_jlap_availability(true)?;
                        let overlay = self.cache.snapshot();
                        Ok(format!(
                            "Applied {} patch set(s), now at {} ({} overlay entries, {} bytes)",
                            patches,
                            short_hex(&latest),
                            overlay.overlay().len(),
                            overlay.overlay().byte_size()
                        ))
                    }
                    ApplyOutcome::UpToDate => Ok("Already up to date".to_string()),
                    ApplyOutcome::FallbackRequired(err) => Err(ApiError::Patch(err)),
                }
            }
            Commands::Lookup { section, key } => {
                let snapshot = self.cache.snapshot();
                let view = snapshot.view();
                let found = match key {
                    Some(key) => view.lookup(section, key),
                    None => view.top(section),
                };
                let name = match key {
                    Some(key) => format!("{}/{}", section, key),
                    None => section.clone(),
                };
                let record = found.ok_or_else(|| ApiError::InvalidArgument(format!("{} not found", name)))?;
                Ok(to_pretty(record)?)
            }
            Commands::List { section, format } => {
                if !is_record_section(section) {
                    return Err(ApiError::InvalidArgument(format!(
                        "{} is not a record section",
                        section
                    )));
                }
                let snapshot = self.cache.snapshot();
                let records: BTreeMap<&str, &Record> = snapshot.view().enumerate(section).collect();
                format_records(&records, format)
            }
            Commands::Status { latest, format } => {
                let staleness = self.cache.staleness(latest.as_deref());
                format_status(&self.cache, staleness, format)
            }
            Commands::Refresh => {
                self.cache.refresh()?;
                Ok("Refreshed".to_string())
            }
            Commands::Export { output } => {
                let document = self.cache.snapshot().view().materialize();
                let bytes = serde_json::to_vec(&document).map_err(StorageError::from)?;
                std::fs::write(output, &bytes).map_err(|e| StorageError::io(output, e))?;
                info!(path = %output.display(), bytes = bytes.len(), "Exported merged document");
                Ok(format!("Wrote {} ({} bytes)", output.display(), bytes.len()))
            }
            Commands::JlapWrite {
                patches,
                latest,
                iv,
                output,
            } => {
                let iv = match iv {
                    Some(hex) => from_hex(hex)
                        .ok_or_else(|| ApiError::InvalidArgument(format!("invalid iv {:?}", hex)))?,
                    None => DEFAULT_IV,
                };
                if from_hex(latest).is_none() {
                    return Err(ApiError::InvalidArgument(format!("invalid latest hash {:?}", latest)));
                }

                let mut writer = JlapWriter::new(iv);
                for path in patches {
                    let patch: PatchSet = serde_json::from_slice(&read_file(path)?).map_err(|e| {
                        ApiError::InvalidArgument(format!("{} is not a patch set: {}", path.display(), e))
                    })?;
                    writer.push_patch(&patch)?;
                }
                let bytes = writer.finish(&Footer::new(latest.as_str()))?;
                write_atomic(output, &bytes)?;
                info!(path = %output.display(), patches = patches.len(), "Wrote patch stream");
                Ok(format!(
                    "Wrote {} ({} patch set(s), {} bytes)",
                    output.display(),
                    patches.len(),
                    bytes.len()
                ))
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ApiError> {
    Ok(std::fs::read(path).map_err(|e| StorageError::io(path, e))?)
}

fn to_pretty(value: &serde_json::Value) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(value).map_err(StorageError::from)?)
}

fn field(record: &Record, name: &str) -> String {
    match record.get(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

fn format_records(records: &BTreeMap<&str, &Record>, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        let object: serde_json::Map<String, serde_json::Value> = records
            .iter()
            .map(|(k, v)| (k.to_string(), (*v).clone()))
            .collect();
        return to_pretty(&serde_json::Value::Object(object));
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Filename", "Name", "Version", "Build"]);
    for (key, record) in records {
        table.add_row(vec![
            key.to_string(),
            field(record, "name"),
            field(record, "version"),
            field(record, "build"),
        ]);
    }
    Ok(format!("{}\n{} record(s)", table, records.len()))
}

fn format_status(cache: &CacheHandle, staleness: Staleness, format: &str) -> Result<String, ApiError> {
    let state = cache.state();
    let snapshot = cache.snapshot();

    if format == "json" {
        let value = serde_json::json!({
            "name": cache.name(),
            "staleness": staleness,
            "overlay_entries": snapshot.overlay().len(),
            "overlay_bytes": snapshot.overlay().byte_size(),
            "state": state,
        });
        return to_pretty(&value);
    }

    let label = match staleness {
        Staleness::Fresh => staleness.to_string().green().to_string(),
        Staleness::NeedsPatch => staleness.to_string().yellow().to_string(),
        Staleness::NeedsFullRefetch => staleness.to_string().red().to_string(),
    };
    let hash = |h: &Option<String>| h.as_deref().map(short_hex).unwrap_or("-").to_string();

    let mut out = String::new();
    out.push_str(&format!("{}\n", cache.name().bold().underline()));
    out.push_str(&format!("  status:   {}\n", label));
    out.push_str(&format!("  baseline: {} ({} bytes)\n", cache.paths().json.display(), state.size));
    out.push_str(&format!("  nominal:  {}\n", hash(&state.nominal_hash)));
    out.push_str(&format!("  combined: {}\n", hash(&state.combined_hash)));
    out.push_str(&format!(
        "  overlay:  {} entries, {} bytes\n",
        snapshot.overlay().len(),
        snapshot.overlay().byte_size()
    ));
    if let Some(jlap) = &state.jlap {
        out.push_str(&format!("  cursor:   {}\n", jlap.cursor.pos));
    }
    if let Some(reason) = &state.invalidated {
        out.push_str(&format!("  invalidated: {}\n", reason.red()));
    }
    Ok(out)
}
