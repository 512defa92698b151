//! On-disk index of a file cache
//!
//! Stored as `manifest.json` next to the cached files:
//!
//! ```json
//! {"version": 1, "timestamp": 1700000000, "entries": [
//!   {"url": "...", "filename": "<sha256>.mp3", "fileSize": 1024, "lastAccessTime": 1700000000.123}
//! ]}
//! ```
//!
//! Loading is lenient: entries that fail to parse are skipped, and a missing
//! or unreadable manifest yields an empty one.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CacheError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// One cached file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(rename = "url")]
    pub key: String,
    pub filename: String,
    pub file_size: u64,
    /// Seconds since the Unix epoch, with a fractional part
    pub last_access_time: f64,
}

#[derive(Debug, Serialize)]
struct ManifestDocument<'a> {
    version: u32,
    timestamp: u64,
    entries: &'a [ManifestEntry],
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    entries: Vec<Value>,
}

/// Read the entries in `path`
///
/// Never fails: problems are logged and degrade to fewer (or no) entries.
pub fn load(path: &Path) -> Vec<ManifestEntry> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable cache manifest, starting empty");
            return Vec::new();
        }
    };

    let document: RawDocument = match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt cache manifest, starting empty");
            return Vec::new();
        }
    };

    let total = document.entries.len();
    let entries: Vec<ManifestEntry> = document
        .entries
        .into_iter()
        .filter_map(|raw| match serde_json::from_value(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupt manifest entry");
                None
            }
        })
        .collect();

    debug!(
        path = %path.display(),
        loaded = entries.len(),
        skipped = total - entries.len(),
        "Loaded cache manifest"
    );
    entries
}

/// Write `entries` to `path`, replacing the previous manifest atomically
pub fn save(path: &Path, entries: &[ManifestEntry]) -> Result<(), CacheError> {
    let document = ManifestDocument {
        version: MANIFEST_VERSION,
        timestamp: epoch_secs(),
        entries,
    };
    let json = serde_json::to_vec_pretty(&document)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| CacheError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CacheError::io(path, e))
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
