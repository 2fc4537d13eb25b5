// src/cache/store.rs
// =============================================================================
// A durable URL -> validity cache with a time-to-live.
//
// Lifecycle:
// 1. load(): read the JSON file, drop every entry older than the TTL
// 2. get()/set(): used concurrently by all workers during a run
// 3. save(): write the whole map back to disk
//
// Expiry is evaluated once, at load time. An entry that gets older than the
// TTL while the run is going stays usable until the next load.
//
// Concurrency:
// - The map lives behind a std RwLock: many readers, one writer
// - Lookups take the read lock, upserts take the write lock
// - There is no read-then-write transaction; the engine never dispatches
//   the same URL twice, so two workers never race on one key
// =============================================================================

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// What we remember about one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub valid: bool,
    pub timestamp: DateTime<Utc>,
}

/// Errors reading or writing the cache file.
///
/// None of these are fatal for a run: a failed load means "start empty",
/// a failed save means "results are not persisted".
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to read cache file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to decode cache file {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write cache file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode cache: {0}")]
    Encode(#[from] serde_json::Error),
}

// On-disk layout. The TTL is stored in nanoseconds.
#[derive(Deserialize)]
struct CacheFileIn {
    #[serde(default)]
    entries: HashMap<String, CacheEntry>,
}

#[derive(Serialize)]
struct CacheFileOut<'a> {
    entries: &'a HashMap<String, CacheEntry>,
    ttl: u64,
    count: usize,
}

/// The URL validity cache shared by every worker of a run.
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Cache {
    /// Creates an empty cache bound to `path`. Nothing is read until `load()`.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Loads the cache file, keeping only entries younger than the TTL.
    ///
    /// A missing file is not an error: the cache simply starts empty.
    pub fn load(&self) -> Result<(), CacheError> {
        self.load_at(Utc::now())
    }

    // Same as load(), with the "current" instant passed in
    fn load_at(&self, now: DateTime<Utc>) -> Result<(), CacheError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no cache file found, starting empty");
                return Ok(());
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: CacheFileIn =
            serde_json::from_str(&raw).map_err(|source| CacheError::Decode {
                path: self.path.clone(),
                source,
            })?;

        // A TTL too large for chrono means nothing ever expires
        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX);
        let total = file.entries.len();

        let fresh: HashMap<String, CacheEntry> = file
            .entries
            .into_iter()
            .filter(|(_, entry)| now.signed_duration_since(entry.timestamp) < ttl)
            .collect();

        info!(
            loaded = fresh.len(),
            expired = total - fresh.len(),
            "cache loaded"
        );

        *self.write_lock() = fresh;
        Ok(())
    }

    /// Writes the full cache to disk.
    ///
    /// The JSON goes to a temporary file in the same directory, which is then
    /// renamed over the real one, so a crash mid-write never leaves a
    /// truncated cache. On any failure the temporary file is removed.
    pub fn save(&self) -> Result<(), CacheError> {
        let entries = self.read_lock();
        let file = CacheFileOut {
            entries: &*entries,
            ttl: u64::try_from(self.ttl.as_nanos()).unwrap_or(u64::MAX),
            count: entries.len(),
        };

        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };

        // NamedTempFile deletes itself when dropped, so every early return
        // below cleans up after itself
        let mut tmp = NamedTempFile::new_in(self.dir()).map_err(write_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush().map_err(write_err)?;
        }

        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        info!(entries = file.count, path = %self.path.display(), "cache saved");
        Ok(())
    }

    /// Looks up a URL.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        self.read_lock().get(url).cloned()
    }

    /// Records the outcome for a URL with a fresh timestamp.
    /// The last writer wins.
    pub fn set(&self, url: &str, valid: bool) {
        self.insert_entry(CacheEntry {
            url: url.to_string(),
            valid,
            timestamp: Utc::now(),
        });
    }

    /// Inserts an entry as-is, keeping its timestamp.
    pub fn insert_entry(&self, entry: CacheEntry) {
        debug!(url = %entry.url, valid = entry.valid, "cache set");
        self.write_lock().insert(entry.url.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }

    /// Every URL currently marked valid.
    pub fn valid_urls(&self) -> BTreeSet<String> {
        self.read_lock()
            .values()
            .filter(|entry| entry.valid)
            .map(|entry| entry.url.clone())
            .collect()
    }

    // Directory the cache file lives in; a bare file name means the
    // current directory
    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    // A panicking writer cannot leave a half-inserted entry behind,
    // so a poisoned lock still holds a consistent map
    fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn hours_ago(hours: i64) -> DateTime<Utc> {
        Utc::now() - ChronoDuration::hours(hours)
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path().join("nope.json"), DAY);
        assert!(cache.load().is_ok());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path().join("cache.json"), DAY);

        assert!(cache.get("https://x/y").is_none());
        cache.set("https://x/y", true);
        let entry = cache.get("https://x/y").unwrap();
        assert!(entry.valid);
        assert_eq!(entry.url, "https://x/y");

        // Last writer wins
        cache.set("https://x/y", false);
        assert!(!cache.get("https://x/y").unwrap().valid);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = Cache::new(&path, DAY);
        cache.set("https://example.com/catalog/red/", true);
        cache.set("https://example.com/catalog/blue/", false);
        cache.save().unwrap();

        let reloaded = Cache::new(&path, DAY);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.get("https://example.com/catalog/red/").unwrap().valid);
        assert!(!reloaded.get("https://example.com/catalog/blue/").unwrap().valid);
        assert_eq!(
            reloaded.get("https://example.com/catalog/red/"),
            cache.get("https://example.com/catalog/red/")
        );
        // No temp file left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_saved_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = Cache::new(&path, DAY);
        cache.set("https://x/y", true);
        cache.save().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["ttl"].as_u64().unwrap(), DAY.as_nanos() as u64);
        assert_eq!(json["entries"]["https://x/y"]["valid"], true);
        assert_eq!(json["entries"]["https://x/y"]["url"], "https://x/y");
    }

    #[test]
    fn test_ttl_expiry_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let fresh = hours_ago(23);
        let stale = hours_ago(25);
        let writer = Cache::new(&path, DAY);
        writer.insert_entry(CacheEntry {
            url: "https://x/y".to_string(),
            valid: true,
            timestamp: fresh,
        });
        writer.insert_entry(CacheEntry {
            url: "https://x/z".to_string(),
            valid: true,
            timestamp: stale,
        });
        writer.save().unwrap();

        let cache = Cache::new(&path, DAY);
        cache.load().unwrap();

        let kept = cache.get("https://x/y").unwrap();
        assert!(kept.valid);
        assert_eq!(kept.timestamp, fresh);
        assert!(cache.get("https://x/z").is_none());
    }

    #[test]
    fn test_loads_hand_written_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let ts = hours_ago(23).to_rfc3339();
        let raw = format!(
            r#"{{"entries":{{"https://x/y":{{"url":"https://x/y","valid":true,"timestamp":"{ts}"}}}},"ttl":86400000000000,"count":1}}"#
        );
        fs::write(&path, raw).unwrap();

        let cache = Cache::new(&path, DAY);
        cache.load().unwrap();
        assert!(cache.get("https://x/y").unwrap().valid);
    }

    #[test]
    fn test_load_uses_given_instant() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let writer = Cache::new(&path, DAY);
        writer.set("https://x/y", true);
        writer.save().unwrap();

        let cache = Cache::new(&path, DAY);
        cache.load_at(Utc::now() + ChronoDuration::hours(25)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = Cache::new(&path, DAY);
        assert!(matches!(cache.load(), Err(CacheError::Decode { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path().join("missing").join("cache.json"), DAY);
        cache.set("https://x/y", true);
        assert!(matches!(cache.save(), Err(CacheError::Write { .. })));
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        // A directory where the cache file should be makes the final rename fail
        let path = dir.path().join("cache.json");
        fs::create_dir(&path).unwrap();

        let cache = Cache::new(&path, DAY);
        cache.set("https://x/y", true);
        assert!(matches!(cache.save(), Err(CacheError::Write { .. })));

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("cache.json")]);
    }

    #[test]
    fn test_bare_file_name_saves_in_current_dir() {
        let cache = Cache::new("cache.json", DAY);
        assert_eq!(cache.dir(), Path::new("."));
    }

    #[test]
    fn test_valid_urls() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path().join("cache.json"), DAY);
        cache.set("https://x/a/", true);
        cache.set("https://x/b/", false);
        cache.set("https://x/c/", true);

        let valid: Vec<String> = cache.valid_urls().into_iter().collect();
        assert_eq!(valid, vec!["https://x/a/", "https://x/c/"]);
    }
}
