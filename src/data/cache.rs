//! Time-to-live cache for fetched series.
//!
//! Entries are keyed by source identity (name + URL, plus any setting that
//! shapes the result) and store the series together with its expiry time.
//! Lookups past the expiry miss. An optional directory makes entries survive
//! process restarts (one JSON file per key).

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Series, SeriesPoint};

#[derive(Debug, Clone)]
struct CacheEntry {
    series: Series,
    expires_at: DateTime<Utc>,
}

/// On-disk layout. `NaN` values are stored as `null`.
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    expires_at: DateTime<Utc>,
    points: Vec<(NaiveDate, Option<f64>)>,
}

#[derive(Debug, Default)]
pub struct SeriesCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    dir: Option<PathBuf>,
}

impl SeriesCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Memory cache backed by JSON files under `dir` (created on first write).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            dir: Some(dir.into()),
        }
    }

    /// Cached series for `key` if present and not expired at `now`.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Series> {
        {
            let entries = self.lock();
            if let Some(entry) = entries.get(key) {
                if now < entry.expires_at {
                    return Some(entry.series.clone());
                }
            }
        }

        let entry = self.read_disk(key)?;
        if now >= entry.expires_at {
            return None;
        }
        let series = entry.series.clone();
        self.lock().insert(key.to_string(), entry);
        Some(series)
    }

    /// Store `series` under `key` until `now + ttl`.
    pub fn put(&self, key: &str, series: &Series, ttl: Duration, now: DateTime<Utc>) {
        let entry = CacheEntry {
            series: series.clone(),
            expires_at: now + ttl,
        };
        self.write_disk(key, &entry);
        self.lock().insert(key.to_string(), entry);
    }

    /// Expiry time of a live entry, if any.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.lock().get(key).map(|e| e.expires_at)
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
        if let Some(path) = self.path_for(key) {
            let _ = fs::remove_file(path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Some(dir.join(format!("{:016x}.json", hasher.finish())))
    }

    fn read_disk(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path_for(key)?;
        let file = File::open(&path).ok()?;
        let disk: DiskEntry = match serde_json::from_reader(file) {
            Ok(disk) => disk,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ignoring unreadable cache file");
                return None;
            }
        };
        if disk.key != key {
            return None;
        }
        let points = disk
            .points
            .into_iter()
            .map(|(date, value)| SeriesPoint::new(date, value.unwrap_or(f64::NAN)))
            .collect();
        Some(CacheEntry {
            series: Series::from_points(points),
            expires_at: disk.expires_at,
        })
    }

    fn write_disk(&self, key: &str, entry: &CacheEntry) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        if let Err(e) = write_entry(&path, key, entry) {
            // A cache that cannot persist is still a working memory cache.
            tracing::warn!(path = %path.display(), error = %e, "failed to persist cache entry");
        }
    }
}

fn write_entry(path: &Path, key: &str, entry: &CacheEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let disk = DiskEntry {
        key: key.to_string(),
        expires_at: entry.expires_at,
        points: entry
            .series
            .points()
            .iter()
            .map(|p| (p.date, p.is_observed().then_some(p.value)))
            .collect(),
    };
    let file = File::create(path)?;
    serde_json::to_writer(file, &disk).map_err(std::io::Error::other)
}
