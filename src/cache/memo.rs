// Disk-backed memoization with a freshness window in whole days.
// Serves repeated calls from stored results and recomputes misses, stale and corrupt entries.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::config::{Settings, keys};
use crate::error::Result;

use super::key::{CallArgs, entry_path, sanitize_name};
use super::store;

/// Default freshness window in days.
pub const DEFAULT_PERIOD_DAYS: u32 = 1;

/// Default root directory for cache namespaces.
pub const DEFAULT_CACHE_ROOT: &str = "./Assets/pickle/";

/// Resolved cache settings, fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding one subdirectory per namespace.
    pub root: PathBuf,
    /// Maximum entry age in whole days before it is considered stale.
    pub period: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_CACHE_ROOT),
            period: DEFAULT_PERIOD_DAYS,
        }
    }
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>, period: u32) -> Self {
        Self {
            root: root.into(),
            period,
        }
    }

    /// Resolve `PATH_PICKLE` and `PICKLE_PERIOD_DEFAULT` once.
    pub fn from_settings(settings: &Settings) -> Self {
        let root: String = settings.get(keys::PATH_PICKLE, DEFAULT_CACHE_ROOT.to_string());
        let period = settings.get(keys::PICKLE_PERIOD_DEFAULT, DEFAULT_PERIOD_DAYS);
        Self::new(root, period)
    }

    /// Same root, different freshness window.
    pub fn with_period(mut self, period: u32) -> Self {
        self.period = period;
        self
    }
}

/// Why a lookup could not be served from storage.
#[derive(Debug)]
enum Miss {
    NotFound,
    Stale { age_days: i64 },
    Corrupt(String),
}

/// Read-through cache for the calls of one function.
#[derive(Debug, Clone)]
pub struct PickleCache {
    namespace: String,
    dir: PathBuf,
    period: u32,
}

impl PickleCache {
    /// Create a cache for `namespace` (normally the function name).
    pub fn new(namespace: impl Into<String>, config: CacheConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.root.join(sanitize_name(&namespace));
        Self {
            namespace,
            dir,
            period: config.period,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Directory holding this namespace's entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// Path of the entry for `args`.
    pub fn entry_path(&self, args: &CallArgs) -> PathBuf {
        entry_path(&self.dir, &args.key())
    }

    /// Return the stored result for `args`, or run `compute` and store its result.
    ///
    /// Errors from `compute` are returned unchanged and nothing is stored.
    /// Storage problems never reach the caller; they only cause a recompute
    /// or a skipped write.
    pub fn get_or_compute<T, E, F>(&self, args: &CallArgs, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let path = self.entry_path(args);

        match self.lookup::<T>(&path) {
            Ok(value) => return Ok(value),
            Err(Miss::NotFound) => {
                debug!(namespace = %self.namespace, path = %path.display(), "Cache miss");
            }
            Err(Miss::Stale { age_days }) => {
                info!(
                    namespace = %self.namespace,
                    age_days,
                    period = self.period,
                    "Cache entry stale ({} > {} days), reloading",
                    age_days,
                    self.period
                );
            }
            Err(Miss::Corrupt(reason)) => {
                warn!(namespace = %self.namespace, path = %path.display(), reason = %reason, "Cache entry unreadable, recomputing");
            }
        }

        let value = compute()?;
        if let Err(e) = self.store(&path, &value) {
            warn!(namespace = %self.namespace, path = %path.display(), error = %e, "Failed to write cache entry");
        }
        Ok(value)
    }

    /// Infallible form of [`PickleCache::get_or_compute`].
    pub fn get_or_insert_with<T, F>(&self, args: &CallArgs, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.get_or_compute(args, || Ok::<T, std::convert::Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Delete the stored result for `args`. A missing entry is not an error.
    pub fn clear_for_arguments(&self, args: &CallArgs) -> Result<()> {
        store::delete(&self.entry_path(args))
    }

    /// Delete every stored result in this namespace. Returns how many were removed.
    pub fn clear_namespace(&self) -> Result<usize> {
        let removed = store::clear_dir(&self.dir)?;
        debug!(namespace = %self.namespace, removed, "Cleared cache namespace");
        Ok(removed)
    }

    /// Wrap `func` so every call goes through this cache.
    pub fn memoize<F>(self, func: F) -> Memoized<F> {
        Memoized { cache: self, func }
    }

    fn lookup<T: DeserializeOwned>(&self, path: &Path) -> std::result::Result<T, Miss> {
        let modified = store::modified_at(path).map_err(|_| Miss::NotFound)?;
        let age_days = age_in_days(modified, SystemTime::now());

        if age_days > i64::from(self.period) {
            return Err(Miss::Stale { age_days });
        }

        let bytes = store::read_bytes(path).map_err(|e| Miss::Corrupt(e.to_string()))?;
        let value = serde_json::from_slice(&bytes).map_err(|e| Miss::Corrupt(e.to_string()))?;
        debug!(namespace = %self.namespace, age_days, "Cache entry fresh");
        Ok(value)
    }

    fn store<T: Serialize + DeserializeOwned>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        // A payload that does not parse back (NaN, infinities) would count as
        // corrupt on every later access, so it is never written.
        serde_json::from_slice::<T>(&bytes)?;
        store::ensure_dir(&self.dir)?;
        store::write_atomic(path, &bytes)
    }
}

/// Whole days between `modified` and `now`, truncated toward zero.
/// Timestamps in the future count as age zero.
fn age_in_days(modified: SystemTime, now: SystemTime) -> i64 {
    let modified: DateTime<Local> = modified.into();
    let now: DateTime<Local> = now.into();
    now.signed_duration_since(modified).num_days().max(0)
}

/// A function bound to its cache, with the clearing operations attached.
#[derive(Debug, Clone)]
pub struct Memoized<F> {
    cache: PickleCache,
    func: F,
}

impl<F> Memoized<F> {
    /// Call through the cache.
    pub fn call<T, E>(&self, args: &CallArgs) -> std::result::Result<T, E>
    where
        F: Fn(&CallArgs) -> std::result::Result<T, E>,
        T: Serialize + DeserializeOwned,
    {
        self.cache.get_or_compute(args, || (self.func)(args))
    }

    /// Delete the cached result for these particular arguments.
    pub fn clear_cache(&self, args: &CallArgs) -> Result<()> {
        self.cache.clear_for_arguments(args)
    }

    /// Delete all cached results for this function.
    pub fn clear_all_cache(&self) -> Result<usize> {
        self.cache.clear_namespace()
    }

    pub fn cache(&self) -> &PickleCache {
        &self.cache
    }
}
