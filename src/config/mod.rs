// Settings source with fallback defaults.
// Reads a TOML settings file and writes missing defaults back into it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Serialize, de::DeserializeOwned};
use toml::{Table, Value};
use tracing::{debug, warn};

use crate::cache::store;
use crate::error::Result;

/// Settings file used when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.toml";

/// Well-known setting names.
pub mod keys {
    pub const PICKLE_PERIOD_DEFAULT: &str = "PICKLE_PERIOD_DEFAULT";
    pub const PATH_PICKLE: &str = "PATH_PICKLE";
    pub const LOG_FOLDER: &str = "LOG_FOLDER";
    pub const LOG_AGENT: &str = "LOG_AGENT";
    pub const LOG_LEVEL_STREAM: &str = "LOG_LEVEL_STREAM";
    pub const LOG_LEVEL_FILE: &str = "LOG_LEVEL_FILE";
    pub const LOG_LEVEL_DISCORD: &str = "LOG_LEVEL_DISCORD";
    pub const LOG_WEBHOOK_DISCORD: &str = "LOG_WEBHOOK_DISCORD";
    pub const LOG_LEVEL_TELEGRAM: &str = "LOG_LEVEL_TELEGRAM";
    pub const LOG_TELEGRAM_TOKEN: &str = "LOG_TELEGRAM_TOKEN";
    pub const LOG_TELEGRAM_CHAT: &str = "LOG_TELEGRAM_CHAT";
}

/// Key/value settings with total, default-returning lookups.
///
/// A settings source is either backed by a file, held only in memory, or
/// unavailable. An unavailable source answers every lookup with the default.
#[derive(Debug)]
pub struct Settings {
    path: Option<PathBuf>,
    table: Mutex<Option<Table>>,
}

impl Settings {
    /// Open a settings file. Never fails.
    ///
    /// A missing file starts empty and is created on the first write-back.
    /// An unreadable or malformed file makes the source unavailable and is
    /// never overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let table = match load_table(&path) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Settings unavailable, using defaults");
                None
            }
        };

        Self {
            path: Some(path),
            table: Mutex::new(table),
        }
    }

    /// Open `settings.toml` in the working directory.
    pub fn from_default_file() -> Self {
        Self::open(DEFAULT_SETTINGS_FILE)
    }

    /// Settings held only in memory. Defaults are remembered, not persisted.
    pub fn in_memory(table: Table) -> Self {
        Self {
            path: None,
            table: Mutex::new(Some(table)),
        }
    }

    /// A source that always answers with the default.
    pub fn unavailable() -> Self {
        Self {
            path: None,
            table: Mutex::new(None),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.lock().is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().as_ref().is_some_and(|table| table.contains_key(key))
    }

    /// Look up `key`, falling back to `default`.
    ///
    /// When the key is absent the default is stored (and written back to the
    /// settings file) so later reads see it. A stored value of the wrong type
    /// yields the default and is left untouched.
    pub fn get<T>(&self, key: &str, default: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        let mut guard = self.lock();
        let Some(table) = guard.as_mut() else {
            return default;
        };

        if let Some(value) = table.get(key) {
            return match value.clone().try_into::<T>() {
                Ok(value) => value,
                Err(e) => {
                    debug!(key, error = %e, "Setting has unexpected type, using default");
                    default
                }
            };
        }

        match Value::try_from(&default) {
            Ok(value) => {
                table.insert(key.to_string(), value);
                if let Some(path) = &self.path {
                    if let Err(e) = save_table(path, table) {
                        warn!(key, path = %path.display(), error = %e, "Failed to persist default setting");
                    }
                }
            }
            Err(e) => debug!(key, error = %e, "Default not representable in TOML, not persisted"),
        }

        default
    }

    fn lock(&self) -> MutexGuard<'_, Option<Table>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_default_file()
    }
}

fn load_table(path: &Path) -> Result<Table> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.parse::<Table>()?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Table::new()),
        Err(e) => Err(e.into()),
    }
}

fn save_table(path: &Path, table: &Table) -> Result<()> {
    let contents = toml::to_string(table)?;
    store::write_atomic(path, contents.as_bytes())
}
