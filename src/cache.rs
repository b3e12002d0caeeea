//! Disk-backed, keyed, coalescing cache.
//!
//! Each cache key maps to one JSON file under the cache root. Producing a
//! value for a key is serialised behind a lock scoped to that key only, so
//! concurrent callers asking for the same key trigger a single producer run
//! while callers asking for different keys proceed independently.
//!
//! File names percent-encode `%`, `/`, `\` and NUL, so distinct keys never
//! share a file. In-flight writes use a `%partial` suffix, which no encoded
//! key can end with.

use crate::error::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use walkdir::WalkDir;

/// Reference-counted table of per-key locks.
///
/// An entry lives only while at least one caller holds or waits on it; the
/// last lease to drop removes it from the table.
#[derive(Default)]
struct KeyLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn lease(&self, key: &str) -> KeyLease<'_> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = table.entry(key.to_string()).or_default().clone();
        KeyLease {
            locks: self,
            key: key.to_string(),
            lock: Some(lock),
        }
    }

    fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct KeyLease<'a> {
    locks: &'a KeyLocks,
    key: String,
    lock: Option<Arc<Mutex<()>>>,
}

impl KeyLease<'_> {
    fn acquire(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        let mut table = self
            .locks
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(self.lock.take());
        // Only the table's own reference left: nobody holds or awaits the key.
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

pub struct DiskCache {
    root: PathBuf,
    enabled: bool,
    locks: KeyLocks,
}

impl DiskCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            enabled: true,
            locks: KeyLocks::default(),
        })
    }

    /// A cache that never reads or writes entries; every `get` runs its producer.
    pub fn disabled(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enabled: false,
            locks: KeyLocks::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the stored value for `key`, or run `produce` and persist its output.
    ///
    /// The boolean is `true` when the value came from storage. With
    /// `skip_cache` the producer always runs and overwrites any stored entry.
    /// A producer error is propagated untouched and nothing is written.
    pub fn get<T, E, F>(&self, key: &str, skip_cache: bool, produce: F) -> Result<(T, bool), E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError> + fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        let path = self.entry_path(key)?;

        if !skip_cache {
            if let Some(value) = self.read(key, &path)? {
                return Ok((value, true));
            }
        }

        let lease = self.locks.lease(key);
        let _guard = lease.acquire();

        // Another caller may have populated the entry while we waited.
        if !skip_cache {
            if let Some(value) = self.read(key, &path)? {
                return Ok((value, true));
            }
        }

        log::debug!("{}\tproducing new cache entry", key);
        let value = match produce() {
            Ok(value) => value,
            Err(err) => {
                log::debug!("{}\tproducer failed, nothing cached: {}", key, err);
                return Err(err);
            }
        };
        self.write(key, &path, &value)?;
        Ok((value, false))
    }

    /// Like [`DiskCache::get`] without the source flag.
    pub fn get_value<T, E, F>(&self, key: &str, skip_cache: bool, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError> + fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        self.get(key, skip_cache, produce).map(|(value, _)| value)
    }

    /// Remove the entry for `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("{}\tdeleted cache entry", key);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Total size in bytes of everything under the cache root.
    pub fn size(&self) -> u64 {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Remove every entry under the cache root, returning `(files, directories)` removed.
    pub fn clear(&self) -> Result<(usize, usize), CacheError> {
        let io_err = |source| CacheError::Io {
            key: self.root.display().to_string(),
            source,
        };
        let (mut files, mut directories) = (0, 0);
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok((0, 0)),
            Err(err) => return Err(io_err(err)),
        };
        for entry in entries {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if entry.file_type().map_err(io_err)?.is_dir() {
                fs::remove_dir_all(&path).map_err(io_err)?;
                directories += 1;
            } else {
                fs::remove_file(&path).map_err(io_err)?;
                files += 1;
            }
        }
        Ok((files, directories))
    }

    /// Number of keys currently holding a lock-table slot.
    pub fn pending_locks(&self) -> usize {
        self.locks.len()
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let name = sanitize_key(key).ok_or_else(|| CacheError::InvalidKey {
            key: key.to_string(),
        })?;
        Ok(self.root.join(name))
    }

    fn read<T: DeserializeOwned>(&self, key: &str, path: &Path) -> Result<Option<T>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    key: key.to_string(),
                    source,
                });
            }
        };
        match serde_json::from_str(&json) {
            Ok(value) => {
                log::debug!("{}\tretrieved entry from local cache", key);
                Ok(Some(value))
            }
            Err(source) => {
                log::warn!("{}\tcache entry could not be deserialized: {}", key, source);
                Err(CacheError::Corrupt {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, path: &Path, value: &T) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let json = serde_json::to_string(value).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let io_err = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };
        // Write beside the entry then rename, so readers never see a partial file.
        let partial = partial_path(path);
        fs::write(&partial, json).map_err(io_err)?;
        fs::rename(&partial, path).map_err(io_err)?;
        log::debug!("{}\tstored new cache entry", key);
        Ok(())
    }
}

const PARTIAL_SUFFIX: &str = "%partial";

/// Temporary path for an entry being written.
fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    PathBuf::from(partial)
}

/// Map a cache key to a file name, percent-encoding path separators.
///
/// `%` is escaped too, so the mapping is one-to-one and every `%` in a
/// file name is followed by two hex digits. Returns `None` for keys that
/// cannot name a file inside the root.
fn sanitize_key(key: &str) -> Option<String> {
    let mut name = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            '\0' => name.push_str("%00"),
            c => name.push(c),
        }
    }
    match name.as_str() {
        "" | "." | ".." => None,
        _ => Some(name),
    }
}
