use crate::cache::DiskCache;
use crate::error::CacheError;
use std::path::PathBuf;

pub const APP_NAME: &str = "photodupes";

/// Runtime settings, filled from command-line options and their environment fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding one file per cache key.
    pub cache_root: PathBuf,
    pub cache_enabled: bool,
    /// Size of the worker pool for sync and scoring.
    pub workers: usize,
    /// JSON library export served as the remote library.
    pub library: Option<PathBuf>,
}

impl Settings {
    /// `<platform cache dir>/photodupes`, or `./.photodupes` when the platform has none.
    pub fn default_cache_root() -> PathBuf {
        match dirs::cache_dir() {
            Some(dir) => dir.join(APP_NAME),
            None => PathBuf::from(format!(".{}", APP_NAME)),
        }
    }

    pub fn default_workers() -> usize {
        num_cpus::get()
    }

    pub fn open_cache(&self) -> Result<DiskCache, CacheError> {
        if self.cache_enabled {
            DiskCache::new(&self.cache_root)
        } else {
            log::info!("Disk cache disabled; every fetch goes to the library");
            Ok(DiskCache::disabled(&self.cache_root))
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: Self::default_cache_root(),
            cache_enabled: true,
            workers: Self::default_workers(),
            library: None,
        }
    }
}
