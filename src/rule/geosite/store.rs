//! GeoSite database store
//!
//! Owns the raw file cache and the decoded record cache. Both are filled
//! on demand and dropped together by [`GeoSiteStore::reload`].

use super::attr::AttributeFilter;
use super::locator::{find_record, record_keys};
use super::schema::{Domain, GeoSite};
use crate::{Error, Result};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use prost::Message;
use std::fs::File;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of decoded records kept in memory
pub const DEFAULT_SITE_CACHE_SIZE: usize = 64;

/// Source of database bytes
pub trait FileReader: Send + Sync {
    /// Open `path` for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// Reads from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileReader;

impl FileReader for OsFileReader {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

type SiteKey = (PathBuf, String);

/// GeoSite lookup with per-path and per-record caching
pub struct GeoSiteStore {
    reader: Arc<dyn FileReader>,
    files: DashMap<PathBuf, Bytes>,
    /// `None` when record caching is disabled
    sites: Option<Mutex<LruCache<SiteKey, Arc<[Domain]>>>>,
    generation: AtomicU64,
}

impl GeoSiteStore {
    /// Store reading from disk with the default cache size
    pub fn new() -> Self {
        Self::with_reader(Arc::new(OsFileReader), DEFAULT_SITE_CACHE_SIZE)
    }

    /// Store with a custom reader; `cache_size == 0` disables record caching
    pub fn with_reader(reader: Arc<dyn FileReader>, cache_size: usize) -> Self {
        GeoSiteStore {
            reader,
            files: DashMap::new(),
            sites: NonZeroUsize::new(cache_size).map(|n| Mutex::new(LruCache::new(n))),
            generation: AtomicU64::new(0),
        }
    }

    /// Bumped on every reload; lets dependents drop derived state
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Raw bytes of a database file
    pub fn read_database(&self, path: &Path) -> Result<Bytes> {
        if let Some(bytes) = self.files.get(path) {
            return Ok(bytes.clone());
        }

        let generation = self.generation();
        let bytes = self.read_uncached(path)?;
        debug!("Loaded GeoSite database {} ({} bytes)", path.display(), bytes.len());

        // Reloads bump the generation before clearing, so a stale read is never published
        if let Entry::Vacant(entry) = self.files.entry(path.to_path_buf()) {
            if self.generation() == generation {
                entry.insert(bytes.clone());
            }
        }
        Ok(bytes)
    }

    fn read_uncached(&self, path: &Path) -> Result<Bytes> {
        let read_error = |source| Error::FileRead {
            path: path.display().to_string(),
            source,
        };

        let mut reader = self.reader.open(path).map_err(read_error)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(read_error)?;

        if buf.is_empty() {
            return Err(Error::EmptyFile(path.display().to_string()));
        }
        Ok(Bytes::from(buf))
    }

    /// All domains of one country or category
    pub fn lookup_country(&self, path: &Path, code: &str) -> Result<Arc<[Domain]>> {
        let key: SiteKey = (path.to_path_buf(), code.to_uppercase());

        if let Some(sites) = &self.sites {
            if let Some(domains) = sites.lock().get(&key) {
                return Ok(domains.clone());
            }
        }

        let generation = self.generation();
        let data = self.read_database(path)?;
        let body = find_record(&data, key.1.as_bytes()).ok_or_else(|| Error::RecordNotFound {
            file: path.display().to_string(),
            code: key.1.clone(),
        })?;

        let site = GeoSite::decode(body).map_err(|e| Error::Decode {
            file: path.display().to_string(),
            code: key.1.clone(),
            reason: e.to_string(),
        })?;
        debug!("Decoded GeoSite {} with {} domains", key.1, site.domain.len());

        let domains: Arc<[Domain]> = site.domain.into();
        if let Some(sites) = &self.sites {
            let mut sites = sites.lock();
            if self.generation() == generation {
                sites.put(key, domains.clone());
            }
        }
        Ok(domains)
    }

    /// Lookup by `CODE@attr1@attr2` token
    ///
    /// Attributes are AND-combined; without any the full list is returned.
    pub fn lookup_with_attributes(&self, path: &Path, token: &str) -> Result<Arc<[Domain]>> {
        let mut parts = token.split('@');
        let code = parts.next().unwrap_or_default();
        if code.is_empty() {
            return Err(Error::RecordNotFound {
                file: path.display().to_string(),
                code: token.to_string(),
            });
        }

        let filter = AttributeFilter::parse(parts);
        let domains = self.lookup_country(path, code)?;
        if filter.is_empty() {
            return Ok(domains);
        }

        Ok(filter.apply(&domains).into())
    }

    /// Codes of every record in the file, in file order
    pub fn codes(&self, path: &Path) -> Result<Vec<String>> {
        let data = self.read_database(path)?;
        Ok(record_keys(&data)
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .collect())
    }

    /// Forget one database file and every record decoded from it
    pub fn invalidate(&self, path: &Path) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.files.remove(path);
        if let Some(sites) = &self.sites {
            let mut sites = sites.lock();
            let stale: Vec<SiteKey> = sites
                .iter()
                .filter(|(key, _)| key.0 == path)
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                sites.pop(&key);
            }
        }
    }

    /// Drop all cached files and records
    pub fn reload(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.files.clear();
        if let Some(sites) = &self.sites {
            sites.lock().clear();
        }
        info!("GeoSite caches cleared (generation {})", generation);
    }

    /// Number of decoded records currently cached
    pub fn cached_records(&self) -> usize {
        self.sites.as_ref().map(|sites| sites.lock().len()).unwrap_or(0)
    }
}

impl Default for GeoSiteStore {
    fn default() -> Self {
        Self::new()
    }
}
