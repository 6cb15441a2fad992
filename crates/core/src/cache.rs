// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/cache.rs
//
// On-disk macrobatch cache keyed by manifest identity and version.
//
// Layout under the cache root:
//
//   loader_<cache_id>/cache.json            marker: key the directory was built for
//   loader_<cache_id>/macrobatch_000000.mbf batch files, one per macrobatch
//
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use mbcache_formats::{
    BatchFileReader, BatchFileWriter, BatchSummary, TypeTag, BATCH_FILE_EXTENSION,
};
use mbcache_storage::{PosixBackend, StorageBackend};

use crate::error::CacheError;
use crate::manifest::{CacheKey, Manifest, ManifestRow};

pub const CACHE_MARKER: &str = "cache.json";

fn io_err(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> CacheError {
    let path = path.into();
    move |source| CacheError::Io { path, source }
}

/// Contents of `cache.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMarker {
    pub cache_id: String,
    pub version: String,
    pub source: String,
    pub type_tag: String,
    pub macrobatch_size: usize,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
    pub mbcache_version: String,
}

pub struct MacrobatchCache {
    store: PosixBackend,
    key: CacheKey,
    source: String,
    tag: TypeTag,
    macrobatch_size: usize,
    item_count: usize,
}

impl std::fmt::Debug for MacrobatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacrobatchCache")
            .field("dir", &self.store.root())
            .field("key", &self.key)
            .field("macrobatch_size", &self.macrobatch_size)
            .field("item_count", &self.item_count)
            .finish()
    }
}

impl MacrobatchCache {
    /// Bind the cache directory for `manifest` under `cache_root`. Nothing is
    /// written until [`MacrobatchCache::prepare`].
    pub fn open<P: AsRef<Path>>(
        cache_root: P,
        manifest: &Manifest,
        macrobatch_size: usize,
        tag: TypeTag,
    ) -> Result<Self, CacheError> {
        if macrobatch_size == 0 {
            return Err(CacheError::InvalidMacrobatchSize);
        }
        if !manifest.is_empty() && manifest.nelements() != 2 {
            return Err(CacheError::UnsupportedArity(manifest.nelements()));
        }
        let key = manifest.cache_key();
        let dir = cache_root.as_ref().join(format!("loader_{}", key.id));
        Ok(Self {
            store: PosixBackend::new(dir),
            key,
            source: manifest.source().to_string(),
            tag,
            macrobatch_size,
            item_count: manifest.len(),
        })
    }

    pub fn dir(&self) -> &Path {
        self.store.root()
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn macrobatch_size(&self) -> usize {
        self.macrobatch_size
    }

    pub fn macrobatch_count(&self) -> usize {
        self.item_count.div_ceil(self.macrobatch_size)
    }

    fn macrobatch_key(index: usize) -> String {
        format!("macrobatch_{index:06}.{BATCH_FILE_EXTENSION}")
    }

    pub fn macrobatch_path(&self, index: usize) -> PathBuf {
        self.store.path_for(&Self::macrobatch_key(index))
    }

    pub fn read_marker(&self) -> Result<Option<CacheMarker>, CacheError> {
        if !self.store.exists(CACHE_MARKER) {
            return Ok(None);
        }
        let raw = self
            .store
            .get(CACHE_MARKER)
            .map_err(io_err(self.store.path_for(CACHE_MARKER)))?;
        match serde_json::from_slice(&raw) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!(dir = %self.dir().display(), error = %e, "unreadable cache marker");
                Ok(None)
            }
        }
    }

    /// A directory is valid when its marker names the same identity,
    /// version and batching as the current manifest.
    pub fn is_valid(&self) -> Result<bool, CacheError> {
        Ok(self.read_marker()?.is_some_and(|m| self.matches(&m)))
    }

    fn matches(&self, marker: &CacheMarker) -> bool {
        marker.cache_id == self.key.id
            && marker.version == self.key.version
            && marker.macrobatch_size == self.macrobatch_size
            && marker.item_count == self.item_count
            && marker.type_tag == self.tag.as_str()
    }

    /// Make the directory match the current manifest. Returns `true` when
    /// the existing contents were already valid; otherwise every cached
    /// batch file is removed and a fresh marker written.
    pub fn prepare(&self) -> Result<bool, CacheError> {
        if let Some(marker) = self.read_marker()? {
            if self.matches(&marker) {
                info!(dir = %self.dir().display(), key = %self.key, "macrobatch cache hit");
                return Ok(true);
            }
            warn!(
                dir = %self.dir().display(),
                cached = %marker.version,
                current = %self.key.version,
                "stale macrobatch cache, regenerating"
            );
        } else {
            info!(dir = %self.dir().display(), key = %self.key, "macrobatch cache miss");
        }

        self.clear()?;
        let marker = CacheMarker {
            cache_id: self.key.id.clone(),
            version: self.key.version.clone(),
            source: self.source.clone(),
            type_tag: self.tag.as_str().to_string(),
            macrobatch_size: self.macrobatch_size,
            item_count: self.item_count,
            created_at: Utc::now(),
            mbcache_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let raw = serde_json::to_vec_pretty(&marker)?;
        self.store
            .put(CACHE_MARKER, &raw)
            .map_err(io_err(self.store.path_for(CACHE_MARKER)))?;
        Ok(false)
    }

    /// Delete every batch file in the cache directory.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let names = self
            .store
            .list("")
            .map_err(io_err(self.dir().to_path_buf()))?;
        let suffix = format!(".{BATCH_FILE_EXTENSION}");
        let mut removed = 0;
        for name in names.iter().filter(|n| n.ends_with(&suffix)) {
            self.store
                .delete(name)
                .map_err(io_err(self.store.path_for(name)))?;
            removed += 1;
        }
        if removed > 0 {
            debug!(dir = %self.dir().display(), removed, "cleared cached macrobatches");
        }
        Ok(removed)
    }

    fn check_manifest(&self, manifest: &Manifest) -> Result<(), CacheError> {
        let key = manifest.cache_key();
        if key != self.key {
            return Err(CacheError::KeyMismatch {
                expected: self.key.to_string(),
                actual: key.to_string(),
            });
        }
        Ok(())
    }

    fn check_valid(&self) -> Result<(), CacheError> {
        if !self.is_valid()? {
            return Err(CacheError::Stale {
                dir: self.dir().to_path_buf(),
                key: self.key.to_string(),
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), CacheError> {
        let count = self.macrobatch_count();
        if index >= count {
            return Err(CacheError::MacrobatchOutOfRange { index, count });
        }
        Ok(())
    }

    fn rows_for<'m>(&self, rows: &'m [ManifestRow], index: usize) -> &'m [ManifestRow] {
        let start = index * self.macrobatch_size;
        let end = (start + self.macrobatch_size).min(rows.len());
        &rows[start..end]
    }

    /// Reader for macrobatch `index`, regenerating the file when it is
    /// missing or unreadable. Fails with [`CacheError::Stale`] unless the
    /// directory marker matches the bound key.
    pub fn load(&self, index: usize, manifest: &Manifest) -> Result<BatchFileReader, CacheError> {
        self.check_manifest(manifest)?;
        self.check_index(index)?;
        self.check_valid()?;

        let path = self.macrobatch_path(index);
        if path.is_file() {
            match BatchFileReader::open(&path) {
                Ok(reader) => {
                    debug!(index, path = %path.display(), "loaded cached macrobatch");
                    return Ok(reader);
                }
                Err(e) if e.is_container_format() => {
                    warn!(index, error = %e, "cached macrobatch unreadable, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.build_rows(index, manifest.rows())?;
        Ok(BatchFileReader::open(&path)?)
    }

    /// Write macrobatch `index` from the manifest rows it covers.
    pub fn build(&self, index: usize, manifest: &Manifest) -> Result<BatchSummary, CacheError> {
        self.check_manifest(manifest)?;
        self.check_index(index)?;
        self.check_valid()?;
        self.build_rows(index, manifest.rows())
    }

    fn build_rows(&self, index: usize, rows: &[ManifestRow]) -> Result<BatchSummary, CacheError> {
        let key = Self::macrobatch_key(index);
        let staged = self
            .store
            .stage(&key)
            .map_err(io_err(self.store.path_for(&key)))?;

        let mut writer = BatchFileWriter::create(staged.path(), self.tag)?;
        for row in self.rows_for(rows, index) {
            let data = fs::read(&row[0]).map_err(io_err(&row[0]))?;
            let target = fs::read(&row[1]).map_err(io_err(&row[1]))?;
            writer.write_item(&data, &target)?;
        }
        let mut summary = writer.finish()?;

        summary.path = staged
            .commit()
            .map_err(io_err(self.store.path_for(&key)))?;
        info!(
            index,
            items = summary.stats.item_count,
            max_datum = summary.stats.max_datum_size,
            "generated macrobatch"
        );
        Ok(summary)
    }

    /// Regenerate every macrobatch that is missing or unreadable, in
    /// parallel. Returns how many were written.
    pub fn build_all(&self, manifest: &Manifest) -> Result<usize, CacheError> {
        self.check_manifest(manifest)?;
        self.check_valid()?;
        let rows = manifest.rows();

        let built = (0..self.macrobatch_count())
            .into_par_iter()
            .map(|index| {
                let path = self.macrobatch_path(index);
                if path.is_file() && BatchFileReader::open(&path).is_ok() {
                    return Ok(false);
                }
                self.build_rows(index, rows).map(|_| true)
            })
            .collect::<Result<Vec<bool>, CacheError>>()?;

        Ok(built.into_iter().filter(|b| *b).count())
    }
}
