// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/loader.rs
//
// Sequential macrobatch loader: manifest -> (shuffle, subset) -> cache,
// then hands out cached containers in order, wrapping at the end of
// each epoch.
//
use tracing::{debug, info};

use mbcache_formats::{read_max_item, BatchFileReader};

use crate::cache::MacrobatchCache;
use crate::config::LoaderConfig;
use crate::error::{CacheError, LoaderError};
use crate::handle::LoaderEngine;
use crate::manifest::{Manifest, MANIFEST_SHUFFLE_SEED};

/// One cached container handed out by [`MacrobatchLoader::next`].
#[derive(Debug)]
pub struct Macrobatch {
    pub index: usize,
    /// Epoch this macrobatch belongs to, starting at 0.
    pub epoch: u64,
    pub reader: BatchFileReader,
}

impl Macrobatch {
    pub fn len(&self) -> usize {
        self.reader.item_count()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.item_count() == 0
    }
}

#[derive(Debug)]
pub struct MacrobatchLoader {
    config: LoaderConfig,
    manifest: Manifest,
    cache: MacrobatchCache,
    cache_hit: bool,
    built_at_start: usize,
    max_datum_size: u32,
    position: usize,
    epoch: u64,
    stopped: bool,
}

impl MacrobatchLoader {
    /// Load the manifest, apply the configured shuffle and subset, bind the
    /// cache directory for the result and build every missing macrobatch.
    pub fn start(config: &LoaderConfig) -> Result<Self, LoaderError> {
        config.validate()?;

        let mut manifest = Manifest::open(&config.manifest, config.root_str())?;
        if config.shuffle_manifest {
            manifest.shuffle(MANIFEST_SHUFFLE_SEED);
        }
        manifest.subset(config.subset_fraction(), config.subset_seed)?;

        let cache = MacrobatchCache::open(
            &config.cache_dir,
            &manifest,
            config.macrobatch_size,
            config.tag()?,
        )?;
        let cache_hit = cache.prepare()?;

        let built_at_start = cache.build_all(&manifest)?;

        // Header read only; every file was just validated by build_all.
        let mut max_datum_size = 0;
        for index in 0..cache.macrobatch_count() {
            let size = read_max_item(cache.macrobatch_path(index)).map_err(CacheError::from)?;
            max_datum_size = max_datum_size.max(size);
        }

        info!(
            manifest = %manifest.source(),
            items = manifest.len(),
            macrobatches = cache.macrobatch_count(),
            key = %cache.key(),
            cache_hit,
            built = built_at_start,
            max_datum_size,
            "loader started"
        );

        Ok(Self {
            config: config.clone(),
            manifest,
            cache,
            cache_hit,
            built_at_start,
            max_datum_size,
            position: 0,
            epoch: 0,
            stopped: false,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn cache(&self) -> &MacrobatchCache {
        &self.cache
    }

    /// Whether the cache directory was already valid at start.
    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    pub fn item_count(&self) -> usize {
        self.manifest.len()
    }

    pub fn macrobatch_count(&self) -> usize {
        self.cache.macrobatch_count()
    }

    /// Macrobatches written by [`MacrobatchLoader::start`].
    pub fn built_at_start(&self) -> usize {
        self.built_at_start
    }

    /// Largest data blob across every macrobatch, for sizing buffers.
    pub fn max_datum_size(&self) -> u32 {
        self.max_datum_size
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Rebuild any macrobatch that went missing since start.
    pub fn warm(&self) -> Result<usize, LoaderError> {
        Ok(self.cache.build_all(&self.manifest)?)
    }
}

impl LoaderEngine for MacrobatchLoader {
    type Output = Macrobatch;

    fn next(&mut self) -> Result<Macrobatch, LoaderError> {
        if self.stopped {
            return Err(LoaderError::Stopped);
        }
        let count = self.cache.macrobatch_count();
        if count == 0 {
            return Err(CacheError::MacrobatchOutOfRange { index: 0, count: 0 }.into());
        }

        let index = self.position;
        let epoch = self.epoch;
        let reader = self.cache.load(index, &self.manifest)?;

        self.position += 1;
        if self.position == count {
            self.position = 0;
            self.epoch += 1;
            debug!(epoch = self.epoch, "loader wrapped to next epoch");
        }
        Ok(Macrobatch {
            index,
            epoch,
            reader,
        })
    }

    /// Rewind to the first macrobatch of the current epoch.
    fn reset(&mut self) -> Result<(), LoaderError> {
        if self.stopped {
            return Err(LoaderError::Stopped);
        }
        self.position = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LoaderError> {
        if !self.stopped {
            info!(epoch = self.epoch, position = self.position, "loader stopped");
        }
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    use crate::media::{ClassLabel, MediaCodec};

    /// `n` items of `i + 1` bytes each with label `i`, manifest at `train.csv`
    /// using paths relative to the dataset root.
    fn dataset(n: usize) -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("img")).unwrap();
        fs::create_dir_all(dir.path().join("lbl")).unwrap();
        let mut text = String::from("# image,label\n");
        for i in 0..n {
            fs::write(dir.path().join(format!("img/{i}.jpg")), vec![7u8; i + 1]).unwrap();
            fs::write(dir.path().join(format!("lbl/{i}.bin")), (i as u32).to_le_bytes()).unwrap();
            text.push_str(&format!("img/{i}.jpg,lbl/{i}.bin\n"));
        }
        fs::write(dir.path().join("train.csv"), text).unwrap();
        dir
    }

    fn config(data: &Path, cache: &Path, macrobatch_size: usize) -> LoaderConfig {
        let mut cfg = LoaderConfig::new(data.join("train.csv"), cache);
        cfg.root = Some(data.to_string_lossy().into_owned());
        cfg.macrobatch_size = macrobatch_size;
        cfg
    }

    #[test]
    fn walks_macrobatches_and_wraps() {
        let data = dataset(5);
        let cache = tempdir().unwrap();
        let mut loader = MacrobatchLoader::start(&config(data.path(), cache.path(), 2)).unwrap();
        assert_eq!(loader.item_count(), 5);
        assert_eq!(loader.macrobatch_count(), 3);
        assert_eq!(loader.max_datum_size(), 5);
        assert!(!loader.cache_hit());
        assert_eq!(loader.built_at_start(), 3);

        let sizes: Vec<(usize, u64, usize)> = (0..4)
            .map(|_| {
                let mb = loader.next().unwrap();
                (mb.index, mb.epoch, mb.len())
            })
            .collect();
        assert_eq!(sizes, vec![(0, 0, 2), (1, 0, 2), (2, 0, 1), (0, 1, 2)]);
        assert_eq!(loader.epoch(), 1);
        assert_eq!(loader.position(), 1);
    }

    #[test]
    fn items_follow_manifest_order() {
        let data = dataset(4);
        let cache = tempdir().unwrap();
        let mut loader = MacrobatchLoader::start(&config(data.path(), cache.path(), 4)).unwrap();
        let mut mb = loader.next().unwrap();
        let labels: Vec<u32> = mb
            .reader
            .items()
            .map(|item| ClassLabel.extract(&item.unwrap().target).unwrap())
            .collect();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn second_start_hits_the_cache() {
        let data = dataset(3);
        let cache = tempdir().unwrap();
        let cfg = config(data.path(), cache.path(), 2);

        let first = MacrobatchLoader::start(&cfg).unwrap();
        assert_eq!(first.built_at_start(), 2);
        assert_eq!(first.warm().unwrap(), 0);
        let dir = first.cache().dir().to_path_buf();

        fs::remove_file(first.cache().macrobatch_path(1)).unwrap();
        assert_eq!(first.warm().unwrap(), 1);

        let second = MacrobatchLoader::start(&cfg).unwrap();
        assert!(second.cache_hit());
        assert_eq!(second.cache().dir(), dir);
        assert_eq!(second.built_at_start(), 0);
        assert_eq!(second.max_datum_size(), 3);
    }

    #[test]
    fn shuffle_and_subset_are_applied() {
        let data = dataset(20);
        let cache = tempdir().unwrap();
        let mut cfg = config(data.path(), cache.path(), 8);
        cfg.shuffle_manifest = true;
        cfg.subset_percent = 50;
        cfg.subset_seed = 3;

        let loader = MacrobatchLoader::start(&cfg).unwrap();
        assert_eq!(loader.item_count(), 10);
        assert_eq!(loader.macrobatch_count(), 2);

        let plain = MacrobatchLoader::start(&config(data.path(), cache.path(), 8)).unwrap();
        assert_eq!(plain.cache().key().id, loader.cache().key().id);
        assert_ne!(plain.cache().key().version, loader.cache().key().version);
    }

    #[test]
    fn reset_and_stop() {
        let data = dataset(3);
        let cache = tempdir().unwrap();
        let mut loader = MacrobatchLoader::start(&config(data.path(), cache.path(), 1)).unwrap();
        loader.next().unwrap();
        loader.next().unwrap();
        loader.reset().unwrap();
        assert_eq!(loader.next().unwrap().index, 0);

        loader.stop().unwrap();
        assert!(loader.is_stopped());
        assert!(matches!(loader.next(), Err(LoaderError::Stopped)));
        assert!(matches!(loader.reset(), Err(LoaderError::Stopped)));
    }

    #[test]
    fn empty_manifest_has_nothing_to_serve() {
        let data = tempdir().unwrap();
        fs::write(data.path().join("train.csv"), "").unwrap();
        let cache = tempdir().unwrap();
        let mut loader = MacrobatchLoader::start(&config(data.path(), cache.path(), 4)).unwrap();
        assert_eq!(loader.macrobatch_count(), 0);
        assert_eq!(loader.max_datum_size(), 0);
        assert!(matches!(
            loader.next(),
            Err(LoaderError::Cache(CacheError::MacrobatchOutOfRange { .. }))
        ));
    }

    #[test]
    fn missing_manifest_fails_to_start() {
        let cache = tempdir().unwrap();
        let cfg = LoaderConfig::new(cache.path().join("nope.csv"), cache.path());
        assert!(matches!(
            MacrobatchLoader::start(&cfg),
            Err(LoaderError::Manifest(_))
        ));
    }
}
