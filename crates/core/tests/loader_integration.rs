// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end: manifest on disk -> cache directory -> loader epochs.

use std::fs;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::{tempdir, TempDir};

use mbcache_core::{
    ClassLabel, LoaderConfig, LoaderEngine, LoaderRegistry, MacrobatchLoader, Manifest,
    MediaCodec, CACHE_MARKER,
};
use mbcache_formats::read_max_item;

fn write_dataset(n: usize, rng: &mut ChaCha8Rng) -> (TempDir, Vec<usize>) {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("img")).unwrap();
    fs::create_dir_all(dir.path().join("lbl")).unwrap();
    let mut sizes = Vec::with_capacity(n);
    let mut text = String::new();
    for i in 0..n {
        let size = rng.random_range(1..=512);
        fs::write(dir.path().join(format!("img/{i}.raw")), vec![(i % 251) as u8; size]).unwrap();
        fs::write(dir.path().join(format!("lbl/{i}.bin")), (i as u32).to_le_bytes()).unwrap();
        text.push_str(&format!("img/{i}.raw,lbl/{i}.bin\n"));
        sizes.push(size);
    }
    fs::write(dir.path().join("train.csv"), text).unwrap();
    (dir, sizes)
}

fn loader_config(data: &Path, cache: &Path, macrobatch_size: usize) -> LoaderConfig {
    let mut cfg = LoaderConfig::new(data.join("train.csv"), cache);
    cfg.root = Some(data.to_string_lossy().into_owned());
    cfg.macrobatch_size = macrobatch_size;
    cfg
}

#[test]
fn one_epoch_serves_every_item_in_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..4 {
        let n = rng.random_range(1..60);
        let macrobatch_size = rng.random_range(1..16);
        let (data, sizes) = write_dataset(n, &mut rng);
        let cache = tempdir().unwrap();

        let mut loader =
            MacrobatchLoader::start(&loader_config(data.path(), cache.path(), macrobatch_size))
                .unwrap();
        assert_eq!(loader.macrobatch_count(), n.div_ceil(macrobatch_size));
        let overall_max = sizes.iter().copied().max().unwrap() as u32;
        assert_eq!(loader.max_datum_size(), overall_max);

        let mut labels = Vec::new();
        for expected_index in 0..loader.macrobatch_count() {
            let mut batch = loader.next().unwrap();
            assert_eq!(batch.index, expected_index);
            assert_eq!(batch.epoch, 0);

            let start = expected_index * macrobatch_size;
            let end = (start + macrobatch_size).min(n);
            let want_max = sizes[start..end].iter().copied().max().unwrap() as u32;
            assert_eq!(batch.reader.max_datum_size(), want_max);
            assert_eq!(read_max_item(batch.reader.path()).unwrap(), want_max);

            for item in batch.reader.items() {
                let item = item.unwrap();
                labels.push(ClassLabel.extract(&item.target).unwrap() as usize);
            }
        }
        assert_eq!(labels, (0..n).collect::<Vec<_>>(), "n={n} size={macrobatch_size}");
        assert_eq!(loader.epoch(), 1);
    }
}

#[test]
fn subset_sizes_round_to_nearest() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let (data, _) = write_dataset(37, &mut rng);
    let cache = tempdir().unwrap();

    for percent in [1u32, 10, 33, 50, 99, 100] {
        let mut cfg = loader_config(data.path(), cache.path(), 8);
        cfg.subset_percent = percent;
        cfg.subset_seed = u64::from(percent);
        let loader = MacrobatchLoader::start(&cfg).unwrap();
        let want = (37.0 * f64::from(percent) / 100.0).round() as usize;
        assert_eq!(loader.item_count(), want, "percent={percent}");
    }
}

#[test]
fn edited_manifest_invalidates_the_directory() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let (data, _) = write_dataset(6, &mut rng);
    let cache = tempdir().unwrap();
    let cfg = loader_config(data.path(), cache.path(), 4);

    let first = MacrobatchLoader::start(&cfg).unwrap();
    first.warm().unwrap();
    let dir = first.cache().dir().to_path_buf();
    let old_version = first.cache().key().version.clone();
    assert!(dir.join(CACHE_MARKER).is_file());

    // Drop the last row.
    let text = fs::read_to_string(data.path().join("train.csv")).unwrap();
    let kept: Vec<&str> = text.lines().take(5).collect();
    fs::write(data.path().join("train.csv"), kept.join("\n")).unwrap();

    let second = MacrobatchLoader::start(&cfg).unwrap();
    assert!(!second.cache_hit());
    assert_eq!(second.cache().dir(), dir);
    assert_ne!(second.cache().key().version, old_version);
    assert_eq!(second.item_count(), 5);
    assert_eq!(second.built_at_start(), 2);
    assert_eq!(second.warm().unwrap(), 0);
}

#[test]
fn loaders_share_nothing_through_the_registry() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let (data, _) = write_dataset(4, &mut rng);
    let cache = tempdir().unwrap();

    let mut registry = LoaderRegistry::new();
    let a = registry.start(MacrobatchLoader::start(&loader_config(data.path(), cache.path(), 2)).unwrap());
    let b = registry.start(MacrobatchLoader::start(&loader_config(data.path(), cache.path(), 2)).unwrap());

    assert_eq!(registry.next(a).unwrap().index, 0);
    assert_eq!(registry.next(a).unwrap().index, 1);
    assert_eq!(registry.next(b).unwrap().index, 0);
    registry.stop(a).unwrap();
    assert!(registry.next(a).is_err());
    assert_eq!(registry.next(b).unwrap().index, 1);
}

#[test]
fn manifest_identity_ignores_row_content() {
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let (data, _) = write_dataset(3, &mut rng);
    let path = data.path().join("train.csv");
    let a = Manifest::open(&path, "").unwrap();
    let b = Manifest::open(&path, "/elsewhere").unwrap();
    assert_eq!(a.cache_id(), b.cache_id());
    assert_ne!(a.version(), b.version());
}
