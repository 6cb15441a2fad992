// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Core library for mbcache ─ manifest ingestion, cache identity and the
//! macrobatch cache that feeds a sequential loader.

pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod handle;
pub mod loader;
pub mod manifest;
pub mod media;

pub use cache::{CacheMarker, MacrobatchCache, CACHE_MARKER};
pub use checksum::{Crc32Digest, Crc32Engine};
pub use config::{LoaderConfig, DEFAULT_MACROBATCH_SIZE};
pub use error::{CacheError, ConfigError, HandleError, LoaderError, ManifestError, MediaError};
pub use handle::{LoaderEngine, LoaderHandle, LoaderRegistry};
pub use loader::{Macrobatch, MacrobatchLoader};
pub use manifest::{CacheKey, Manifest, ManifestRow, MANIFEST_SHUFFLE_SEED};
pub use media::{BoundingBox, BoundingBoxes, BoxList, BoxSettings, ClassLabel, MediaCodec};
