// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/error.rs
//
use std::path::PathBuf;
use thiserror::Error;

use mbcache_formats::FormatError;

/// Errors raised while loading or reshaping a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest source could not be opened or read.
    #[error("failed to read manifest {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// A row's field count differs from the first row's.
    #[error(
        "at line: {line}, manifest file has a line with differing number of files ({found}) vs ({expected}): {}",
        .fields.join(" ")
    )]
    Format {
        line: usize,
        found: usize,
        expected: usize,
        fields: Vec<String>,
    },

    #[error("subset fraction {0} is outside (0, 1]")]
    InvalidFraction(f64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors raised by the macrobatch cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cache marker: {0}")]
    Marker(#[from] serde_json::Error),

    /// Cached items are (data, target) pairs, so rows need exactly two fields.
    #[error("manifest rows have {0} fields; macrobatch items need exactly 2 (data, target)")]
    UnsupportedArity(usize),

    #[error("macrobatch size must be greater than 0")]
    InvalidMacrobatchSize,

    #[error("macrobatch {index} out of range ({count} macrobatches)")]
    MacrobatchOutOfRange { index: usize, count: usize },

    /// The directory's marker does not name the bound key; run `prepare` first.
    #[error("cache directory {} is not prepared for {key}", .dir.display())]
    Stale { dir: PathBuf, key: String },

    #[error("cache directory was built for {expected}, manifest is {actual}")]
    KeyMismatch { expected: String, actual: String },
}

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("no live loader for handle {0}")]
    Unknown(u64),

    #[error("loader {handle} failed: {source}")]
    Engine {
        handle: u64,
        #[source]
        source: LoaderError,
    },
}

/// Errors from the sequential macrobatch loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("loader has been stopped")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("class label target must be 4 bytes, got {0}")]
    BadLabelLength(usize),

    #[error("invalid bounding box JSON: {0}")]
    BadBoxes(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_names_line_and_counts() {
        let err = ManifestError::Format {
            line: 3,
            found: 1,
            expected: 2,
            fields: vec!["/data/img/c.jpg".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("at line: 3"), "{msg}");
        assert!(msg.contains("(1) vs (2)"), "{msg}");
        assert!(msg.contains("/data/img/c.jpg"), "{msg}");
    }
}
