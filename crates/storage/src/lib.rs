// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/storage/src/lib.rs
//
pub mod posix;
pub use posix::{PosixBackend, StagedFile};

/// A simple synchronous storage interface for cache directories.
///
/// Writers never expose partially written objects: `put` lands the bytes
/// under a temporary name and renames them over `key`.
pub trait StorageBackend {
    /// Atomically write `data` under key (relative path) `key`.
    fn put(&self, key: &str, data: &[u8]) -> std::io::Result<()>;
    /// Read the entire object at `key`.
    fn get(&self, key: &str) -> std::io::Result<Vec<u8>>;
    /// Delete the object at `key`.
    fn delete(&self, key: &str) -> std::io::Result<()>;
    /// List the names (files only) under the directory `prefix`.
    fn list(&self, prefix: &str) -> std::io::Result<Vec<String>>;
    /// Whether an object exists at `key`.
    fn exists(&self, key: &str) -> bool;
}
