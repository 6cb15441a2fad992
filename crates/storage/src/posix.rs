// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/storage/src/posix.rs
//
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::StorageBackend;

pub struct PosixBackend {
    root: PathBuf,
}

impl PosixBackend {
    /// Store everything under `root` on the local filesystem.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Open a temporary file next to `key`. Nothing is visible under `key`
    /// until [`StagedFile::commit`]; dropping the stage removes the temp file.
    pub fn stage(&self, key: &str) -> io::Result<StagedFile> {
        let target = self.path_for(key);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent)?;
        let tmp = tempfile::Builder::new()
            .prefix(".staged-")
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        Ok(StagedFile { tmp, target })
    }
}

/// A write in progress that replaces its target in one rename.
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Path of the temporary file, for writers that open by path.
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn as_file_mut(&mut self) -> &mut File {
        self.tmp.as_file_mut()
    }

    /// Rename the temporary file over the target.
    pub fn commit(self) -> io::Result<PathBuf> {
        let Self { tmp, target } = self;
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!(target = %target.display(), "committed staged file");
        Ok(target)
    }
}

impl StorageBackend for PosixBackend {
    fn put(&self, key: &str, data: &[u8]) -> io::Result<()> {
        let mut staged = self.stage(key)?;
        staged.as_file_mut().write_all(data)?;
        staged.as_file_mut().sync_all()?;
        staged.commit().map(|_| ())
    }

    fn get(&self, key: &str) -> io::Result<Vec<u8>> {
        let path = self.path_for(key);
        fs::read(path)
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        let path = self.path_for(key);
        fs::remove_file(path)
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let dir = self.path_for(prefix);
        let mut names = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(dir)? {
                let f = entry?;
                if f.path().is_file() {
                    if let Some(n) = f.file_name().to_str() {
                        names.push(n.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }
}
