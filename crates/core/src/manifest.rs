// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/manifest.rs
//
// CSV manifest: one example per line, comma separated file references.
//
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::checksum::{Crc32Digest, Crc32Engine};
use crate::error::ManifestError;

/// Seed used whenever a manifest is shuffled for caching. Shuffled order
/// feeds the version digest, so it must never vary between runs.
pub const MANIFEST_SHUFFLE_SEED: u64 = 0;

/// Resolved file references of one example.
pub type ManifestRow = Vec<String>;

/// Identity plus content version of a manifest. A cached macrobatch is
/// valid only when both halves match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub id: String,
    pub version: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    source: String,
    rows: Vec<ManifestRow>,
    cache_id: OnceCell<String>,
    version: OnceCell<String>,
}

impl Manifest {
    /// Parse the manifest file at `path`, resolving fields against `root`
    /// when it is non-empty.
    pub fn open<P: AsRef<Path>>(path: P, root: &str) -> Result<Self, ManifestError> {
        let source = path.as_ref().to_string_lossy().into_owned();
        let file = File::open(path.as_ref()).map_err(|e| ManifestError::Io {
            source_name: source.clone(),
            source: e,
        })?;
        Self::from_reader(BufReader::new(file), source, root)
    }

    /// Parse manifest text from any buffered reader. `source` names the
    /// manifest and is what [`Manifest::cache_id`] is derived from.
    ///
    /// An empty stream (or one with only comments and blank lines) yields a
    /// valid zero-row manifest; only read failures are [`ManifestError::Io`].
    pub fn from_reader<R: BufRead>(
        reader: R,
        source: impl Into<String>,
        root: &str,
    ) -> Result<Self, ManifestError> {
        let source = source.into();
        let mut rows: Vec<ManifestRow> = Vec::new();
        let mut expected = 0;

        for raw in reader.lines() {
            let raw = raw.map_err(|e| ManifestError::Io {
                source_name: source.clone(),
                source: e,
            })?;
            let line = raw.strip_suffix('\r').unwrap_or(&raw);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: ManifestRow = line.split(',').map(|f| resolve(root, f)).collect();
            if rows.is_empty() {
                expected = fields.len();
            }
            if fields.len() != expected {
                return Err(ManifestError::Format {
                    line: rows.len(),
                    found: fields.len(),
                    expected,
                    fields,
                });
            }
            rows.push(fields);
        }

        debug!(source = %source, rows = rows.len(), fields = expected, "parsed manifest");
        Ok(Self {
            source,
            rows,
            cache_id: OnceCell::new(),
            version: OnceCell::new(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Field count per row (0 for an empty manifest).
    pub fn nelements(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Permute rows with a generator seeded from `seed`.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.rows.shuffle(&mut rng);
        self.version.take();
    }

    /// Keep exactly `round(fraction * len)` rows, in their current order.
    ///
    /// Each row is kept with probability `fraction`, except that once the
    /// rows still to be visited equal the rows still needed, every remaining
    /// row is taken. Later rows are therefore slightly favoured; this is an
    /// approximation of a uniform sample, not an exact one.
    pub fn subset(&mut self, fraction: f64, seed: u64) -> Result<(), ManifestError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ManifestError::InvalidFraction(fraction));
        }
        if fraction == 1.0 {
            return Ok(());
        }

        let total = self.rows.len();
        let target = (fraction * total as f64).round() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut needed = target;
        let mut kept = Vec::with_capacity(target);

        for (i, row) in std::mem::take(&mut self.rows).into_iter().enumerate() {
            if needed == 0 {
                break;
            }
            let remaining = total - i;
            if needed == remaining || rng.random_bool(fraction) {
                kept.push(row);
                needed -= 1;
            }
        }

        self.rows = kept;
        self.version.take();
        debug!(source = %self.source, total, kept = self.rows.len(), fraction, "subset manifest");
        Ok(())
    }

    /// 16 hex digits derived from the source path only.
    pub fn cache_id(&self) -> &str {
        self.cache_id.get_or_init(|| {
            let hash = blake3::hash(self.source.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&hash.as_bytes()[..8]);
            format!("{:016x}", u64::from_be_bytes(head))
        })
    }

    /// 8 hex digits of CRC over every resolved field, in row order.
    pub fn version(&self) -> &str {
        self.version.get_or_init(|| self.checksum().to_string())
    }

    pub fn checksum(&self) -> Crc32Digest {
        let mut crc = Crc32Engine::new();
        for row in &self.rows {
            for field in row {
                crc.update(field.as_bytes());
            }
        }
        crc.finalize()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            id: self.cache_id().to_string(),
            version: self.version().to_string(),
        }
    }

    /// Resolved rows as manifest text.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestRow;
    type IntoIter = std::slice::Iter<'a, ManifestRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn resolve(root: &str, field: &str) -> String {
    if root.is_empty() {
        field.to_string()
    } else {
        Path::new(root).join(field).to_string_lossy().into_owned()
    }
}
