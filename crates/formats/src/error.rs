// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/error.rs
//
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the batch container codec.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file could not be created, opened, read or written.
    #[error("I/O error on batch file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The header does not carry the container magic.
    #[error("{path} is not a batch file (bad magic)")]
    BadMagic { path: PathBuf },

    /// The type tag is not one of the known record schemas.
    #[error("unrecognized batch file type tag {tag:?}")]
    UnknownTypeTag { tag: String },

    #[error("unsupported batch file version {version} in {path}")]
    UnsupportedVersion { path: PathBuf, version: u16 },

    /// The writer never finished the file.
    #[error("batch file {path} was never sealed by its writer")]
    Unsealed { path: PathBuf },

    /// The file ends in the middle of the header or of a record.
    #[error("batch file {path} is truncated: {detail}")]
    Truncated { path: PathBuf, detail: String },

    /// Record framing or header statistics are inconsistent.
    #[error("batch file {path} is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// A blob does not fit the 32-bit length field.
    #[error("item blob of {len} bytes exceeds the 4 GiB record limit")]
    ItemTooLarge { len: usize },

    /// A batch file holds at most `u32::MAX` records.
    #[error("batch file {path} already holds the maximum number of items")]
    TooManyItems { path: PathBuf },

    #[error("item index {index} out of range for {count} items")]
    IndexOutOfRange { index: usize, count: usize },
}

impl FormatError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FormatError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that describe the file contents rather than the
    /// ability to reach the file.
    pub fn is_container_format(&self) -> bool {
        !matches!(
            self,
            FormatError::Io { .. }
                | FormatError::ItemTooLarge { .. }
                | FormatError::TooManyItems { .. }
                | FormatError::IndexOutOfRange { .. }
        )
    }
}

pub type FormatResult<T> = std::result::Result<T, FormatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_errors_are_distinguishable_from_io() {
        let io = FormatError::io(
            "/tmp/missing.mbf",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(!io.is_container_format());

        let corrupt = FormatError::Corrupt {
            path: "/tmp/x.mbf".into(),
            detail: "bad length".to_string(),
        };
        assert!(corrupt.is_container_format());
        assert!(format!("{corrupt}").contains("bad length"));
    }
}
