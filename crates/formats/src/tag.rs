// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/tag.rs
//
use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

/// Width of the type tag field at the start of every batch file.
pub const TAG_LEN: usize = 8;

/// Record schema stored in a batch file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Encoded image plus a 4-byte class label.
    ImageClass,
    /// Encoded image plus a JSON list of bounding boxes.
    BoundingBox,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::ImageClass => "imgclass",
            TypeTag::BoundingBox => "bbox",
        }
    }

    /// All schemas a reader will accept.
    pub fn all() -> &'static [TypeTag] {
        &[TypeTag::ImageClass, TypeTag::BoundingBox]
    }

    pub(crate) fn to_bytes(self) -> [u8; TAG_LEN] {
        let mut out = [0u8; TAG_LEN];
        let raw = self.as_str().as_bytes();
        out[..raw.len()].copy_from_slice(raw);
        out
    }

    pub(crate) fn from_bytes(raw: &[u8; TAG_LEN]) -> Result<Self, FormatError> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(TAG_LEN);
        let text = String::from_utf8_lossy(&raw[..end]);
        text.parse()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FormatError::UnknownTypeTag { tag: s.to_string() })
    }
}
