// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/media.rs
//
// Target-side codecs for cached items. Each record schema gets one codec
// that decodes the raw target blob and applies per-item settings.
//
use serde::{Deserialize, Serialize};

use mbcache_formats::TypeTag;

use crate::error::MediaError;

pub trait MediaCodec {
    type Decoded;
    type Settings;

    /// Record schema this codec understands.
    fn type_tag(&self) -> TypeTag;

    fn extract(&self, bytes: &[u8]) -> Result<Self::Decoded, MediaError>;

    fn transform(&self, settings: &Self::Settings, decoded: Self::Decoded) -> Self::Decoded;
}

/// `imgclass` targets: a 4-byte little-endian class index.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassLabel;

impl MediaCodec for ClassLabel {
    type Decoded = u32;
    type Settings = ();

    fn type_tag(&self) -> TypeTag {
        TypeTag::ImageClass
    }

    fn extract(&self, bytes: &[u8]) -> Result<u32, MediaError> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| MediaError::BadLabelLength(bytes.len()))?;
        Ok(u32::from_le_bytes(raw))
    }

    fn transform(&self, _settings: &(), label: u32) -> u32 {
        label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub label: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxList {
    #[serde(default)]
    pub boxes: Vec<BoundingBox>,
}

/// Geometry applied to boxes when their image is resized or mirrored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSettings {
    pub scale: f32,
    /// Mirror horizontally inside an image of this (post-scale) width.
    pub flip_width: Option<i32>,
}

impl Default for BoxSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            flip_width: None,
        }
    }
}

/// `bbox` targets: JSON `{"boxes": [{"x","y","w","h","label"}, ...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxes;

impl BoundingBoxes {
    pub fn encode(&self, boxes: &BoxList) -> Result<Vec<u8>, MediaError> {
        Ok(serde_json::to_vec(boxes)?)
    }
}

impl MediaCodec for BoundingBoxes {
    type Decoded = BoxList;
    type Settings = BoxSettings;

    fn type_tag(&self) -> TypeTag {
        TypeTag::BoundingBox
    }

    fn extract(&self, bytes: &[u8]) -> Result<BoxList, MediaError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn transform(&self, settings: &BoxSettings, mut decoded: BoxList) -> BoxList {
        let scale = |v: i32| (v as f32 * settings.scale).round() as i32;
        for b in &mut decoded.boxes {
            if settings.scale != 1.0 {
                b.x = scale(b.x);
                b.y = scale(b.y);
                b.w = scale(b.w);
                b.h = scale(b.h);
            }
            if let Some(width) = settings.flip_width {
                b.x = width - b.x - b.w;
            }
        }
        decoded
    }
}
