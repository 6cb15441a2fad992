// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/checksum.rs
//
use std::fmt;

/// Streaming CRC-32 (IEEE) accumulator.
///
/// `finalize` consumes the engine, so no bytes can be folded in after the
/// digest has been taken; call [`Crc32Engine::reset`] to start over instead.
#[derive(Clone, Default)]
pub struct Crc32Engine {
    hasher: crc32fast::Hasher,
    bytes: u64,
}

impl Crc32Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.bytes += bytes.len() as u64;
    }

    /// Number of bytes folded in so far.
    pub fn bytes_processed(&self) -> u64 {
        self.bytes
    }

    pub fn reset(&mut self) {
        self.hasher.reset();
        self.bytes = 0;
    }

    pub fn finalize(self) -> Crc32Digest {
        Crc32Digest(self.hasher.finalize())
    }
}

impl fmt::Debug for Crc32Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc32Engine")
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Final CRC value. Displays as 8 lowercase, zero-padded hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crc32Digest(u32);

impl Crc32Digest {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Crc32Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
