// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/lib.rs
//
pub mod batchfile;
pub mod bulk;
pub mod error;
pub mod tag;

pub use batchfile::{
    read_max_item, BatchFileReader, BatchFileWriter, BatchStats, BatchSummary, Item, Items,
};
pub use bulk::{write_files, write_raw};
pub use error::{FormatError, FormatResult};
pub use tag::TypeTag;

/// File extension used for batch files in a cache directory.
pub const BATCH_FILE_EXTENSION: &str = "mbf";
