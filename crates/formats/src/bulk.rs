// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/bulk.rs
//
// One-shot helpers that turn in-memory buffers or on-disk file pairs into a
// finished batch file.

use std::fs;
use std::path::Path;

use crate::batchfile::{BatchFileWriter, BatchSummary};
use crate::error::{FormatError, FormatResult};
use crate::tag::TypeTag;

/// Write `(data, label)` pairs; each label is stored as a 4-byte
/// little-endian target blob.
pub fn write_raw<'a, P, I>(path: P, tag: TypeTag, items: I) -> FormatResult<BatchSummary>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (&'a [u8], u32)>,
{
    let mut writer = BatchFileWriter::create(path, tag)?;
    for (data, label) in items {
        writer.write_item(data, &label.to_le_bytes())?;
    }
    writer.finish()
}

/// Read each `(data_path, target_path)` pair from disk and store the file
/// contents as one record.
pub fn write_files<P, I, D, T>(path: P, tag: TypeTag, pairs: I) -> FormatResult<BatchSummary>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (D, T)>,
    D: AsRef<Path>,
    T: AsRef<Path>,
{
    let mut writer = BatchFileWriter::create(path, tag)?;
    for (data_path, target_path) in pairs {
        let data = fs::read(data_path.as_ref()).map_err(|e| FormatError::io(data_path.as_ref(), e))?;
        let target =
            fs::read(target_path.as_ref()).map_err(|e| FormatError::io(target_path.as_ref(), e))?;
        writer.write_item(&data, &target)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batchfile::BatchFileReader;
    use tempfile::tempdir;

    #[test]
    fn raw_labels_are_little_endian() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.mbf");
        let jpgs: Vec<Vec<u8>> = vec![vec![0xff, 0xd8, 0x00], vec![0xff; 10]];
        let labels = [3u32, 258];
        let summary = write_raw(
            &path,
            TypeTag::ImageClass,
            jpgs.iter().map(|j| j.as_slice()).zip(labels),
        )
        .unwrap();
        assert_eq!(summary.stats.item_count, 2);
        assert_eq!(summary.stats.max_datum_size, 10);

        let mut r = BatchFileReader::open(&path).unwrap();
        let second = r.read_item_at(1).unwrap();
        assert_eq!(&second.target[..], &[2, 1, 0, 0]);
    }

    #[test]
    fn file_pairs_are_copied_verbatim() {
        let dir = tempdir().unwrap();
        let img = dir.path().join("a.jpg");
        let lbl = dir.path().join("a.json");
        fs::write(&img, b"not really a jpeg").unwrap();
        fs::write(&lbl, br#"{"boxes":[]}"#).unwrap();

        let path = dir.path().join("pairs.mbf");
        write_files(&path, TypeTag::BoundingBox, [(&img, &lbl)]).unwrap();

        let mut r = BatchFileReader::open(&path).unwrap();
        assert_eq!(r.type_tag(), TypeTag::BoundingBox);
        let item = r.read_item().unwrap().unwrap();
        assert_eq!(&item.data[..], b"not really a jpeg");
        assert_eq!(&item.target[..], br#"{"boxes":[]}"#);
    }

    #[test]
    fn missing_input_fails_with_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairs.mbf");
        let missing = dir.path().join("missing.jpg");
        let err = write_files(&path, TypeTag::ImageClass, [(&missing, &missing)]).unwrap_err();
        assert!(matches!(err, FormatError::Io { ref path, .. } if path == &missing));
    }

    #[test]
    fn empty_input_still_produces_a_container() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("none.mbf");
        let summary = write_raw(&path, TypeTag::ImageClass, std::iter::empty()).unwrap();
        assert_eq!(summary.stats.item_count, 0);
        assert_eq!(BatchFileReader::open(&path).unwrap().item_count(), 0);
    }
}
