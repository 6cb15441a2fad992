// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/batchfile.rs
//
// Batch file ("macrobatch") container: an ordered sequence of
// (data, target) blob records behind a fixed 48-byte header.
//
// Layout, all integers little-endian:
//
//   0   [u8; 8]  type tag, NUL padded
//   8   [u8; 4]  magic "MBCF"
//   12  u16      format version
//   14  u16      flags (bit 0: sealed)
//   16  u32      item count
//   20  u32      max data blob size
//   24  u32      max target blob size
//   28  u32      reserved
//   32  u64      total data bytes
//   40  u64      total target bytes
//   48  records: data_len u32, target_len u32, data, target

use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FormatError, FormatResult};
use crate::tag::{TypeTag, TAG_LEN};

pub const MAGIC: [u8; 4] = *b"MBCF";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: u64 = 48;
/// Two u32 length fields in front of every record.
pub const RECORD_PREFIX_LEN: u64 = 8;

const FLAG_SEALED: u16 = 0x1;

/// Per-file statistics kept in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub item_count: u32,
    pub max_datum_size: u32,
    pub max_target_size: u32,
    pub total_data_size: u64,
    pub total_target_size: u64,
}

impl BatchStats {
    fn record(&mut self, data_len: u32, target_len: u32) {
        self.item_count += 1;
        self.max_datum_size = self.max_datum_size.max(data_len);
        self.max_target_size = self.max_target_size.max(target_len);
        self.total_data_size += u64::from(data_len);
        self.total_target_size += u64::from(target_len);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    tag: TypeTag,
    sealed: bool,
    stats: BatchStats,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[0..8].copy_from_slice(&self.tag.to_bytes());
        buf[8..12].copy_from_slice(&MAGIC);
        buf[12..14].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        let flags = if self.sealed { FLAG_SEALED } else { 0 };
        buf[14..16].copy_from_slice(&flags.to_le_bytes());
        buf[16..20].copy_from_slice(&self.stats.item_count.to_le_bytes());
        buf[20..24].copy_from_slice(&self.stats.max_datum_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.stats.max_target_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.stats.total_data_size.to_le_bytes());
        buf[40..48].copy_from_slice(&self.stats.total_target_size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN as usize], path: &Path) -> FormatResult<Self> {
        if buf[8..12] != MAGIC {
            return Err(FormatError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = u16::from_le_bytes([buf[12], buf[13]]);
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                path: path.to_path_buf(),
                version,
            });
        }
        let mut raw_tag = [0u8; TAG_LEN];
        raw_tag.copy_from_slice(&buf[0..8]);
        let tag = TypeTag::from_bytes(&raw_tag)?;
        let flags = u16::from_le_bytes([buf[14], buf[15]]);

        Ok(Header {
            tag,
            sealed: flags & FLAG_SEALED != 0,
            stats: BatchStats {
                item_count: le_u32(&buf[16..20]),
                max_datum_size: le_u32(&buf[20..24]),
                max_target_size: le_u32(&buf[24..28]),
                total_data_size: le_u64(&buf[32..40]),
                total_target_size: le_u64(&buf[40..48]),
            },
        })
    }
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn le_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

fn blob_len(blob: &[u8]) -> FormatResult<u32> {
    u32::try_from(blob.len()).map_err(|_| FormatError::ItemTooLarge { len: blob.len() })
}

/// One persisted example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub data: Bytes,
    pub target: Bytes,
}

/// What a finished writer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub path: PathBuf,
    pub tag: TypeTag,
    pub stats: BatchStats,
}

/// Write-only handle on a new batch file.
///
/// The header is written unsealed on creation and rewritten with the final
/// statistics by [`BatchFileWriter::finish`]. A writer dropped without
/// `finish` leaves a file that readers refuse to open.
pub struct BatchFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    header: Header,
}

impl std::fmt::Debug for BatchFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFileWriter")
            .field("path", &self.path)
            .field("tag", &self.header.tag)
            .field("items", &self.header.stats.item_count)
            .finish()
    }
}

impl BatchFileWriter {
    /// Create (or truncate) `path` and write the header for `tag`.
    pub fn create<P: AsRef<Path>>(path: P, tag: TypeTag) -> FormatResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| FormatError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        let header = Header {
            tag,
            sealed: false,
            stats: BatchStats::default(),
        };
        writer
            .write_all(&header.encode())
            .map_err(|e| FormatError::io(&path, e))?;
        Ok(Self {
            path,
            writer,
            header,
        })
    }

    /// Append one record: both lengths, then the data blob, then the target blob.
    pub fn write_item(&mut self, data: &[u8], target: &[u8]) -> FormatResult<()> {
        let data_len = blob_len(data)?;
        let target_len = blob_len(target)?;
        if self.header.stats.item_count == u32::MAX {
            return Err(FormatError::TooManyItems {
                path: self.path.clone(),
            });
        }

        let mut prefix = [0u8; RECORD_PREFIX_LEN as usize];
        prefix[0..4].copy_from_slice(&data_len.to_le_bytes());
        prefix[4..8].copy_from_slice(&target_len.to_le_bytes());
        self.writer
            .write_all(&prefix)
            .and_then(|_| self.writer.write_all(data))
            .and_then(|_| self.writer.write_all(target))
            .map_err(|e| FormatError::io(&self.path, e))?;

        self.header.stats.record(data_len, target_len);
        Ok(())
    }

    pub fn item_count(&self) -> u32 {
        self.header.stats.item_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seal the file. The writer is consumed and cannot be used afterwards.
    pub fn finish(self) -> FormatResult<BatchSummary> {
        let Self {
            path,
            writer,
            mut header,
        } = self;
        header.sealed = true;

        let mut file = writer
            .into_inner()
            .map_err(|e| FormatError::io(&path, e.into_error()))?;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&header.encode()))
            .and_then(|_| file.sync_all())
            .map_err(|e| FormatError::io(&path, e))?;

        debug!(
            path = %path.display(),
            items = header.stats.item_count,
            max_datum = header.stats.max_datum_size,
            "sealed batch file"
        );
        Ok(BatchSummary {
            path,
            tag: header.tag,
            stats: header.stats,
        })
    }
}

/// Read-only handle on a sealed batch file.
///
/// Opening validates the header and walks the record framing (lengths only,
/// no blob is read), so every record the reader hands out is known to lie
/// inside the file.
pub struct BatchFileReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: Header,
    offsets: Vec<u64>,
    cursor: usize,
}

impl std::fmt::Debug for BatchFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFileReader")
            .field("path", &self.path)
            .field("tag", &self.header.tag)
            .field("stats", &self.header.stats)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl BatchFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> FormatResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| FormatError::io(&path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| FormatError::io(&path, e))?
            .len();
        if file_len < HEADER_LEN {
            return Err(FormatError::Truncated {
                path,
                detail: format!("{file_len} bytes is shorter than the {HEADER_LEN}-byte header"),
            });
        }

        let mut reader = BufReader::new(file);
        let mut raw = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut raw)
            .map_err(|e| FormatError::io(&path, e))?;
        let header = Header::decode(&raw, &path)?;
        if !header.sealed {
            return Err(FormatError::Unsealed { path });
        }

        let offsets = Self::index_records(&mut reader, &path, &header, file_len)?;
        debug!(
            path = %path.display(),
            tag = %header.tag,
            items = header.stats.item_count,
            "opened batch file"
        );
        Ok(Self {
            path,
            reader,
            header,
            offsets,
            cursor: 0,
        })
    }

    fn index_records(
        reader: &mut BufReader<File>,
        path: &Path,
        header: &Header,
        file_len: u64,
    ) -> FormatResult<Vec<u64>> {
        let count = header.stats.item_count as usize;
        let max_records = (file_len - HEADER_LEN) / RECORD_PREFIX_LEN;
        if u64::from(header.stats.item_count) > max_records {
            return Err(FormatError::Truncated {
                path: path.to_path_buf(),
                detail: format!(
                    "header declares {count} records but the file can hold at most {max_records}"
                ),
            });
        }
        let mut offsets = Vec::with_capacity(count);
        let mut seen = BatchStats::default();
        let mut pos = HEADER_LEN;

        for index in 0..count {
            if pos + RECORD_PREFIX_LEN > file_len {
                return Err(FormatError::Truncated {
                    path: path.to_path_buf(),
                    detail: format!("record {index} of {count} is missing its length prefix"),
                });
            }
            let mut prefix = [0u8; RECORD_PREFIX_LEN as usize];
            reader
                .read_exact(&mut prefix)
                .map_err(|e| FormatError::io(path, e))?;
            let data_len = le_u32(&prefix[0..4]);
            let target_len = le_u32(&prefix[4..8]);
            let body = u64::from(data_len) + u64::from(target_len);
            let remaining = file_len - pos - RECORD_PREFIX_LEN;
            if body > remaining {
                return Err(FormatError::Corrupt {
                    path: path.to_path_buf(),
                    detail: format!(
                        "record {index} declares {body} bytes but only {remaining} remain"
                    ),
                });
            }
            // body <= remaining <= file length, so it fits in i64
            reader
                .seek_relative(body as i64)
                .map_err(|e| FormatError::io(path, e))?;

            offsets.push(pos);
            seen.record(data_len, target_len);
            pos += RECORD_PREFIX_LEN + body;
        }

        if pos != file_len {
            return Err(FormatError::Corrupt {
                path: path.to_path_buf(),
                detail: format!("{} trailing bytes after the last record", file_len - pos),
            });
        }
        if seen != header.stats {
            return Err(FormatError::Corrupt {
                path: path.to_path_buf(),
                detail: "record framing disagrees with header statistics".to_string(),
            });
        }
        Ok(offsets)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn type_tag(&self) -> TypeTag {
        self.header.tag
    }

    pub fn stats(&self) -> BatchStats {
        self.header.stats
    }

    pub fn item_count(&self) -> usize {
        self.offsets.len()
    }

    /// Largest data blob in the file, served from the header.
    pub fn max_datum_size(&self) -> u32 {
        self.header.stats.max_datum_size
    }

    pub fn max_target_size(&self) -> u32 {
        self.header.stats.max_target_size
    }

    pub fn total_data_size(&self) -> u64 {
        self.header.stats.total_data_size
    }

    pub fn total_target_size(&self) -> u64 {
        self.header.stats.total_target_size
    }

    /// Next record in append order, or `None` past the last one.
    pub fn read_item(&mut self) -> FormatResult<Option<Item>> {
        if self.cursor >= self.offsets.len() {
            return Ok(None);
        }
        self.read_item_at(self.cursor).map(Some)
    }

    /// Record `index`; sequential reads continue after it.
    pub fn read_item_at(&mut self, index: usize) -> FormatResult<Item> {
        let offset = *self
            .offsets
            .get(index)
            .ok_or(FormatError::IndexOutOfRange {
                index,
                count: self.offsets.len(),
            })?;

        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| FormatError::io(&self.path, e))?;
        let mut prefix = [0u8; RECORD_PREFIX_LEN as usize];
        self.read_exact_or_truncated(&mut prefix, index)?;
        let mut data = vec![0u8; le_u32(&prefix[0..4]) as usize];
        self.read_exact_or_truncated(&mut data, index)?;
        let mut target = vec![0u8; le_u32(&prefix[4..8]) as usize];
        self.read_exact_or_truncated(&mut target, index)?;

        self.cursor = index + 1;
        Ok(Item {
            data: Bytes::from(data),
            target: Bytes::from(target),
        })
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8], index: usize) -> FormatResult<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                FormatError::Truncated {
                    path: self.path.clone(),
                    detail: format!("record {index} ended early"),
                }
            } else {
                FormatError::io(&self.path, e)
            }
        })
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Iterate the remaining records in append order.
    pub fn items(&mut self) -> Items<'_> {
        Items { reader: self }
    }

    pub fn close(self) {}
}

pub struct Items<'a> {
    reader: &'a mut BatchFileReader,
}

impl Iterator for Items<'_> {
    type Item = FormatResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_item().transpose()
    }
}

/// Open `path`, report its largest data blob, and close it again.
pub fn read_max_item<P: AsRef<Path>>(path: P) -> FormatResult<u32> {
    let reader = BatchFileReader::open(path)?;
    let max = reader.max_datum_size();
    reader.close();
    Ok(max)
}
