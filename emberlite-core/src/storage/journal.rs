// storage/journal.rs
// Append-only journal of mutating commands, replayed on startup

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Bytes before each record payload: length (4) + CRC32 (4).
const RECORD_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum JournalRecord {
    Insert {
        db: String,
        coll: String,
        documents: Vec<Value>,
    },
    DropCollection {
        db: String,
        coll: String,
    },
    DropDatabase {
        db: String,
    },
}

pub struct Journal {
    file: File,
    path: PathBuf,
    dirty: bool,
}

impl Journal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        Ok(Journal { file, path, dirty: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; returns its offset.
    pub fn append(&mut self, record: &JournalRecord) -> Result<u64> {
        let payload = serde_json::to_vec(record)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| EngineError::BadValue(format!("journal record of {} bytes is too large", payload.len())))?;

        let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        self.write_record(&buf, |file, bytes| file.write_all(bytes))
    }

    /// Write one framed record at the end of the file. A failed write is cut
    /// back to the record's start so later appends stay aligned.
    fn write_record<W>(&mut self, buf: &[u8], write: W) -> Result<u64>
    where
        W: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let offset = self.file.seek(SeekFrom::End(0))?;

        if let Err(e) = write(&mut self.file, buf) {
            if let Err(rewind) = self.file.set_len(offset) {
                tracing::error!(path = %self.path.display(), offset, error = %rewind, "failed to rewind torn journal append");
            }
            return Err(e.into());
        }

        self.dirty = true;
        Ok(offset)
    }

    /// fsync if anything was appended since the last sync.
    pub fn sync(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.file.sync_data()?;
        self.dirty = false;
        Ok(true)
    }

    /// Read every complete record from the start of the file.
    ///
    /// A torn tail (short header or payload) ends replay and is truncated
    /// away; a checksum mismatch on a complete record is corruption.
    pub fn replay(&mut self) -> Result<Vec<JournalRecord>> {
        self.file.seek(SeekFrom::Start(0))?;

        let file_len = self.file.metadata()?.len();
        let mut records = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut header = [0u8; RECORD_HEADER_LEN];
            match self.file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            // A length running past the end of the file is a torn tail.
            let remaining = file_len.saturating_sub(valid_len + RECORD_HEADER_LEN as u64);
            if len as u64 > remaining {
                break;
            }

            let mut payload = vec![0u8; len];
            match self.file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            if crc32fast::hash(&payload) != checksum {
                return Err(EngineError::Corruption(format!(
                    "checksum mismatch at offset {} in {}",
                    valid_len,
                    self.path.display()
                )));
            }

            records.push(serde_json::from_slice(&payload)?);
            valid_len += (RECORD_HEADER_LEN + len) as u64;
        }

        if file_len > valid_len {
            tracing::warn!(path = %self.path.display(), valid_len, "truncating torn journal tail");
            self.file.set_len(valid_len)?;
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn insert(n: i64) -> JournalRecord {
        JournalRecord::Insert {
            db: "test".to_string(),
            coll: "c".to_string(),
            documents: vec![json!({"_id": n})],
        }
    }

    #[test]
    fn test_append_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.emj");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&insert(1)).unwrap();
            journal.append(&JournalRecord::DropDatabase { db: "old".to_string() }).unwrap();
            assert!(journal.sync().unwrap());
            assert!(!journal.sync().unwrap());
        }

        let mut journal = Journal::open(&path).unwrap();
        let records = journal.replay().unwrap();
        assert_eq!(records, vec![insert(1), JournalRecord::DropDatabase { db: "old".to_string() }]);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.emj");

        let full_len = {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&insert(1)).unwrap();
            let second = journal.append(&insert(2)).unwrap();
            journal.sync().unwrap();
            second
        };

        // Chop the second record in half
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        let total = file.metadata().unwrap().len();
        file.set_len(full_len + (total - full_len) / 2).unwrap();
        drop(file);

        let mut journal = Journal::open(&path).unwrap();
        assert_eq!(journal.replay().unwrap(), vec![insert(1)]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), full_len);
    }

    #[test]
    fn test_failed_append_leaves_no_torn_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.emj");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&insert(1)).unwrap();
            let before = std::fs::metadata(&path).unwrap().len();

            // Disk fills up after part of the header is written
            let payload = serde_json::to_vec(&insert(2)).unwrap();
            let mut buf = (payload.len() as u32).to_le_bytes().to_vec();
            buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
            buf.extend_from_slice(&payload);
            let err = journal
                .write_record(&buf, |file, bytes| {
                    file.write_all(&bytes[..5])?;
                    Err(io::Error::new(ErrorKind::Other, "no space left on device"))
                })
                .unwrap_err();
            assert!(matches!(err, EngineError::Io(_)));
            assert_eq!(std::fs::metadata(&path).unwrap().len(), before);

            journal.append(&insert(3)).unwrap();
            journal.sync().unwrap();
        }

        let mut journal = Journal::open(&path).unwrap();
        assert_eq!(journal.replay().unwrap(), vec![insert(1), insert(3)]);
    }

    #[test]
    fn test_oversized_length_is_treated_as_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.emj");

        let valid_len = {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&insert(1)).unwrap();
            journal.sync().unwrap();
            std::fs::metadata(&path).unwrap().len()
        };

        // Header claiming ~4 GiB with only a few payload bytes behind it
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"{}");
        std::fs::write(&path, bytes).unwrap();

        let mut journal = Journal::open(&path).unwrap();
        assert_eq!(journal.replay().unwrap(), vec![insert(1)]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), valid_len);
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.emj");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&insert(1)).unwrap();
        }

        // Flip one payload byte
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let mut journal = Journal::open(&path).unwrap();
        assert!(matches!(journal.replay(), Err(EngineError::Corruption(_))));
    }
}
