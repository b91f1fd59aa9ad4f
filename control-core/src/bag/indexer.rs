//! Builds and reads the index block + footer tail of a bag file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::bag::crc32::crc32;
use crate::bag::footer::{BagFooter, IndexEntry};
use crate::error::BagError;

/// In-memory index entries for the file currently being written or read.
#[derive(Debug, Default)]
pub struct Indexer {
    entries: Vec<IndexEntry>,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, timestamp_ns: u64, file_offset: u64) {
        self.entries.push(IndexEntry::new(timestamp_ns, file_offset));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append the index block and footer to `file` at its current
    /// position, which must be the end of the data region (`data_size`
    /// bytes from the start). Computes a real CRC32 over the data and
    /// index regions.
    pub fn write_to_file(&self, file: &mut File, data_size: u64) -> Result<(), BagError> {
        let index_offset = file.stream_position()?;

        for entry in &self.entries {
            file.write_all(&entry.to_bytes())?;
        }
        file.flush()?;

        let index_count = self.entries.len() as u64;
        let index_size = index_count * 16;
        let checksum = Self::calculate_checksum(file, data_size, index_size)?;

        let footer = BagFooter::new(data_size, index_offset, index_count, checksum);
        file.write_all(&footer.to_bytes())?;
        file.flush()?;

        log::debug!(
            "wrote {} index entries, footer at offset {}",
            index_count,
            index_offset + index_size
        );
        Ok(())
    }

    fn calculate_checksum(file: &mut File, data_size: u64, index_size: u64) -> Result<u32, BagError> {
        let total = (data_size + index_size) as usize;
        let mut buf = vec![0u8; total];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        file.seek(SeekFrom::End(0))?;
        Ok(crc32(&buf))
    }

    /// Load the footer and index block from `filepath`, validating
    /// magic, version, and checksum. Populates `self.entries` on
    /// success.
    pub fn read_from_file(&mut self, filepath: &std::path::Path) -> Result<BagFooter, BagError> {
        let mut file = File::open(filepath)?;
        let file_len = file.seek(SeekFrom::End(0))?;

        if file_len < 64 {
            return Err(BagError::CorruptFooter(format!("file too small: {} bytes", file_len)));
        }

        file.seek(SeekFrom::End(-64))?;
        let mut footer_bytes = [0u8; 64];
        file.read_exact(&mut footer_bytes)?;
        let footer = BagFooter::from_bytes(footer_bytes);

        if !footer.is_valid() {
            return Err(BagError::CorruptFooter("invalid magic".to_string()));
        }
        if !footer.is_supported_version() {
            return Err(BagError::UnsupportedVersion(footer.version));
        }

        self.entries.clear();

        if footer.index_count == 0 {
            log::warn!("bag file has no index entries: {}", filepath.display());
            return Ok(footer);
        }

        file.seek(SeekFrom::Start(footer.index_offset))?;
        self.entries.reserve(footer.index_count as usize);
        for _ in 0..footer.index_count {
            let mut entry_bytes = [0u8; 16];
            file.read_exact(&mut entry_bytes)?;
            self.entries.push(IndexEntry::from_bytes(entry_bytes));
        }

        let index_size = footer.index_count * 16;
        let computed = Self::calculate_checksum(&mut file, footer.data_size, index_size)?;
        if computed != footer.checksum {
            return Err(BagError::ChecksumMismatch {
                expected: footer.checksum,
                computed,
            });
        }

        log::debug!(
            "loaded {} index entries from {}",
            self.entries.len(),
            filepath.display()
        );
        Ok(footer)
    }

    /// Largest-timestamp-at-or-before `timestamp_ns`; falls back to the
    /// first entry if every entry is newer than `timestamp_ns`. `None`
    /// only when the index is empty.
    pub fn find_by_timestamp(&self, timestamp_ns: u64) -> Option<IndexEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = self.entries.partition_point(|e| e.timestamp_ns < timestamp_ns);
        if idx == 0 {
            return Some(self.entries[0]);
        }
        if idx == self.entries.len() || self.entries[idx].timestamp_ns != timestamp_ns {
            return Some(self.entries[idx - 1]);
        }
        Some(self.entries[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn build_sample_file() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data = b"line one\nline two\nline three\n";
        tmp.write_all(data).unwrap();

        let mut indexer = Indexer::new();
        indexer.add_entry(100, 0);
        indexer.add_entry(200, 9);
        indexer.add_entry(300, 18);

        let mut file = tmp.reopen().unwrap();
        file.seek(SeekFrom::End(0)).unwrap();
        indexer.write_to_file(&mut file, data.len() as u64).unwrap();
        tmp
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = build_sample_file();
        let mut indexer = Indexer::new();
        let footer = indexer.read_from_file(tmp.path()).unwrap();
        assert_eq!(footer.index_count, 3);
        assert_eq!(indexer.len(), 3);
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let tmp = build_sample_file();
        let mut bytes = std::fs::read(tmp.path()).unwrap();
        // Corrupt a data byte without touching the footer or index block.
        bytes[0] = bytes[0].wrapping_add(1);
        std::fs::write(tmp.path(), &bytes).unwrap();

        let mut indexer = Indexer::new();
        let err = indexer.read_from_file(tmp.path()).unwrap_err();
        assert!(matches!(err, BagError::ChecksumMismatch { .. }));
    }

    #[test]
    fn find_by_timestamp_picks_floor_entry() {
        let mut indexer = Indexer::new();
        indexer.add_entry(100, 0);
        indexer.add_entry(200, 10);
        indexer.add_entry(300, 20);

        assert_eq!(indexer.find_by_timestamp(250).unwrap().file_offset, 10);
        assert_eq!(indexer.find_by_timestamp(300).unwrap().file_offset, 20);
        assert_eq!(indexer.find_by_timestamp(1).unwrap().file_offset, 0);
        assert_eq!(indexer.find_by_timestamp(u64::MAX).unwrap().file_offset, 20);
    }

    #[test]
    fn find_by_timestamp_on_empty_index_is_none() {
        let indexer = Indexer::new();
        assert!(indexer.find_by_timestamp(1).is_none());
    }
}
