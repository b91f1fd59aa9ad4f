//! Byte-exact tail structures: every bag file ends with
//! `[index entries...][footer]`, and the footer is always the last 64
//! bytes of the file.

use bytemuck::{Pod, Zeroable};

pub const MAGIC: [u8; 8] = *b"MXRCBAG\0";
pub const FORMAT_VERSION: u32 = 1;

/// Fixed 64-byte trailer: `magic(8) | version(4) | data_size(8) |
/// index_offset(8) | index_count(8) | checksum(4) | reserved(24)`.
/// `version:u32` sits between two 8-byte-aligned fields, so a
/// `#[repr(C)]` layout of this struct carries 4 bytes of padding and
/// isn't the packed wire format (and `bytemuck::Pod` would reject the
/// padding outright). `to_bytes`/`from_bytes` pack the fields
/// field-by-field, little-endian, into the exact 64-byte layout
/// instead of casting the struct itself.
#[derive(Debug, Clone, Copy)]
pub struct BagFooter {
    pub magic: [u8; 8],
    pub version: u32,
    pub data_size: u64,
    pub index_offset: u64,
    pub index_count: u64,
    pub checksum: u32,
    pub reserved: [u8; 24],
}

impl BagFooter {
    pub fn new(data_size: u64, index_offset: u64, index_count: u64, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            data_size,
            index_offset,
            index_count,
            checksum,
            reserved: [0u8; 24],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic[..7] == MAGIC[..7]
    }

    pub fn is_supported_version(&self) -> bool {
        self.version == FORMAT_VERSION
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[0..8].copy_from_slice(&self.magic);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..20].copy_from_slice(&self.data_size.to_le_bytes());
        buf[20..28].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[28..36].copy_from_slice(&self.index_count.to_le_bytes());
        buf[36..40].copy_from_slice(&self.checksum.to_le_bytes());
        buf[40..64].copy_from_slice(&self.reserved);
        buf
    }

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        let mut reserved = [0u8; 24];
        reserved.copy_from_slice(&bytes[40..64]);
        Self {
            magic,
            version: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            data_size: u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
            index_offset: u64::from_le_bytes(bytes[20..28].try_into().unwrap()),
            index_count: u64::from_le_bytes(bytes[28..36].try_into().unwrap()),
            checksum: u32::from_le_bytes(bytes[36..40].try_into().unwrap()),
            reserved,
        }
    }
}

/// Fixed 16-byte index record: one per logged message, in ascending
/// timestamp order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct IndexEntry {
    pub timestamp_ns: u64,
    pub file_offset: u64,
}

const _: () = assert!(std::mem::size_of::<IndexEntry>() == 16);

impl IndexEntry {
    pub fn new(timestamp_ns: u64, file_offset: u64) -> Self {
        Self {
            timestamp_ns,
            file_offset,
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        bytemuck::cast(*self)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        bytemuck::cast(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationType {
    Size,
    Time,
}

/// When a bag writer should roll over to a fresh file.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub kind: RotationType,
    pub max_size_bytes: u64,
    pub max_duration_secs: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::size(1024)
    }
}

impl RotationPolicy {
    pub fn size(max_size_mb: u64) -> Self {
        Self {
            kind: RotationType::Size,
            max_size_bytes: max_size_mb * 1024 * 1024,
            max_duration_secs: 3600,
        }
    }

    pub fn time(max_duration_secs: u64) -> Self {
        Self {
            kind: RotationType::Time,
            max_size_bytes: 1024 * 1024 * 1024,
            max_duration_secs,
        }
    }

    pub fn should_rotate(&self, current_size_bytes: u64, elapsed_secs: u64) -> bool {
        match self.kind {
            RotationType::Size => current_size_bytes >= self.max_size_bytes,
            RotationType::Time => elapsed_secs >= self.max_duration_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionType {
    Time,
    Count,
}

/// When old bag files should be deleted to bound disk usage.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub kind: RetentionType,
    pub max_age_days: u32,
    pub max_file_count: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::time(7)
    }
}

impl RetentionPolicy {
    pub fn time(max_age_days: u32) -> Self {
        Self {
            kind: RetentionType::Time,
            max_age_days,
            max_file_count: 100,
        }
    }

    pub fn count(max_file_count: u32) -> Self {
        Self {
            kind: RetentionType::Count,
            max_age_days: 7,
            max_file_count,
        }
    }

    /// `age_hours` is the file's age; `file_index` is its position in
    /// an oldest-first ordering among `total_file_count` files.
    pub fn should_delete(&self, age_hours: u64, total_file_count: usize, file_index: usize) -> bool {
        match self.kind {
            RetentionType::Time => age_hours >= (self.max_age_days as u64) * 24,
            RetentionType::Count => {
                let max = self.max_file_count as usize;
                total_file_count > max && file_index < total_file_count - max
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_round_trips_through_bytes() {
        let footer = BagFooter::new(1024, 2048, 16, 0xDEAD_BEEF);
        let bytes = footer.to_bytes();
        assert_eq!(bytes.len(), 64);
        let back = BagFooter::from_bytes(bytes);
        assert!(back.is_valid());
        assert!(back.is_supported_version());
        assert_eq!(back.data_size, 1024);
        assert_eq!(back.index_offset, 2048);
        assert_eq!(back.index_count, 16);
        assert_eq!(back.checksum, 0xDEAD_BEEF);
    }

    #[test]
    fn index_entry_round_trips() {
        let entry = IndexEntry::new(123, 456);
        let back = IndexEntry::from_bytes(entry.to_bytes());
        assert_eq!(entry, back);
    }

    #[test]
    fn size_rotation_triggers_on_threshold() {
        let policy = RotationPolicy::size(1);
        assert!(!policy.should_rotate(1024, 0));
        assert!(policy.should_rotate(1024 * 1024, 0));
    }

    #[test]
    fn time_retention_deletes_past_max_age() {
        let policy = RetentionPolicy::time(7);
        assert!(!policy.should_delete(24, 1, 0));
        assert!(policy.should_delete(7 * 24, 1, 0));
    }

    #[test]
    fn count_retention_deletes_oldest_overflow_only() {
        let policy = RetentionPolicy::count(2);
        // 3 files, oldest-first: index 0 is the only one over the cap.
        assert!(policy.should_delete(0, 3, 0));
        assert!(!policy.should_delete(0, 3, 1));
        assert!(!policy.should_delete(0, 3, 2));
    }
}
