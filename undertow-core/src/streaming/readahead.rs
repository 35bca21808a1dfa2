//! Read-ahead window sizing.

use crate::engine::TransferReader;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Window used for files up to and including `MEDIUM_FILE_THRESHOLD`.
pub const DEFAULT_READAHEAD: u64 = 16 * MIB;
/// Window used for files larger than `MEDIUM_FILE_THRESHOLD`.
pub const MEDIUM_FILE_READAHEAD: u64 = 32 * MIB;
/// Window used for files larger than `LARGE_FILE_THRESHOLD`.
pub const LARGE_FILE_READAHEAD: u64 = 64 * MIB;

pub const MEDIUM_FILE_THRESHOLD: u64 = 500 * MIB;
pub const LARGE_FILE_THRESHOLD: u64 = 2 * GIB;

/// Returns the read-ahead window for a file of `length` bytes.
///
/// Thresholds are exclusive: a file of exactly 500 MiB still gets the
/// default window.
pub fn readahead_for(length: u64) -> u64 {
    if length > LARGE_FILE_THRESHOLD {
        LARGE_FILE_READAHEAD
    } else if length > MEDIUM_FILE_THRESHOLD {
        MEDIUM_FILE_READAHEAD
    } else {
        DEFAULT_READAHEAD
    }
}

/// Applies the read-ahead window for `length` and switches the reader to
/// responsive mode. Returns the window that was set.
pub fn configure_reader(reader: &mut dyn TransferReader, length: u64) -> u64 {
    let readahead = readahead_for(length);
    reader.set_readahead(readahead);
    reader.set_responsive();
    tracing::debug!(length, readahead, "Configured streaming reader");
    readahead
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readahead_tiers() {
        assert_eq!(readahead_for(100 * MIB), 16 * MIB);
        assert_eq!(readahead_for(GIB), 32 * MIB);
        assert_eq!(readahead_for(3 * GIB), 64 * MIB);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        assert_eq!(readahead_for(500 * MIB), DEFAULT_READAHEAD);
        assert_eq!(readahead_for(500 * MIB + 1), MEDIUM_FILE_READAHEAD);
        assert_eq!(readahead_for(2 * GIB), MEDIUM_FILE_READAHEAD);
        assert_eq!(readahead_for(2 * GIB + 1), LARGE_FILE_READAHEAD);
    }

    #[test]
    fn test_empty_file_uses_default() {
        assert_eq!(readahead_for(0), DEFAULT_READAHEAD);
    }
}
