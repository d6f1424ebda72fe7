//! Object store access seam.

use async_trait::async_trait;
use fpipe_models::ObjectRef;

use crate::error::StorageResult;

/// Inclusive byte span `[start, end]` within a remote object, as sent on
/// the wire in a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// An inclusive range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the HTTP `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split `[0, size)` into `parts` contiguous near-equal inclusive ranges.
///
/// The last range absorbs the remainder of the integer division. `parts` is
/// clamped to `size` so a tiny object never produces empty ranges.
pub fn split_ranges(size: u64, parts: usize) -> Vec<ByteRange> {
    assert!(size > 0, "cannot split a zero-sized object");

    let parts = (parts.max(1) as u64).min(size);
    let chunk = size / parts;

    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i == parts - 1 {
                size - 1
            } else {
                (i + 1) * chunk - 1
            };
            ByteRange { start, end }
        })
        .collect()
}

/// Range-capable access to a remote object store.
///
/// The core needs exactly two things from the store: the total object size
/// and the bytes of one inclusive range. Retries across calls belong to the
/// caller; implementations only bound each request with a timeout.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Total size of the object in bytes.
    ///
    /// Returns [`crate::StorageError::SizeUnknown`] when the store cannot
    /// report a positive size.
    async fn object_size(&self, object: &ObjectRef) -> StorageResult<u64>;

    /// Fetch one inclusive byte range of the object.
    async fn fetch_range(&self, object: &ObjectRef, range: ByteRange) -> StorageResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_even() {
        let ranges = split_ranges(10_000, 4);
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 0, end: 2499 },
                ByteRange { start: 2500, end: 4999 },
                ByteRange { start: 5000, end: 7499 },
                ByteRange { start: 7500, end: 9999 },
            ]
        );
        assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), 10_000);
    }

    #[test]
    fn test_split_remainder_absorbed_by_last() {
        let ranges = split_ranges(10, 3);
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 0, end: 2 },
                ByteRange { start: 3, end: 5 },
                ByteRange { start: 6, end: 9 },
            ]
        );
    }

    #[test]
    fn test_split_clamps_parts_to_size() {
        let ranges = split_ranges(3, 8);
        assert_eq!(ranges.len(), 3);
        for r in &ranges {
            assert_eq!(r.len(), 1);
        }
    }

    #[test]
    fn test_range_header_value() {
        let r = ByteRange { start: 2500, end: 4999 };
        assert_eq!(r.header_value(), "bytes=2500-4999");
    }
}
