//! Frame-domain decomposition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` of frame indices assigned to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    /// First frame index owned by the node
    pub start: u64,
    /// One past the last frame index owned by the node
    pub end: u64,
}

impl FrameRange {
    /// Compute the range owned by `rank` out of `nodes` ranks.
    ///
    /// Every node derives its own range locally from the broadcast frame
    /// count; no node asks another for its assignment. Each rank gets
    /// `total_frames / nodes` frames and the last rank absorbs the
    /// remainder, so ranges are disjoint, contiguous in rank order, and
    /// their union is exactly `[0, total_frames)`. When there are fewer
    /// frames than nodes the non-final ranks are empty but well-formed.
    pub fn for_rank(rank: usize, nodes: usize, total_frames: u64) -> Self {
        assert!(nodes > 0, "node count must be positive");
        assert!(rank < nodes, "rank {rank} out of range for {nodes} nodes");

        let per_rank = total_frames / nodes as u64;
        let start = rank as u64 * per_rank;
        let end = if rank == nodes - 1 {
            total_frames
        } else {
            start + per_rank
        };

        Self { start, end }
    }

    /// Number of frames in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range holds no frames.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(nodes: usize, total: u64) {
        let ranges: Vec<FrameRange> = (0..nodes)
            .map(|r| FrameRange::for_rank(r, nodes, total))
            .collect();

        // Contiguous in rank order and starting at zero.
        assert_eq!(ranges[0].start, 0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }

        // Last rank ends exactly at the frame count.
        assert_eq!(ranges[nodes - 1].end, total);

        // Union covers every frame exactly once.
        let covered: u64 = ranges.iter().map(FrameRange::len).sum();
        assert_eq!(covered, total);
    }

    #[test]
    fn test_partition_exact_division() {
        assert_partition(3, 300);
        let r = FrameRange::for_rank(1, 3, 300);
        assert_eq!(r, FrameRange { start: 100, end: 200 });
    }

    #[test]
    fn test_partition_remainder_goes_to_last_rank() {
        assert_partition(4, 1003);
        let last = FrameRange::for_rank(3, 4, 1003);
        assert_eq!(last.start, 750);
        assert_eq!(last.end, 1003);
        assert_eq!(last.len(), 253);
    }

    #[test]
    fn test_partition_assorted_shapes() {
        for nodes in 1..=8 {
            for total in [1u64, 2, 7, 100, 255, 999] {
                assert_partition(nodes, total);
            }
        }
    }

    #[test]
    fn test_fewer_frames_than_nodes() {
        // Non-final ranks are empty but never negative-length.
        assert_partition(6, 4);
        for rank in 0..5 {
            let r = FrameRange::for_rank(rank, 6, 4);
            assert!(r.is_empty());
            assert_eq!(r.start, r.end);
        }
        let last = FrameRange::for_rank(5, 6, 4);
        assert_eq!(last, FrameRange { start: 0, end: 4 });
    }

    #[test]
    fn test_single_node_owns_everything() {
        let r = FrameRange::for_rank(0, 1, 42);
        assert_eq!(r, FrameRange { start: 0, end: 42 });
    }
}
