//! Core data types for captured signals

use std::fmt;
use std::sync::Arc;

/// Sample representing a signal level starting at a specific sample index
///
/// This is a run-length encoded representation that is sent only when a signal changes.
/// The value remains constant until the next Sample arrives, so the duration of a run
/// is `next.position - current.position`.
///
/// A channel's edge list always starts with a Sample at the first captured position
/// carrying the initial level; every following Sample is a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Channel value from this position on
    pub value: bool,
    /// Sample index at which this value started
    pub position: u64,
}

impl Sample {
    /// Create a new sample
    pub fn new(value: bool, position: u64) -> Self {
        Self { value, position }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sample[v={}, pos={}]", self.value, self.position)
    }
}

/// A block of packed-bit samples from a single channel
///
/// Logic analyzers typically store captures as one bit per sample per channel.
/// `SampleBlock` wraps such a buffer and converts it into the run-length
/// [`Sample`] form the cursors work on.
///
/// ## Bit Packing Format
///
/// LSB-first within each byte: bit N is at `data[N/8] >> (N%8) & 1`.
#[derive(Clone, Debug)]
pub struct SampleBlock {
    /// Packed bit data (LSB-first). Shared via Arc for cheap cloning.
    pub data: Arc<[u8]>,
    /// Position of the first sample in this block (0-based, global sample index)
    pub start_position: u64,
    /// Number of valid samples in this block (may be < capacity for the last block)
    pub num_samples: usize,
}

impl SampleBlock {
    /// Create a new SampleBlock
    ///
    /// `num_samples` is clamped to the number of bits actually present in `data`.
    pub fn new(data: Arc<[u8]>, start_position: u64, num_samples: usize) -> Self {
        let num_samples = num_samples.min(data.len() * 8);
        Self {
            data,
            start_position,
            num_samples,
        }
    }

    /// O(1) bit lookup: get the boolean value at a given position within this block.
    ///
    /// `position` is a global sample index. It must be in
    /// `[self.start_position, self.end_position())`.
    #[inline]
    pub fn get_bit(&self, position: u64) -> bool {
        let local = (position - self.start_position) as usize;
        let byte_index = local / 8;
        let bit_offset = local % 8;
        (self.data[byte_index] >> bit_offset) & 1 == 1
    }

    /// The position one past the last valid sample in this block
    #[inline]
    pub fn end_position(&self) -> u64 {
        self.start_position + self.num_samples as u64
    }

    /// Run-length encode this block.
    ///
    /// `previous` is the level at the end of the preceding block, if any. When it
    /// is given and matches the first sample, no leading Sample is produced, so
    /// consecutive blocks can be appended into one edge list.
    pub fn to_edges(&self, previous: Option<bool>) -> Vec<Sample> {
        let mut edges = Vec::new();
        let mut level = previous;
        for position in self.start_position..self.end_position() {
            let bit = self.get_bit(position);
            if level != Some(bit) {
                edges.push(Sample::new(bit, position));
                level = Some(bit);
            }
        }
        edges
    }
}

impl fmt::Display for SampleBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SampleBlock[start={}, samples={}, bytes={}]",
            self.start_position,
            self.num_samples,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bit_lsb_first() {
        let block = SampleBlock::new(Arc::from(vec![0b0000_0110u8, 0x80]), 0, 16);
        assert!(!block.get_bit(0));
        assert!(block.get_bit(1));
        assert!(block.get_bit(2));
        assert!(!block.get_bit(3));
        assert!(block.get_bit(15));
        assert_eq!(block.end_position(), 16);
    }

    #[test]
    fn test_to_edges() {
        // 0 1 1 0 0 0 0 0 | 0 0 0 0 0 0 0 1
        let block = SampleBlock::new(Arc::from(vec![0b0000_0110u8, 0x80]), 100, 16);
        let edges = block.to_edges(None);
        assert_eq!(
            edges,
            vec![
                Sample::new(false, 100),
                Sample::new(true, 101),
                Sample::new(false, 103),
                Sample::new(true, 115),
            ]
        );
    }

    #[test]
    fn test_to_edges_continues_previous_level() {
        let block = SampleBlock::new(Arc::from(vec![0xFFu8]), 8, 8);
        assert!(block.to_edges(Some(true)).is_empty());
        assert_eq!(block.to_edges(Some(false)), vec![Sample::new(true, 8)]);
    }

    #[test]
    fn test_num_samples_clamped() {
        let block = SampleBlock::new(Arc::from(vec![0u8]), 0, 100);
        assert_eq!(block.num_samples, 8);
    }
}
