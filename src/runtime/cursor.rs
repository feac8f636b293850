//! Edge-addressable cursors over captured channels
//!
//! A cursor is a position into one digital signal's transition history. Decoders
//! walk several cursors in lock-step: the clock is stepped edge by edge and the
//! data lines are moved to the clock's sample position before being read.
//!
//! Two implementations are provided:
//!
//! - [`EdgeCursor`] walks an in-memory edge list (a whole capture).
//! - [`StreamCursor`] reads edges from a channel as a producer delivers them and
//!   blocks when it needs an edge that has not arrived yet.
//!
//! Both are monotonic: no operation moves a cursor backward.

use std::fmt;
use std::ops::Not;

use super::errors::{WorkError, WorkResult};
use super::receiver::Receiver;
use super::sample::{Sample, SampleBlock};

/// Digital level of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitState {
    #[default]
    Low,
    High,
}

impl From<bool> for BitState {
    fn from(value: bool) -> Self {
        if value { BitState::High } else { BitState::Low }
    }
}

impl From<BitState> for bool {
    fn from(state: BitState) -> Self {
        state == BitState::High
    }
}

impl Not for BitState {
    type Output = BitState;

    fn not(self) -> BitState {
        match self {
            BitState::Low => BitState::High,
            BitState::High => BitState::Low,
        }
    }
}

impl fmt::Display for BitState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BitState::Low => write!(f, "low"),
            BitState::High => write!(f, "high"),
        }
    }
}

/// Position into one channel's transition history
///
/// Running out of edges is reported as [`WorkError::Shutdown`] by the operations
/// that need a further edge (`advance_to_next_edge`, `sample_of_next_edge`).
pub trait ChannelCursor: Send {
    /// Level of the signal at the current position
    fn bit_state(&self) -> BitState;

    /// Current sample index
    fn sample_number(&self) -> u64;

    /// Move to the next transition and return its sample index.
    fn advance_to_next_edge(&mut self) -> WorkResult<u64>;

    /// Move to `position`. No-op if the cursor is already at or past it.
    fn advance_to_abs_position(&mut self, position: u64) -> WorkResult<()>;

    /// Sample index of the next transition without moving.
    fn sample_of_next_edge(&mut self) -> WorkResult<u64>;

    /// Whether moving to `position` would pass over at least one transition.
    ///
    /// A channel with no further transitions answers `false`.
    fn would_advancing_to_abs_position_cause_transition(
        &mut self,
        position: u64,
    ) -> WorkResult<bool>;
}

impl<C: ChannelCursor + ?Sized> ChannelCursor for Box<C> {
    fn bit_state(&self) -> BitState {
        (**self).bit_state()
    }

    fn sample_number(&self) -> u64 {
        (**self).sample_number()
    }

    fn advance_to_next_edge(&mut self) -> WorkResult<u64> {
        (**self).advance_to_next_edge()
    }

    fn advance_to_abs_position(&mut self, position: u64) -> WorkResult<()> {
        (**self).advance_to_abs_position(position)
    }

    fn sample_of_next_edge(&mut self) -> WorkResult<u64> {
        (**self).sample_of_next_edge()
    }

    fn would_advancing_to_abs_position_cause_transition(
        &mut self,
        position: u64,
    ) -> WorkResult<bool> {
        (**self).would_advancing_to_abs_position_cause_transition(position)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// EdgeCursor: in-memory edge list
// ────────────────────────────────────────────────────────────────────────────

/// Cursor over a complete, in-memory edge list
#[derive(Debug, Clone)]
pub struct EdgeCursor {
    edges: Vec<Sample>,
    /// Index of the run containing `position`
    index: usize,
    position: u64,
}

impl EdgeCursor {
    /// Build a cursor from run-length encoded samples.
    ///
    /// The first Sample gives the initial level. Samples that repeat the previous
    /// level are dropped, so every remaining entry after the first is a real
    /// transition. An empty list is treated as a line held low from sample 0.
    pub fn new(edges: Vec<Sample>) -> Self {
        let mut transitions: Vec<Sample> = Vec::with_capacity(edges.len().max(1));
        for edge in edges {
            match transitions.last() {
                Some(last) if last.value == edge.value => {}
                Some(last) if edge.position <= last.position => {
                    tracing::warn!("Dropping out-of-order edge {} after {}", edge, last);
                }
                _ => transitions.push(edge),
            }
        }
        if transitions.is_empty() {
            transitions.push(Sample::new(false, 0));
        }

        let position = transitions[0].position;
        Self {
            edges: transitions,
            index: 0,
            position,
        }
    }

    /// Build a cursor from consecutive packed-bit blocks of one channel.
    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a SampleBlock>) -> Self {
        let mut edges: Vec<Sample> = Vec::new();
        for block in blocks {
            let previous = edges.last().map(|edge| edge.value);
            edges.extend(block.to_edges(previous));
        }
        Self::new(edges)
    }

    /// Number of transitions after the initial level
    pub fn num_transitions(&self) -> usize {
        self.edges.len() - 1
    }
}

impl ChannelCursor for EdgeCursor {
    fn bit_state(&self) -> BitState {
        self.edges[self.index].value.into()
    }

    fn sample_number(&self) -> u64 {
        self.position
    }

    fn advance_to_next_edge(&mut self) -> WorkResult<u64> {
        let next = self.edges.get(self.index + 1).ok_or(WorkError::Shutdown)?;
        self.position = next.position;
        self.index += 1;
        Ok(self.position)
    }

    fn advance_to_abs_position(&mut self, position: u64) -> WorkResult<()> {
        if position <= self.position {
            return Ok(());
        }
        while self
            .edges
            .get(self.index + 1)
            .is_some_and(|next| next.position <= position)
        {
            self.index += 1;
        }
        self.position = position;
        Ok(())
    }

    fn sample_of_next_edge(&mut self) -> WorkResult<u64> {
        self.edges
            .get(self.index + 1)
            .map(|next| next.position)
            .ok_or(WorkError::Shutdown)
    }

    fn would_advancing_to_abs_position_cause_transition(
        &mut self,
        position: u64,
    ) -> WorkResult<bool> {
        Ok(self
            .edges
            .get(self.index + 1)
            .is_some_and(|next| next.position <= position))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StreamCursor: edges delivered over a channel
// ────────────────────────────────────────────────────────────────────────────

/// Cursor over edges arriving through a [`Receiver`]
///
/// Looking ahead (`sample_of_next_edge`, transition checks, absolute moves)
/// peeks the channel and blocks until the producer has delivered the next edge
/// or closed the stream.
pub struct StreamCursor {
    edges: Receiver<Sample>,
    current: Sample,
    position: u64,
}

impl StreamCursor {
    /// Create a cursor, blocking until the initial level has been received.
    pub fn new(mut edges: Receiver<Sample>) -> WorkResult<Self> {
        let current = edges.recv()?;
        Ok(Self {
            edges,
            current,
            position: current.position,
        })
    }

    /// Next edge that is an actual transition, leaving it buffered.
    fn peek_transition(&mut self) -> WorkResult<Sample> {
        loop {
            let next = *self.edges.peek()?;
            if next.value != self.current.value {
                return Ok(next);
            }
            // Repeated level carries no transition
            self.edges.recv()?;
        }
    }
}

impl ChannelCursor for StreamCursor {
    fn bit_state(&self) -> BitState {
        self.current.value.into()
    }

    fn sample_number(&self) -> u64 {
        self.position
    }

    fn advance_to_next_edge(&mut self) -> WorkResult<u64> {
        let next = self.peek_transition()?;
        self.edges.recv()?;
        self.current = next;
        self.position = next.position.max(self.position);
        Ok(self.position)
    }

    fn advance_to_abs_position(&mut self, position: u64) -> WorkResult<()> {
        if position <= self.position {
            return Ok(());
        }
        loop {
            match self.peek_transition() {
                Ok(next) if next.position <= position => {
                    self.edges.recv()?;
                    self.current = next;
                }
                Ok(_) | Err(WorkError::Shutdown) => break,
                Err(e) => return Err(e),
            }
        }
        self.position = position;
        Ok(())
    }

    fn sample_of_next_edge(&mut self) -> WorkResult<u64> {
        Ok(self.peek_transition()?.position)
    }

    fn would_advancing_to_abs_position_cause_transition(
        &mut self,
        position: u64,
    ) -> WorkResult<bool> {
        match self.peek_transition() {
            Ok(next) => Ok(next.position <= position),
            Err(WorkError::Shutdown) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sender::ChannelMessage;
    use crossbeam_channel::bounded;
    use std::sync::Arc;

    fn edges() -> Vec<Sample> {
        vec![
            Sample::new(true, 0),
            Sample::new(false, 10),
            Sample::new(true, 20),
            Sample::new(false, 30),
        ]
    }

    #[test]
    fn test_edge_cursor_walk() {
        let mut cursor = EdgeCursor::new(edges());
        assert_eq!(cursor.bit_state(), BitState::High);
        assert_eq!(cursor.sample_number(), 0);
        assert_eq!(cursor.sample_of_next_edge().unwrap(), 10);

        assert_eq!(cursor.advance_to_next_edge().unwrap(), 10);
        assert_eq!(cursor.bit_state(), BitState::Low);

        cursor.advance_to_abs_position(25).unwrap();
        assert_eq!(cursor.sample_number(), 25);
        assert_eq!(cursor.bit_state(), BitState::High);

        // Never moves backward
        cursor.advance_to_abs_position(5).unwrap();
        assert_eq!(cursor.sample_number(), 25);

        assert_eq!(cursor.advance_to_next_edge().unwrap(), 30);
        assert!(matches!(
            cursor.advance_to_next_edge(),
            Err(WorkError::Shutdown)
        ));
        assert!(cursor.sample_of_next_edge().is_err());
    }

    #[test]
    fn test_edge_cursor_would_transition() {
        let mut cursor = EdgeCursor::new(edges());
        assert!(!cursor.would_advancing_to_abs_position_cause_transition(9).unwrap());
        assert!(cursor.would_advancing_to_abs_position_cause_transition(10).unwrap());

        cursor.advance_to_abs_position(35).unwrap();
        assert!(!cursor.would_advancing_to_abs_position_cause_transition(1000).unwrap());
    }

    #[test]
    fn test_edge_cursor_drops_repeats() {
        let cursor = EdgeCursor::new(vec![
            Sample::new(false, 0),
            Sample::new(false, 5),
            Sample::new(true, 8),
            Sample::new(true, 9),
        ]);
        assert_eq!(cursor.num_transitions(), 1);
    }

    #[test]
    fn test_edge_cursor_from_blocks() {
        // 0b1111_0000 then 0b0000_0011, LSB first
        let blocks = [
            SampleBlock::new(Arc::from(vec![0xF0u8]), 0, 8),
            SampleBlock::new(Arc::from(vec![0x03u8]), 8, 8),
        ];
        let mut cursor = EdgeCursor::from_blocks(&blocks);
        assert_eq!(cursor.bit_state(), BitState::Low);
        assert_eq!(cursor.num_transitions(), 2);
        assert_eq!(cursor.advance_to_next_edge().unwrap(), 4);
        assert_eq!(cursor.bit_state(), BitState::High);
        // Level carries over the block boundary
        assert_eq!(cursor.advance_to_next_edge().unwrap(), 10);
        assert_eq!(cursor.bit_state(), BitState::Low);
    }

    #[test]
    fn test_empty_edge_cursor_is_low() {
        let mut cursor = EdgeCursor::new(Vec::new());
        assert_eq!(cursor.bit_state(), BitState::Low);
        assert!(cursor.advance_to_next_edge().is_err());
    }

    #[test]
    fn test_stream_cursor_matches_edge_cursor() {
        let (tx, rx) = bounded::<ChannelMessage<Sample>>(16);
        for edge in edges() {
            tx.send(ChannelMessage::Sample(edge)).unwrap();
        }
        tx.send(ChannelMessage::EndOfStream).unwrap();

        let mut cursor = StreamCursor::new(Receiver::new(rx)).unwrap();
        assert_eq!(cursor.bit_state(), BitState::High);
        assert!(cursor.would_advancing_to_abs_position_cause_transition(10).unwrap());
        assert_eq!(cursor.advance_to_next_edge().unwrap(), 10);

        cursor.advance_to_abs_position(25).unwrap();
        assert_eq!(cursor.bit_state(), BitState::High);
        assert_eq!(cursor.sample_of_next_edge().unwrap(), 30);

        cursor.advance_to_abs_position(100).unwrap();
        assert_eq!(cursor.bit_state(), BitState::Low);
        assert!(!cursor.would_advancing_to_abs_position_cause_transition(500).unwrap());
        assert!(matches!(
            cursor.advance_to_next_edge(),
            Err(WorkError::Shutdown)
        ));
    }

    #[test]
    fn test_bit_state_conversions() {
        assert_eq!(BitState::from(true), BitState::High);
        assert!(!bool::from(BitState::Low));
        assert_eq!(!BitState::Low, BitState::High);
    }
}
