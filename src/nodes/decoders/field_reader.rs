//! Multi-line field reader
//!
//! Reads one protocol field (command, address, a data unit, or a run of dummy
//! cycles) by stepping the clock a cycle at a time and sampling the selected
//! DQ lines on each data-valid edge.
//!
//! Before every clock step the reader asks the enable cursor whether chip-enable
//! would toggle before that clock edge. If it would, the field is abandoned with
//! [`FieldError::Deselected`] and nothing of it is kept.

use crate::runtime::{ChannelCursor, WorkError, WorkResult};
use crate::Result;
use tracing::trace;

use super::commands::LineMask;
use super::settings::ChannelMap;
use super::types::FieldResult;

/// Why a field could not be completed
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("chip enable toggled mid-field at sample {at}")]
    Deselected { at: u64 },

    #[error(transparent)]
    Input(#[from] WorkError),
}

/// Cursors for every bus line
pub struct Channels<C> {
    pub enable: Option<C>,
    pub clock: C,
    /// DQ0..DQ3
    pub dq: [Option<C>; 4],
}

impl<C> Channels<C> {
    /// Open a cursor for every assigned channel in `map`.
    pub fn open(map: &ChannelMap, mut open: impl FnMut(usize) -> Result<C>) -> Result<Self> {
        let enable = map.enable.map(&mut open).transpose()?;
        let clock = open(map.clock)?;
        let mut dq = [None, None, None, None];
        for (slot, channel) in dq.iter_mut().zip(map.dq) {
            *slot = channel.map(&mut open).transpose()?;
        }
        Ok(Self { enable, clock, dq })
    }
}

/// Packs sampled bits MSB-first into a fixed-width word.
///
/// Bits that are never added (lines not captured) leave the low end zero.
struct BitPacker {
    value: u64,
    mask: u64,
}

impl BitPacker {
    fn new(total_bits: u32) -> Self {
        let mask = match total_bits {
            0 => 0,
            bits => 1u64 << (bits.min(64) - 1),
        };
        Self { value: 0, mask }
    }

    fn add_bit(&mut self, bit: bool) {
        if bit {
            self.value |= self.mask;
        }
        self.mask >>= 1;
    }
}

/// Clock-synchronous reader over a set of line cursors
pub struct FieldReader<C> {
    channels: Channels<C>,
    current_sample: u64,
    /// Data-valid edges of the most recent field
    arrows: Vec<u64>,
}

impl<C: ChannelCursor> FieldReader<C> {
    pub fn new(channels: Channels<C>) -> Self {
        let current_sample = channels.clock.sample_number();
        Self {
            channels,
            current_sample,
            arrows: Vec::new(),
        }
    }

    pub fn channels_mut(&mut self) -> &mut Channels<C> {
        &mut self.channels
    }

    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    pub fn set_current_sample(&mut self, sample: u64) {
        self.current_sample = sample;
    }

    /// Data-valid clock edges of the last field read
    pub fn arrows(&self) -> &[u64] {
        &self.arrows
    }

    /// Whether chip-enable transitions before the clock's next edge.
    ///
    /// Always false without an enable line.
    pub fn would_advancing_clock_toggle_enable(&mut self) -> WorkResult<bool> {
        let Some(enable) = self.channels.enable.as_mut() else {
            return Ok(false);
        };
        let next_edge = self.channels.clock.sample_of_next_edge()?;
        enable.would_advancing_to_abs_position_cause_transition(next_edge)
    }

    fn ensure_selected(&mut self) -> std::result::Result<(), FieldError> {
        if self.would_advancing_clock_toggle_enable()? {
            return Err(FieldError::Deselected {
                at: self.channels.clock.sample_number(),
            });
        }
        Ok(())
    }

    /// Read `total_bits` bits spread over the lines in `lines`.
    ///
    /// Takes `total_bits / lines` clock cycles. Within a cycle the lines are
    /// sampled DQ3 first, down to DQ0.
    pub fn read_field(
        &mut self,
        lines: LineMask,
        total_bits: u32,
    ) -> std::result::Result<FieldResult, FieldError> {
        debug_assert!(!lines.is_empty(), "field read with no data lines");
        let cycles = total_bits / lines.line_count().max(1);
        let mut packer = BitPacker::new(total_bits);

        let (start_sample, end_sample) = self.clock_cycles(cycles, |channels, sample| {
            for line in (0..4).rev() {
                if !lines.contains(LineMask::line(line)) {
                    continue;
                }
                if let Some(dq) = channels.dq[line].as_mut() {
                    dq.advance_to_abs_position(sample)?;
                    packer.add_bit(dq.bit_state().into());
                }
            }
            Ok(())
        })?;

        trace!(
            "field {:?} x{} bits: 0x{:X} [{}..={}]",
            lines, total_bits, packer.value, start_sample, end_sample
        );

        Ok(FieldResult {
            start_sample,
            end_sample,
            value: packer.value,
        })
    }

    /// Clock `cycles` dummy cycles without sampling any data line.
    pub fn read_dummy(&mut self, cycles: u32) -> std::result::Result<FieldResult, FieldError> {
        let (start_sample, end_sample) = self.clock_cycles(cycles, |_, _| Ok(()))?;
        Ok(FieldResult {
            start_sample,
            end_sample,
            value: 0,
        })
    }

    /// Step the clock through `cycles` full cycles, calling `on_valid_edge` at
    /// each data-valid (leading) edge. Returns the first leading edge and the
    /// final clock position.
    fn clock_cycles<F>(
        &mut self,
        cycles: u32,
        mut on_valid_edge: F,
    ) -> std::result::Result<(u64, u64), FieldError>
    where
        F: FnMut(&mut Channels<C>, u64) -> WorkResult<()>,
    {
        self.arrows.clear();
        let mut first_sample = None;

        for _ in 0..cycles {
            self.ensure_selected()?;

            let sample = self.channels.clock.advance_to_next_edge()?;
            first_sample.get_or_insert(sample);
            self.current_sample = sample;

            on_valid_edge(&mut self.channels, sample)?;
            self.arrows.push(sample);

            self.ensure_selected()?;
            self.channels.clock.advance_to_next_edge()?;
        }

        let end_sample = self.channels.clock.sample_number();
        Ok((first_sample.unwrap_or(end_sample), end_sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{EdgeCursor, Sample};

    /// Clock toggling every `half` samples starting at `start`, `edges` transitions.
    fn clock(start: u64, half: u64, edges: usize) -> EdgeCursor {
        let mut samples = vec![Sample::new(false, 0)];
        for i in 0..edges {
            samples.push(Sample::new(i % 2 == 0, start + i as u64 * half));
        }
        EdgeCursor::new(samples)
    }

    /// Data line presenting `bits` (MSB first), one bit per clock period.
    fn line(bits: &[bool], start: u64, period: u64) -> EdgeCursor {
        let mut samples = vec![Sample::new(false, 0)];
        for (i, bit) in bits.iter().enumerate() {
            samples.push(Sample::new(*bit, start + i as u64 * period));
        }
        EdgeCursor::new(samples)
    }

    fn bits_of(value: u8, count: usize) -> Vec<bool> {
        (0..count).rev().map(|i| (value >> i) & 1 == 1).collect()
    }

    #[test]
    fn test_single_line_byte() {
        // Data changes at 5, 15, ...; leading clock edges at 10, 20, ...
        let channels = Channels {
            enable: None,
            clock: clock(10, 5, 16),
            dq: [Some(line(&bits_of(0xA5, 8), 5, 10)), None, None, None],
        };
        let mut reader = FieldReader::new(channels);

        let field = reader.read_field(LineMask::SINGLE, 8).unwrap();
        assert_eq!(field.value, 0xA5);
        assert_eq!(field.start_sample, 10);
        assert_eq!(field.end_sample, 85);
        assert_eq!(reader.arrows().len(), 8);
    }

    #[test]
    fn test_quad_lines_pack_dq3_first() {
        // 0xEB over four lines: cycle 0 = 1110, cycle 1 = 1011
        let dq3 = line(&[true, true], 5, 10);
        let dq2 = line(&[true, false], 5, 10);
        let dq1 = line(&[true, true], 5, 10);
        let dq0 = line(&[false, true], 5, 10);
        let channels = Channels {
            enable: None,
            clock: clock(10, 5, 4),
            dq: [Some(dq0), Some(dq1), Some(dq2), Some(dq3)],
        };
        let mut reader = FieldReader::new(channels);

        let field = reader.read_field(LineMask::QUAD, 8).unwrap();
        assert_eq!(field.value, 0xEB);
        assert_eq!(field.start_sample, 10);
        assert_eq!(field.end_sample, 25);
    }

    #[test]
    fn test_missing_line_leaves_low_bits_clear() {
        let channels = Channels {
            enable: None,
            clock: clock(10, 5, 8),
            dq: [None, Some(line(&[true, true, true, true], 5, 10)), None, None],
        };
        let mut reader = FieldReader::new(channels);

        // DQ0 absent: only the DQ1 bits are packed, from the top
        let field = reader.read_field(LineMask::DUAL, 8).unwrap();
        assert_eq!(field.value, 0xF0);
    }

    #[test]
    fn test_deselect_aborts_field() {
        // Enable drops at 2 and rises at 32, mid-way through the byte
        let enable = EdgeCursor::new(vec![
            Sample::new(true, 0),
            Sample::new(false, 2),
            Sample::new(true, 32),
        ]);
        let mut channels = Channels {
            enable: Some(enable),
            clock: clock(10, 5, 16),
            dq: [Some(line(&bits_of(0xFF, 8), 5, 10)), None, None, None],
        };
        channels
            .enable
            .as_mut()
            .unwrap()
            .advance_to_next_edge()
            .unwrap();
        let mut reader = FieldReader::new(channels);

        match reader.read_field(LineMask::SINGLE, 8) {
            Err(FieldError::Deselected { at }) => assert_eq!(at, 30),
            other => panic!("expected deselect, got {:?}", other),
        }
    }

    #[test]
    fn test_dummy_cycles_span() {
        let channels = Channels {
            enable: None,
            clock: clock(10, 5, 6),
            dq: [None, None, None, None],
        };
        let mut reader = FieldReader::new(channels);

        let field = reader.read_dummy(3).unwrap();
        assert_eq!(field.value, 0);
        assert_eq!(field.start_sample, 10);
        assert_eq!(field.end_sample, 35);
    }

    #[test]
    fn test_clock_exhaustion_is_shutdown() {
        let channels = Channels {
            enable: None,
            clock: clock(10, 5, 3),
            dq: [None, None, None, None],
        };
        let mut reader = FieldReader::new(channels);

        assert!(matches!(
            reader.read_dummy(2),
            Err(FieldError::Input(WorkError::Shutdown))
        ));
    }

    #[test]
    fn test_open_channels_from_map() {
        let map = ChannelMap {
            enable: None,
            clock: 3,
            dq: [Some(0), None, Some(2), None],
        };
        let channels = Channels::open(&map, |channel| Ok(channel)).unwrap();
        assert_eq!(channels.enable, None);
        assert_eq!(channels.clock, 3);
        assert_eq!(channels.dq, [Some(0), None, Some(2), None]);
    }
}
