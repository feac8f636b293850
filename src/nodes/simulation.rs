//! Simulated QSPI captures
//!
//! [`SimulationGenerator`] synthesizes bus waveforms (chip-enable framing,
//! clock, and data on up to four lines) for any command in a [`CommandTable`].
//! The result is a [`SimulatedCapture`]: one run-length edge list per line,
//! which can be walked in memory with [`EdgeCursor`]s or streamed to a decoder
//! thread through a [`SimulationSource`] node.
//!
//! Waveform shape per clock cycle: data lines change, half a cycle later the
//! clock makes its data-valid (leading) edge, another half cycle later the
//! trailing edge. After each field all data lines return low.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::nodes::decoders::{ChannelMap, Channels, CommandTable, LineMask, QspiSettings};
use crate::runtime::{
    BitState, EdgeCursor, ProcessNode, Receiver, Sample, SampleBlock, Sender, WorkError,
    WorkResult, unbounded_channel,
};
use crate::{QspiError, Result};
use tracing::{debug, info};

/// Sample rate reported for simulated captures
pub const DEFAULT_SAMPLE_RATE_HZ: u64 = 10_000_000;

/// Edge list under construction for one line
#[derive(Debug, Clone)]
struct LineTrace {
    edges: Vec<Sample>,
    level: bool,
}

impl LineTrace {
    fn new(level: bool) -> Self {
        Self {
            edges: vec![Sample::new(level, 0)],
            level,
        }
    }

    fn set(&mut self, level: bool, position: u64) {
        if level != self.level {
            self.edges.push(Sample::new(level, position));
            self.level = level;
        }
    }

    fn toggle(&mut self, position: u64) {
        self.set(!self.level, position);
    }
}

/// Waveform builder for QSPI transactions
pub struct SimulationGenerator {
    settings: QspiSettings,
    commands: Arc<CommandTable>,
    sample_rate_hz: u64,
    half_cycle: u64,
    position: u64,
    enable: LineTrace,
    clock: LineTrace,
    dq: [LineTrace; 4],
}

impl SimulationGenerator {
    /// Samples per half clock period unless overridden
    pub const DEFAULT_HALF_CYCLE: u64 = 5;

    /// Start a trace: enable high, clock idle, data low, then ten half-cycles
    /// of idle.
    pub fn new(settings: QspiSettings, commands: Arc<CommandTable>) -> Self {
        let clock_idle = settings.clock_inactive_state.into();
        let mut generator = Self {
            settings,
            commands,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            half_cycle: Self::DEFAULT_HALF_CYCLE,
            position: 0,
            enable: LineTrace::new(true),
            clock: LineTrace::new(clock_idle),
            dq: std::array::from_fn(|_| LineTrace::new(false)),
        };
        generator.idle(10);
        generator
    }

    /// Half clock period in samples, at least 1. Applies from the next step on.
    pub fn with_half_cycle(mut self, samples: u64) -> Self {
        self.half_cycle = samples.max(1);
        self
    }

    pub fn with_sample_rate(mut self, hz: u64) -> Self {
        self.sample_rate_hz = hz;
        self
    }

    /// Current end of the trace
    pub fn position(&self) -> u64 {
        self.position
    }

    fn advance(&mut self, half_cycles: u64) {
        self.position += half_cycles * self.half_cycle;
    }

    /// Hold every line for `half_cycles` half periods.
    pub fn idle(&mut self, half_cycles: u64) {
        self.advance(half_cycles);
    }

    /// Assert chip-enable.
    pub fn begin(&mut self) {
        self.enable.set(false, self.position);
        self.advance(2);
    }

    /// Release chip-enable.
    pub fn end(&mut self) {
        self.enable.set(true, self.position);
        self.advance(1);
    }

    /// Drive the clock to `state` outside of any cycle.
    pub fn force_clock(&mut self, state: BitState) {
        self.clock.set(state.into(), self.position);
        self.advance(1);
    }

    fn clock_cycle(&mut self) {
        self.advance(1);
        self.clock.toggle(self.position);
        self.advance(1);
        self.clock.toggle(self.position);
    }

    /// Shift `bits` bits of `value` out MSB-first over `lines`, DQ3 first
    /// within each cycle.
    pub fn output_field(&mut self, value: u64, bits: u32, lines: LineMask) {
        let width = lines.line_count().max(1);
        let mut remaining = bits;

        for _ in 0..bits / width {
            for line in (0..4).rev() {
                if !lines.contains(LineMask::line(line)) {
                    continue;
                }
                remaining -= 1;
                let bit = (value >> remaining) & 1 == 1;
                self.dq[line].set(bit, self.position);
            }
            self.clock_cycle();
        }

        for line in &mut self.dq {
            line.set(false, self.position);
        }
        self.advance(1);
    }

    /// Clock `cycles` cycles with the data lines untouched.
    pub fn dummy_cycles(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.clock_cycle();
        }
    }

    /// One framed transaction.
    ///
    /// The phases after the command byte follow the command table and the
    /// configured mode; codes missing from the table get the command byte only.
    /// `address` is truncated to the configured address width.
    pub fn transaction(&mut self, command: u8, address: u64, data: &[u8]) {
        let mode = self.settings.mode;
        self.begin();
        self.output_field(command.into(), 8, mode.command_lines());

        if self.commands.is_valid(command) {
            let attributes = self.commands.lookup(command).clone();

            if attributes.accepts_address {
                let bits = self.settings.address_bits();
                let lines = mode.fixed_lines().unwrap_or(attributes.address_lines);
                let mask = (1u64 << bits) - 1;
                self.output_field(address & mask, bits, lines);
            }

            if attributes.uses_dummy_cycles {
                self.dummy_cycles(self.settings.dummy_cycles);
            }

            if attributes.has_data {
                let lines = mode.fixed_lines().unwrap_or(attributes.data_lines);
                for byte in data {
                    self.output_field((*byte).into(), 8, lines);
                }
            }
        }

        self.end();
    }

    /// One transaction per table command, in code order, with idle gaps.
    pub fn cycle_commands(&mut self, address: u64, data: &[u8]) {
        let codes: Vec<u8> = self.commands.codes().collect();
        for code in codes {
            self.transaction(code, address, data);
            self.idle(20);
        }
    }

    pub fn finish(self) -> SimulatedCapture {
        debug!(
            "Simulated {} samples, {} clock edges",
            self.position,
            self.clock.edges.len() - 1
        );
        let [dq0, dq1, dq2, dq3] = self.dq;
        SimulatedCapture {
            map: self.settings.channels,
            sample_rate_hz: self.sample_rate_hz,
            num_samples: self.position,
            enable: self.enable.edges,
            clock: self.clock.edges,
            dq: [dq0.edges, dq1.edges, dq2.edges, dq3.edges],
        }
    }
}

/// Edge lists of a finished simulation, addressed by channel number
#[derive(Debug, Clone)]
pub struct SimulatedCapture {
    map: ChannelMap,
    sample_rate_hz: u64,
    num_samples: u64,
    enable: Vec<Sample>,
    clock: Vec<Sample>,
    dq: [Vec<Sample>; 4],
}

impl SimulatedCapture {
    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    pub fn sample_rate_hz(&self) -> u64 {
        self.sample_rate_hz
    }

    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Edges of capture channel `channel`, if the channel map assigns it
    pub fn edges(&self, channel: usize) -> Option<&[Sample]> {
        if self.map.enable == Some(channel) {
            return Some(self.enable.as_slice());
        }
        if self.map.clock == channel {
            return Some(self.clock.as_slice());
        }
        self.map
            .dq
            .iter()
            .position(|dq| *dq == Some(channel))
            .map(|line| self.dq[line].as_slice())
    }

    pub fn cursor(&self, channel: usize) -> Result<EdgeCursor> {
        self.edges(channel)
            .map(|edges| EdgeCursor::new(edges.to_vec()))
            .ok_or_else(|| QspiError::MissingChannel(format!("channel {}", channel)))
    }

    /// In-memory cursors for every assigned channel
    pub fn channels(&self) -> Result<Channels<EdgeCursor>> {
        Channels::open(&self.map, |channel| self.cursor(channel))
    }

    /// Pack one channel into LSB-first blocks of `block_samples` samples.
    pub fn to_blocks(&self, channel: usize, block_samples: usize) -> Result<Vec<SampleBlock>> {
        let edges = self
            .edges(channel)
            .ok_or_else(|| QspiError::MissingChannel(format!("channel {}", channel)))?;
        let block_samples = block_samples.max(8);

        let mut blocks = Vec::new();
        let mut edge = 0;
        let mut start = 0u64;
        while start < self.num_samples {
            let count = block_samples.min((self.num_samples - start) as usize);
            let mut data = vec![0u8; count.div_ceil(8)];
            for offset in 0..count {
                let position = start + offset as u64;
                while edges.get(edge + 1).is_some_and(|next| next.position <= position) {
                    edge += 1;
                }
                if edges[edge].value {
                    data[offset / 8] |= 1 << (offset % 8);
                }
            }
            blocks.push(SampleBlock::new(Arc::from(data), start, count));
            start += count as u64;
        }
        Ok(blocks)
    }
}

/// Source node streaming a [`SimulatedCapture`] edge by edge
///
/// Edges of all channels go out interleaved in sample order, so a decoder
/// reading several [`StreamCursor`](crate::runtime::StreamCursor)s never waits
/// on one channel while another holds undelivered earlier edges.
pub struct SimulationSource {
    name: String,
    /// (output index, edge), ordered by position
    edges: Vec<(usize, Sample)>,
    outputs: Vec<Sender<Sample>>,
    next: usize,
    batch_size: usize,
}

impl SimulationSource {
    /// Source for every assigned channel, plus the receiving ends keyed by
    /// channel number.
    pub fn new(capture: &SimulatedCapture) -> (Self, BTreeMap<usize, Receiver<Sample>>) {
        let mut outputs = Vec::new();
        let mut receivers = BTreeMap::new();
        let mut edges = Vec::new();

        for (_, channel) in capture.map.assigned() {
            let Some(channel_edges) = capture.edges(channel) else {
                continue;
            };
            let (tx, rx) = unbounded_channel();
            let output = outputs.len();
            outputs.push(tx);
            receivers.insert(channel, rx);
            edges.extend(channel_edges.iter().map(|edge| (output, *edge)));
        }
        edges.sort_by_key(|(_, edge)| edge.position);

        let source = Self {
            name: "simulation_source".to_string(),
            edges,
            outputs,
            next: 0,
            batch_size: 256,
        };
        (source, receivers)
    }

    /// Edges sent per `work()` call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn remaining(&self) -> usize {
        self.edges.len() - self.next
    }
}

impl ProcessNode for SimulationSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn work(&mut self) -> WorkResult<usize> {
        if self.next >= self.edges.len() {
            for output in &self.outputs {
                output.close();
            }
            info!("[{}] Sent {} edges", self.name, self.edges.len());
            return Err(WorkError::Shutdown);
        }

        let end = (self.next + self.batch_size).min(self.edges.len());
        for (output, edge) in &self.edges[self.next..end] {
            self.outputs[*output].send(*edge)?;
        }
        let sent = end - self.next;
        self.next = end;
        Ok(sent)
    }
}
