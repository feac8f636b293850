//! QSPI frame decoder
//!
//! Walks chip-enable, clock and up to four data lines in lock-step and turns
//! them into protocol frames.
//!
//! Flow per transaction:
//!   1. Resync: move enable to its next falling edge and check the clock is at
//!      its idle level there. A clock at the wrong level yields an Error frame
//!      spanning the enable-active window, and the next assertion is tried.
//!   2. Command byte, on DQ0 (Extended), DQ0..1 (Dual) or DQ0..3 (Quad).
//!      Unknown codes end the transaction after their Command frame.
//!   3. Address, if the command takes one.
//!   4. Dummy cycles, if the command uses them.
//!   5. Data units, 8 bits each, until chip-enable deasserts.
//!
//! Any field cut short by chip-enable is dropped and the decoder goes back to
//! step 1. Running out of input ends decoding with `WorkError::Shutdown`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Result;
use crate::runtime::{BitState, ChannelCursor, ProcessNode, WorkError, WorkResult};
use tracing::{debug, trace, warn};

use super::commands::CommandTable;
use super::field_reader::{Channels, FieldError, FieldReader};
use super::settings::QspiSettings;
use super::sink::FrameSink;
use super::types::{FieldResult, Frame, FrameKind, Marker, MarkerKind};

/// Running totals for one decode session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Transactions whose command byte was read
    pub transactions: u64,
    pub frames: u64,
    /// Fields or data units ended by chip-enable, including the normal end of
    /// a data phase
    pub aborted_fields: u64,
    pub polarity_errors: u64,
    pub invalid_commands: u64,
}

/// QSPI decoder over a set of channel cursors
///
/// Generic over the cursor type so the same state machine runs on in-memory
/// captures ([`EdgeCursor`](crate::runtime::EdgeCursor)) and live edge streams
/// ([`StreamCursor`](crate::runtime::StreamCursor)).
pub struct QspiDecoder<C, S> {
    name: String,
    settings: QspiSettings,
    commands: Arc<CommandTable>,
    reader: FieldReader<C>,
    sink: S,
    stats: DecodeStats,
}

impl<C: ChannelCursor, S: FrameSink> QspiDecoder<C, S> {
    /// Create a decoder. Fails if `settings` does not validate.
    pub fn new(
        settings: QspiSettings,
        commands: Arc<CommandTable>,
        channels: Channels<C>,
        sink: S,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            name: "qspi_decoder".to_string(),
            settings,
            commands,
            reader: FieldReader::new(channels),
            sink,
            stats: DecodeStats::default(),
        })
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn settings(&self) -> &QspiSettings {
        &self.settings
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Decode until the input runs out or `stop` is set.
    ///
    /// `stop` is checked between transactions. Exhausted input is a normal
    /// end; other errors (a failed sink) are returned.
    pub fn run(&mut self, stop: &AtomicBool) -> WorkResult<DecodeStats> {
        let result = loop {
            if stop.load(Ordering::Relaxed) {
                debug!("[{}] Stop requested", self.name);
                break Ok(self.stats);
            }
            match self.decode_transaction() {
                Ok(_) => {}
                Err(WorkError::Shutdown) => break Ok(self.stats),
                Err(e) => break Err(e),
            }
        };
        self.sink.finish();
        result
    }

    /// Resync to the next transaction and decode it.
    ///
    /// Returns the number of frames emitted, including any Error frames
    /// produced while resyncing.
    pub fn decode_transaction(&mut self) -> WorkResult<usize> {
        let frames_before = self.stats.frames;
        self.resync()?;

        match self.decode_phases() {
            Ok(()) => {}
            Err(FieldError::Deselected { at }) => {
                debug!("[{}] Chip enable released mid-field at {}", self.name, at);
                self.stats.aborted_fields += 1;
            }
            Err(FieldError::Input(e)) => return Err(e),
        }

        Ok((self.stats.frames - frames_before) as usize)
    }

    fn decode_phases(&mut self) -> std::result::Result<(), FieldError> {
        let mode = self.settings.mode;

        self.report_progress();
        let command = self.reader.read_field(mode.command_lines(), 8)?;
        self.stats.transactions += 1;
        self.save(FrameKind::Command, command)?;

        let code = command.value as u8;
        if !self.commands.is_valid(code) {
            debug!("[{}] Unknown command 0x{:02X}", self.name, code);
            self.stats.invalid_commands += 1;
            return Ok(());
        }

        let commands = Arc::clone(&self.commands);
        let attributes = commands.lookup(code);
        debug!(
            "[{}] #{} {} (0x{:02X}) at {}",
            self.name, self.stats.transactions, attributes.name, code, command.start_sample
        );

        if attributes.accepts_address {
            let lines = mode.fixed_lines().unwrap_or(attributes.address_lines);
            self.report_progress();
            let address = self.reader.read_field(lines, self.settings.address_bits())?;
            self.save(FrameKind::Address, address)?;
        }

        if attributes.uses_dummy_cycles {
            self.report_progress();
            let dummy = self.reader.read_dummy(self.settings.dummy_cycles)?;
            self.save(FrameKind::Dummy, dummy)?;
        }

        if attributes.has_data {
            let lines = mode.fixed_lines().unwrap_or(attributes.data_lines);
            // Ends when chip-enable deasserts or the input runs out
            loop {
                self.report_progress();
                let data = self.reader.read_field(lines, 8)?;
                trace!("[{}] data 0x{:02X}", self.name, data.value);
                self.save(FrameKind::Data, data)?;
            }
        }

        Ok(())
    }

    fn report_progress(&mut self) {
        let sample = self.reader.channels_mut().clock.sample_number();
        self.sink.report_progress(sample);
    }

    fn save(&mut self, kind: FrameKind, field: FieldResult) -> WorkResult<()> {
        if field.end_sample <= field.start_sample {
            trace!("[{}] Dropping empty {:?} field", self.name, kind);
            return Ok(());
        }

        for &sample in self.reader.arrows() {
            self.sink.add_marker(Marker::new(sample, MarkerKind::UpArrow));
        }
        self.emit(Frame::from_field(kind, field))
    }

    fn emit(&mut self, frame: Frame) -> WorkResult<()> {
        self.sink.emit(frame)?;
        self.sink.commit()?;
        self.stats.frames += 1;
        Ok(())
    }

    /// Move to the next active chip-enable edge with the clock at its idle level.
    fn resync(&mut self) -> WorkResult<()> {
        self.sink.commit()?;
        self.advance_to_active_enable_edge()?;
        while !self.is_initial_clock_polarity_correct()? {}
        Ok(())
    }

    fn advance_to_active_enable_edge(&mut self) -> WorkResult<()> {
        let channels = self.reader.channels_mut();
        let current = match channels.enable.as_mut() {
            Some(enable) => {
                // Enable is active low
                if enable.bit_state() == BitState::Low {
                    enable.advance_to_next_edge()?;
                }
                let sample = enable.advance_to_next_edge()?;
                channels.clock.advance_to_abs_position(sample)?;
                sample
            }
            None => channels.clock.sample_number(),
        };
        self.reader.set_current_sample(current);
        Ok(())
    }

    /// Check the clock idle level at the current position.
    ///
    /// On a mismatch with an enable line, emits an Error frame up to the next
    /// enable edge and moves to the following assertion; returns false so the
    /// caller checks again. An enable that never releases closes the frame at
    /// the last clock edge and ends decoding. Without enable, steps the clock one edge and
    /// accepts.
    fn is_initial_clock_polarity_correct(&mut self) -> WorkResult<bool> {
        let inactive = self.settings.clock_inactive_state;
        let current = self.reader.current_sample();
        let channels = self.reader.channels_mut();

        if channels.clock.bit_state() == inactive {
            return Ok(true);
        }

        self.sink
            .add_marker(Marker::new(current, MarkerKind::ErrorSquare));

        let Some(enable) = channels.enable.as_mut() else {
            let sample = channels.clock.advance_to_next_edge()?;
            self.reader.set_current_sample(sample);
            return Ok(true);
        };

        warn!(
            "[{}] Clock {} at chip-enable assertion {}, expected {}",
            self.name,
            channels.clock.bit_state(),
            current,
            inactive
        );

        self.stats.polarity_errors += 1;
        let end = match enable.advance_to_next_edge() {
            Ok(end) => end,
            Err(WorkError::Shutdown) => {
                // Enable never releases: close the frame at the last clock edge
                let mut last = current;
                while let Ok(sample) = channels.clock.advance_to_next_edge() {
                    last = sample;
                }
                if last > current {
                    self.emit(Frame::error(current, last))?;
                }
                return Err(WorkError::Shutdown);
            }
            Err(e) => return Err(e),
        };
        let next = enable.advance_to_next_edge();
        self.emit(Frame::error(current, end))?;
        self.sink.report_progress(end);

        let next = next?;
        let channels = self.reader.channels_mut();
        channels.clock.advance_to_abs_position(next)?;
        self.reader.set_current_sample(next);
        Ok(false)
    }
}

impl<C: ChannelCursor, S: FrameSink> ProcessNode for QspiDecoder<C, S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn work(&mut self) -> WorkResult<usize> {
        match self.decode_transaction() {
            Err(e) => {
                if !e.is_shutdown() {
                    warn!("[{}] Decoding stopped: {}", self.name, e);
                }
                self.sink.finish();
                Err(e)
            }
            ok => ok,
        }
    }
}
