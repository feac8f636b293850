//! Human-readable frame text and CSV export

use std::io::Write;
use std::sync::Arc;

use crate::{QspiError, Result};

use super::commands::CommandTable;
use super::settings::QspiSettings;
use super::types::{Frame, FrameKind};

/// Analyzer name shown to users
pub const ANALYZER_NAME: &str = "QSPI";

/// Lowest capture rate the decoder is offered for
pub const MIN_SAMPLE_RATE_HZ: u64 = 10_000;

/// Radix for rendered values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayBase {
    Binary,
    Decimal,
    #[default]
    Hexadecimal,
}

/// Render `value` as a `bits`-wide number.
///
/// Binary and hexadecimal are zero-padded to the full width.
pub fn number_string(value: u64, base: DisplayBase, bits: u32) -> String {
    match base {
        DisplayBase::Binary => format!("0b{:0width$b}", value, width = bits as usize),
        DisplayBase::Decimal => value.to_string(),
        DisplayBase::Hexadecimal => {
            format!("0x{:0width$X}", value, width = bits.div_ceil(4) as usize)
        }
    }
}

/// Seconds from the trigger to `sample`, negative before the trigger.
pub fn time_string(sample: u64, trigger_sample: u64, sample_rate_hz: u64) -> String {
    let offset = sample as f64 - trigger_sample as f64;
    format!("{:.9}", offset / sample_rate_hz as f64)
}

/// Renders frames for display and export
#[derive(Debug, Clone)]
pub struct FrameFormatter {
    commands: Arc<CommandTable>,
    address_bits: u32,
    base: DisplayBase,
}

impl FrameFormatter {
    pub fn new(commands: Arc<CommandTable>, settings: &QspiSettings) -> Self {
        Self {
            commands,
            address_bits: settings.address_bits(),
            base: DisplayBase::default(),
        }
    }

    pub fn with_base(mut self, base: DisplayBase) -> Self {
        self.base = base;
        self
    }

    pub fn base(&self) -> DisplayBase {
        self.base
    }

    fn number(&self, frame: &Frame) -> String {
        let bits = match frame.kind {
            FrameKind::Address => self.address_bits,
            _ => 8,
        };
        number_string(frame.value, self.base, bits)
    }

    /// Label strings for a frame, shortest first
    pub fn bubble_text(&self, frame: &Frame) -> Vec<String> {
        let number = self.number(frame);
        match frame.kind {
            FrameKind::Command => {
                let name = &self.commands.lookup(frame.value as u8).name;
                vec![
                    number.clone(),
                    format!("Cmd: {}", number),
                    format!("Command: {} {}", number, name),
                ]
            }
            FrameKind::Address => vec![
                number.clone(),
                format!("Addr: {}", number),
                format!("Address: {}", number),
            ],
            FrameKind::Dummy => vec!["Dummy".to_string(), "Dummy Cycles".to_string()],
            FrameKind::Data => vec![number.clone(), format!("Data: {}", number)],
            FrameKind::Error => vec![
                "!".to_string(),
                "Error".to_string(),
                "Clock polarity error".to_string(),
            ],
        }
    }

    /// Single-line description for a results table
    pub fn tabular_text(&self, frame: &Frame) -> String {
        let number = self.number(frame);
        match frame.kind {
            FrameKind::Command => format!(
                "Command: {} {}",
                number,
                self.commands.lookup(frame.value as u8).name
            ),
            FrameKind::Address => format!("Address: {}", number),
            FrameKind::Dummy => "Dummy Cycles".to_string(),
            FrameKind::Data => format!("Data: {}", number),
            FrameKind::Error => "Clock polarity error".to_string(),
        }
    }

    /// Write `Time [s],Value` rows, one per frame.
    pub fn export_csv<W: Write>(
        &self,
        frames: &[Frame],
        mut writer: W,
        sample_rate_hz: u64,
        trigger_sample: u64,
    ) -> Result<()> {
        if sample_rate_hz == 0 {
            return Err(QspiError::InvalidSettings(
                "sample rate must be non-zero".to_string(),
            ));
        }

        writeln!(writer, "Time [s],Value")?;
        for frame in frames {
            writeln!(
                writer,
                "{},{}",
                time_string(frame.start_sample, trigger_sample, sample_rate_hz),
                self.number(frame)
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::types::FieldResult;

    fn formatter() -> FrameFormatter {
        FrameFormatter::new(Arc::new(CommandTable::default()), &QspiSettings::default())
    }

    fn frame(kind: FrameKind, value: u64, start: u64) -> Frame {
        Frame::from_field(
            kind,
            FieldResult {
                start_sample: start,
                end_sample: start + 8,
                value,
            },
        )
    }

    #[test]
    fn test_number_string_bases() {
        assert_eq!(number_string(0x0B, DisplayBase::Hexadecimal, 8), "0x0B");
        assert_eq!(number_string(0xBEADED, DisplayBase::Hexadecimal, 24), "0xBEADED");
        assert_eq!(number_string(5, DisplayBase::Binary, 8), "0b00000101");
        assert_eq!(number_string(235, DisplayBase::Decimal, 8), "235");
    }

    #[test]
    fn test_time_string() {
        assert_eq!(time_string(1_500, 500, 1_000_000), "0.001000000");
        assert_eq!(time_string(0, 10, 10), "-1.000000000");
    }

    #[test]
    fn test_command_text_includes_name() {
        let formatter = formatter();
        let command = frame(FrameKind::Command, 0xEB, 0);
        assert_eq!(
            formatter.bubble_text(&command),
            vec!["0xEB", "Cmd: 0xEB", "Command: 0xEB Quad I/O Fast Read"]
        );
        assert_eq!(
            formatter.tabular_text(&command),
            "Command: 0xEB Quad I/O Fast Read"
        );
    }

    #[test]
    fn test_kinds_render_independently() {
        let formatter = formatter().with_base(DisplayBase::Decimal);
        assert_eq!(
            formatter.bubble_text(&frame(FrameKind::Address, 4096, 0)),
            vec!["4096", "Addr: 4096", "Address: 4096"]
        );
        assert_eq!(
            formatter.bubble_text(&frame(FrameKind::Dummy, 0, 0)),
            vec!["Dummy", "Dummy Cycles"]
        );
        assert_eq!(formatter.tabular_text(&frame(FrameKind::Data, 7, 0)), "Data: 7");
        assert!(formatter.tabular_text(&Frame::error(0, 9)).contains("polarity"));
    }

    #[test]
    fn test_export_csv() {
        let frames = vec![
            frame(FrameKind::Command, 0x03, 100),
            frame(FrameKind::Address, 0x001000, 200),
            frame(FrameKind::Data, 0xA5, 300),
        ];
        let mut out = Vec::new();
        formatter()
            .export_csv(&frames, &mut out, 1_000, 100)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Time [s],Value");
        assert_eq!(lines[1], "0.000000000,0x03");
        assert_eq!(lines[2], "0.100000000,0x001000");
        assert_eq!(lines[3], "0.200000000,0xA5");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_export_rejects_zero_rate() {
        assert!(formatter().export_csv(&[], Vec::new(), 0, 0).is_err());
    }
}
