//! Common decoder types and enums

use bitflags::bitflags;
use std::fmt;

use super::commands::LineMask;

/// Bus line mode
///
/// Selects which lines carry the command byte and whether address/data
/// lines come from the command table or are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMode {
    /// Command on DQ0, address/data lines per command
    #[default]
    Extended,
    /// Everything on DQ0 and DQ1
    Dual,
    /// Everything on DQ0 through DQ3
    Quad,
}

impl LineMode {
    /// Lines carrying the command byte
    pub fn command_lines(self) -> LineMask {
        match self {
            LineMode::Extended => LineMask::SINGLE,
            LineMode::Dual => LineMask::DUAL,
            LineMode::Quad => LineMask::QUAD,
        }
    }

    /// Lines for address and data phases, or `None` when the command decides
    pub fn fixed_lines(self) -> Option<LineMask> {
        match self {
            LineMode::Extended => None,
            LineMode::Dual => Some(LineMask::DUAL),
            LineMode::Quad => Some(LineMask::QUAD),
        }
    }
}

impl fmt::Display for LineMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LineMode::Extended => write!(f, "Extended"),
            LineMode::Dual => write!(f, "Dual"),
            LineMode::Quad => write!(f, "Quad"),
        }
    }
}

/// What a decoded frame represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Command,
    Address,
    Dummy,
    Data,
    /// Clock polarity violation at transaction start
    Error,
}

bitflags! {
    /// Display flags attached to a frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u8 {
        /// Render the frame as an error
        const DISPLAY_AS_ERROR = 1 << 7;
    }
}

/// One successfully decoded field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldResult {
    /// First data-valid clock edge of the field
    pub start_sample: u64,
    /// Last clock sample of the field
    pub end_sample: u64,
    pub value: u64,
}

/// Decoded QSPI frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub start_sample: u64,
    /// Inclusive end sample
    pub end_sample: u64,
    pub value: u64,
    pub kind: FrameKind,
    pub flags: FrameFlags,
}

impl Frame {
    /// Frame for a decoded field
    pub fn from_field(kind: FrameKind, field: FieldResult) -> Self {
        Self {
            start_sample: field.start_sample,
            end_sample: field.end_sample,
            value: field.value,
            kind,
            flags: FrameFlags::empty(),
        }
    }

    /// Error frame spanning `start_sample..=end_sample`
    pub fn error(start_sample: u64, end_sample: u64) -> Self {
        Self {
            start_sample,
            end_sample,
            value: 0,
            kind: FrameKind::Error,
            flags: FrameFlags::DISPLAY_AS_ERROR,
        }
    }

    pub fn is_error(&self) -> bool {
        self.flags.contains(FrameFlags::DISPLAY_AS_ERROR)
    }

    /// Number of samples covered
    pub fn duration(&self) -> u64 {
        self.end_sample.saturating_sub(self.start_sample)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?}[0x{:X}, {}..={}]",
            self.kind, self.value, self.start_sample, self.end_sample
        )
    }
}

/// Annotation shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Data-valid clock edge
    UpArrow,
    /// Clock polarity violation
    ErrorSquare,
}

/// Annotation placed on the clock channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub sample: u64,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn new(sample: u64, kind: MarkerKind) -> Self {
        Self { sample, kind }
    }
}
