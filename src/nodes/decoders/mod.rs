//! QSPI protocol decoding
//!
//! - [`commands`]: command code to transaction shape
//! - [`field_reader`]: clock-synchronous multi-line bit packing
//! - [`qspi_decoder`]: enable framing and phase sequencing
//! - [`results`]: display text and CSV export

pub mod commands;
pub mod field_reader;
pub mod qspi_decoder;
pub mod results;
pub mod settings;
pub mod sink;
pub mod types;

// Re-export common types
pub use commands::{CommandAttributes, CommandTable, INVALID_COMMAND_CODE, LineMask};
pub use field_reader::{Channels, FieldError, FieldReader};
pub use results::{ANALYZER_NAME, DisplayBase, FrameFormatter, MIN_SAMPLE_RATE_HZ};
pub use settings::{ChannelMap, QspiSettings};
pub use sink::{ChannelSink, FrameCollector, FrameSink};
pub use types::{FieldResult, Frame, FrameFlags, FrameKind, LineMode, Marker, MarkerKind};

// Re-export decoders
pub use qspi_decoder::{DecodeStats, QspiDecoder};
