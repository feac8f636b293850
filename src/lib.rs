//! QSPI bus trace decoder with a streaming node runtime
//!
//! Decodes captured Quad/Dual/Extended SPI traffic (chip-enable, clock and up
//! to four data lines) into command, address, dummy and data frames.
//!
//! # Architecture
//!
//! - **Cursors**: per-channel edge-addressable positions ([`ChannelCursor`]),
//!   over an in-memory capture or a live edge stream
//! - **Decoder**: [`QspiDecoder`] drives the cursors through each transaction
//!   and hands frames to a [`FrameSink`]
//! - **Scheduler**: runs sources, decoders and sinks thread-per-node
//! - **Simulation**: [`SimulationGenerator`] builds test traces
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use qspi::{CommandTable, FrameCollector, LineMode, QspiDecoder, QspiSettings, SimulationGenerator};
//!
//! let settings = QspiSettings::default().with_mode(LineMode::Quad);
//! let commands = Arc::new(CommandTable::default());
//!
//! let mut generator = SimulationGenerator::new(settings.clone(), Arc::clone(&commands));
//! generator.transaction(0xEB, 0xBEADED, &[0xDE]);
//! let capture = generator.finish();
//!
//! let mut decoder = QspiDecoder::new(settings, commands, capture.channels()?, FrameCollector::new())?;
//! decoder.run(&AtomicBool::new(false))?;
//! for frame in decoder.sink().frames() {
//!     println!("{}", frame);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

// Re-export decoder data types
pub use nodes::decoders::{
    ChannelMap, CommandAttributes, CommandTable, DisplayBase, Frame, FrameFlags, FrameKind,
    LineMask, LineMode, Marker, MarkerKind, QspiSettings,
};

// Re-export data types from runtime
pub use runtime::{BitState, ChannelCursor, EdgeCursor, Sample, StreamCursor};

// Re-export simulation
pub use nodes::{SimulatedCapture, SimulationGenerator, SimulationSource};

// Re-export decoders and sinks
pub use nodes::decoders::{
    ChannelSink, Channels, DecodeStats, FrameCollector, FrameFormatter, FrameSink, QspiDecoder,
};

// Re-export streaming runtime components
pub use runtime::{ProcessNode, Scheduler, WorkError, WorkResult};

#[derive(Error, Debug)]
pub enum QspiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid command 0x{code:02X}: {reason}")]
    InvalidCommand { code: u8, reason: String },

    #[error("Missing channel: {0}")]
    MissingChannel(String),

    #[error(transparent)]
    Work(#[from] WorkError),
}

pub type Result<T> = std::result::Result<T, QspiError>;
