//! Signal processing nodes
//!
//! - **Decoders**: the QSPI frame decoder and its supporting pieces
//! - **Simulation**: synthetic captures, in memory or streamed as a source node
//!
//! # Architecture
//!
//! Nodes run thread-per-node on the [`Scheduler`](crate::runtime::Scheduler):
//! - Source nodes produce edges ([`SimulationSource`])
//! - Process nodes turn edges into frames ([`QspiDecoder`](decoders::QspiDecoder))
//! - Sink nodes consume frames (printers, exporters)
//! - All connected via crossbeam channels

pub mod decoders;
pub mod simulation;

pub use simulation::{SimulatedCapture, SimulationGenerator, SimulationSource};

// Re-export Sample from runtime
pub use crate::runtime::Sample;
