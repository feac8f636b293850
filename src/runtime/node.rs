//! Node trait for streaming processing
//!
//! Defines the ProcessNode trait that all streaming nodes implement.
//! Nodes own their channel endpoints and process data when the scheduler
//! calls `work()`.

pub use super::errors::{WorkError, WorkResult};

/// A processing node
///
/// - Sources produce edges onto channels
/// - Decoders turn cursor input into frames
/// - Sinks consume frames
pub trait ProcessNode: Send {
    /// Get a debug name for this node
    fn name(&self) -> &str;

    /// Check if this node should stop processing
    fn should_stop(&self) -> bool {
        false
    }

    /// Do one unit of work: read inputs, process, write outputs.
    ///
    /// Returns `Ok(n)` with the number of items produced. `Err(WorkError::Shutdown)`
    /// is the normal way for a node to report that its input is exhausted.
    fn work(&mut self) -> WorkResult<usize>;
}
