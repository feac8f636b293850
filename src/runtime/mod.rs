//! Runtime support for streaming decode graphs

pub mod cursor;
pub mod errors;
pub mod node;
pub mod receiver;
pub mod sample;
pub mod scheduler;
pub mod sender;

pub use cursor::{BitState, ChannelCursor, EdgeCursor, StreamCursor};
pub use errors::{WorkError, WorkResult};
pub use node::ProcessNode;
pub use receiver::Receiver;
pub use sample::{Sample, SampleBlock};
pub use scheduler::Scheduler;
pub use sender::{ChannelMessage, Sender};

/// Create an unbounded channel pair carrying `ChannelMessage<T>`
///
/// Used for edge streams, where one producer feeds several cursors that a
/// single consumer reads at different rates.
pub fn unbounded_channel<T: Clone>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Sender::new(vec![tx]), Receiver::new(rx))
}
