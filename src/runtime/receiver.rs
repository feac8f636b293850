//! Channel receiver with a putback buffer
//!
//! [`Receiver`] wraps a single `crossbeam_channel::Receiver<ChannelMessage<T>>`
//! with a putback buffer, providing `recv`, `peek` and `put_back`.
//! It transparently unwraps `ChannelMessage` and caches end-of-stream state
//! so subsequent calls return `Shutdown`.

use crossbeam_channel::Receiver as CrossbeamReceiver;
use std::collections::VecDeque;

use super::errors::{WorkError, WorkResult};
use super::sender::ChannelMessage;

/// A single crossbeam receiver with a putback buffer.
///
/// Buffered items are always returned before the underlying channel is read.
/// On `ChannelMessage::EndOfStream` a persistent flag is set: once the buffer is
/// drained all subsequent `recv()`/`peek()` calls return `WorkError::Shutdown`.
pub struct Receiver<T> {
    receiver: CrossbeamReceiver<ChannelMessage<T>>,
    buffer: VecDeque<T>,
    eos: bool,
}

impl<T> Receiver<T> {
    pub fn new(receiver: CrossbeamReceiver<ChannelMessage<T>>) -> Self {
        Self {
            receiver,
            buffer: VecDeque::new(),
            eos: false,
        }
    }

    /// Blocking receive. Returns from the putback buffer first, then
    /// falls through to the underlying channel.
    pub fn recv(&mut self) -> WorkResult<T> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.eos {
            return Err(WorkError::Shutdown);
        }

        match self.receiver.recv() {
            Ok(ChannelMessage::Sample(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos = true;
                tracing::debug!("Receiver::recv() - EndOfStream received");
                Err(WorkError::Shutdown)
            }
            Err(_) => {
                self.eos = true;
                tracing::debug!("Receiver::recv() - channel disconnected, returning Shutdown");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Peek at the front item. If the buffer is empty, blocks on the channel
    /// to populate it.
    pub fn peek(&mut self) -> WorkResult<&T> {
        if self.buffer.is_empty() {
            let item = self.recv()?;
            self.buffer.push_back(item);
        }
        self.buffer.front().ok_or(WorkError::Shutdown)
    }

    /// Push an item back to the front of the buffer so the next `recv()`
    /// returns it.
    pub fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }

    /// Check if there are any buffered items.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }
}
