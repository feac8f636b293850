//! Broadcast sender over crossbeam channels

use crossbeam_channel::{SendError, Sender as CrossbeamSender};

/// Channel message wrapper for end-of-stream signaling
///
/// Wraps data flowing through channels so producers can explicitly signal
/// when no more data will be sent. Cursors reading edge streams rely on this
/// to tell "no further transitions" apart from "transition not yet captured".
///
/// Nodes never see this enum directly: `Sender::send()` wraps values
/// in `Sample(T)` and `Receiver::recv()` unwraps them transparently.
#[derive(Clone, Debug)]
pub enum ChannelMessage<T> {
    /// A data item
    Sample(T),
    /// End-of-stream marker, no more data will be sent
    EndOfStream,
}

/// Broadcast sender that sends to one or more consumers
///
/// Sends go out sequentially from the caller thread to every destination.
pub struct Sender<T> {
    destinations: Vec<CrossbeamSender<ChannelMessage<T>>>,
}

impl<T: Clone> Sender<T> {
    /// Create a new Sender from a vector of crossbeam senders
    pub fn new(destinations: Vec<CrossbeamSender<ChannelMessage<T>>>) -> Self {
        Self { destinations }
    }

    /// Get the number of broadcast destinations
    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    /// Send a value to all destinations
    ///
    /// Fails only if no destination accepted the value.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        if self.destinations.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        let mut last_error = None;

        for dest in &self.destinations {
            match dest.send(ChannelMessage::Sample(value.clone())) {
                Ok(()) => any_success = true,
                Err(SendError(msg)) => {
                    if let ChannelMessage::Sample(v) = msg {
                        last_error = Some(SendError(v));
                    }
                }
            }
        }

        if !any_success && let Some(e) = last_error {
            return Err(e);
        }

        Ok(())
    }

    /// Signal end-of-stream to all destinations
    ///
    /// Downstream `Receiver`s return `WorkError::Shutdown` once they reach it.
    pub fn close(&self) {
        for dest in &self.destinations {
            let _ = dest.send(ChannelMessage::EndOfStream);
        }
    }

    /// Check if this sender has any connected receivers
    pub fn is_connected(&self) -> bool {
        !self.destinations.is_empty()
    }
}

impl<T: Clone> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            destinations: self.destinations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_broadcast_to_all_destinations() {
        let (tx1, rx1) = bounded::<ChannelMessage<u8>>(4);
        let (tx2, rx2) = bounded::<ChannelMessage<u8>>(4);
        let sender = Sender::new(vec![tx1, tx2]);
        assert_eq!(sender.num_destinations(), 2);

        sender.send(7).unwrap();
        sender.close();

        for rx in [rx1, rx2] {
            assert!(matches!(rx.recv().unwrap(), ChannelMessage::Sample(7)));
            assert!(matches!(rx.recv().unwrap(), ChannelMessage::EndOfStream));
        }
    }

    #[test]
    fn test_send_fails_when_all_disconnected() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(1);
        drop(rx);
        let sender = Sender::new(vec![tx]);
        assert_eq!(sender.send(1).unwrap_err().0, 1);
    }

    #[test]
    fn test_unconnected_sender_is_noop() {
        let sender = Sender::<u8>::new(Vec::new());
        assert!(!sender.is_connected());
        assert!(sender.send(1).is_ok());
    }
}
