//! Frame sinks
//!
//! A decoder hands every completed frame to a [`FrameSink`]. Frames are
//! emitted in start order and become visible to readers on `commit()`, which
//! the decoder calls after each field and at every resync.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::runtime::{Sender, WorkResult};
use tracing::trace;

use super::types::{Frame, Marker};

/// Destination for decoded frames
pub trait FrameSink: Send {
    /// Take ownership of a decoded frame.
    fn emit(&mut self, frame: Frame) -> WorkResult<()>;

    /// Publish everything emitted so far.
    fn commit(&mut self) -> WorkResult<()> {
        Ok(())
    }

    /// Furthest sample the decoder has consumed
    fn report_progress(&mut self, _sample: u64) {}

    fn add_marker(&mut self, _marker: Marker) {}

    /// Called once when decoding ends
    fn finish(&mut self) {}
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct FrameCollector {
    frames: Vec<Frame>,
    committed: usize,
    markers: Vec<Marker>,
    progress: u64,
    finished: bool,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames published by `commit()`
    pub fn frames(&self) -> &[Frame] {
        &self.frames[..self.committed]
    }

    /// Every frame emitted, committed or not
    pub fn all_frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_frames(mut self) -> Vec<Frame> {
        self.frames.truncate(self.committed);
        self.frames
    }
}

impl FrameSink for FrameCollector {
    fn emit(&mut self, frame: Frame) -> WorkResult<()> {
        self.frames.push(frame);
        Ok(())
    }

    fn commit(&mut self) -> WorkResult<()> {
        self.committed = self.frames.len();
        Ok(())
    }

    fn report_progress(&mut self, sample: u64) {
        self.progress = self.progress.max(sample);
    }

    fn add_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// Sink that forwards committed frames to downstream nodes
///
/// Markers are dropped; progress is published through a shared counter.
pub struct ChannelSink {
    output: Sender<Frame>,
    pending: Vec<Frame>,
    progress: Arc<AtomicU64>,
    sent: u64,
}

impl ChannelSink {
    pub fn new(output: Sender<Frame>) -> Self {
        Self {
            output,
            pending: Vec::new(),
            progress: Arc::new(AtomicU64::new(0)),
            sent: 0,
        }
    }

    /// Shared progress counter, readable from other threads
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.progress)
    }

    /// Number of frames sent downstream
    pub fn frames_sent(&self) -> u64 {
        self.sent
    }
}

impl FrameSink for ChannelSink {
    fn emit(&mut self, frame: Frame) -> WorkResult<()> {
        self.pending.push(frame);
        Ok(())
    }

    fn commit(&mut self) -> WorkResult<()> {
        for frame in self.pending.drain(..) {
            trace!("Sending {}", frame);
            self.output.send(frame)?;
            self.sent += 1;
        }
        Ok(())
    }

    fn report_progress(&mut self, sample: u64) {
        self.progress.fetch_max(sample, Ordering::Relaxed);
    }

    fn finish(&mut self) {
        if let Err(e) = self.commit() {
            tracing::warn!("Dropping uncommitted frames: {}", e);
        }
        self.output.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::types::{FieldResult, FrameKind, MarkerKind};
    use crate::runtime::{ChannelMessage, WorkError};
    use crossbeam_channel::bounded;

    fn frame(start: u64) -> Frame {
        Frame::from_field(
            FrameKind::Data,
            FieldResult {
                start_sample: start,
                end_sample: start + 10,
                value: 0x5A,
            },
        )
    }

    #[test]
    fn test_collector_commit_visibility() {
        let mut sink = FrameCollector::new();
        sink.emit(frame(0)).unwrap();
        assert!(sink.frames().is_empty());
        assert_eq!(sink.all_frames().len(), 1);

        sink.commit().unwrap();
        sink.emit(frame(20)).unwrap();
        assert_eq!(sink.frames().len(), 1);

        sink.add_marker(Marker::new(5, MarkerKind::UpArrow));
        sink.report_progress(30);
        sink.report_progress(10);
        assert_eq!(sink.markers().len(), 1);
        assert_eq!(sink.progress(), 30);

        // Uncommitted tail is not kept
        assert_eq!(sink.into_frames(), vec![frame(0)]);
    }

    #[test]
    fn test_channel_sink_sends_on_commit() {
        let (tx, rx) = bounded::<ChannelMessage<Frame>>(8);
        let mut sink = ChannelSink::new(Sender::new(vec![tx]));
        let progress = sink.progress();

        sink.emit(frame(0)).unwrap();
        sink.emit(frame(20)).unwrap();
        assert!(rx.try_recv().is_err());

        sink.commit().unwrap();
        sink.report_progress(42);
        sink.finish();

        assert_eq!(sink.frames_sent(), 2);
        assert_eq!(progress.load(Ordering::Relaxed), 42);
        assert!(matches!(rx.recv().unwrap(), ChannelMessage::Sample(f) if f.start_sample == 0));
        assert!(matches!(rx.recv().unwrap(), ChannelMessage::Sample(f) if f.start_sample == 20));
        assert!(matches!(rx.recv().unwrap(), ChannelMessage::EndOfStream));
    }

    #[test]
    fn test_channel_sink_disconnected() {
        let (tx, rx) = bounded::<ChannelMessage<Frame>>(1);
        drop(rx);
        let mut sink = ChannelSink::new(Sender::new(vec![tx]));
        sink.emit(frame(0)).unwrap();
        assert!(matches!(sink.commit(), Err(WorkError::SendError(_))));
    }
}
