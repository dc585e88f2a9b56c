//! Delivery-side frame sink

use crate::capture::frame::Frame;
use crate::capture::slot::FrameSlot;
use crate::capture::stats::TimingAccumulator;

/// Capability handed to a camera backend at capture start; invoked once per
/// delivered frame from the backend's own delivery context.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: Frame);
}

/// The viewer's sink: per-frame timing first, then the slot handoff.
#[derive(Default)]
pub struct CaptureSink {
    slot: FrameSlot,
    stats: TimingAccumulator,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    pub fn stats(&self) -> &TimingAccumulator {
        &self.stats
    }

    /// Fresh capture: clear timing state and the collision/stall counters.
    pub fn reset(&self) {
        self.stats.reset();
        self.slot.reset_counters();
    }
}

impl FrameSink for CaptureSink {
    fn deliver(&self, frame: Frame) {
        self.stats.update();
        self.slot.publish(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FrameMetadata, PixelFormat};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame {
            data: Bytes::from(vec![0u8; 16]),
            meta: Arc::new(FrameMetadata {
                sequence: seq,
                width: 4,
                height: 4,
                stride: 4,
                format: PixelFormat::Mono8,
            }),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn deliver_feeds_both_slot_and_stats() {
        let sink = CaptureSink::new();
        sink.deliver(frame(1));
        sink.deliver(frame(2));

        assert_eq!(sink.stats().samples(), 1);
        let read = sink.slot().consume();
        assert!(read.has_new_data());
        assert_eq!(read.sequence(), Some(2));
    }

    #[test]
    fn reset_clears_timing_and_counters() {
        let sink = CaptureSink::new();
        sink.deliver(frame(1));
        sink.deliver(frame(2));
        sink.reset();
        assert_eq!(sink.stats().samples(), 0);
        assert_eq!(sink.slot().counters(), (0, 0));
    }
}
