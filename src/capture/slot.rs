//! Single-slot frame handoff between a delivery context and the display loop

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crossbeam::utils::CachePadded;

use crate::capture::frame::{Frame, PixelFormat};

/// Latest-frame buffer shared between one delivery context and the display
/// loop. Holds at most one frame; an unconsumed frame is simply overwritten.
///
/// `publish` never blocks on an unrelated reader - the frame is dropped and
/// counted as a collision. The one blocking path is buffer reuse: when the
/// delivery backend recycles the very allocation the reader is scanning, the
/// writer waits out the read and counts a stall.
pub struct FrameSlot {
    state: Mutex<SlotState>,
    /// Allocation identity of the currently held frame, readable without the
    /// lock so the writer can pick its path before deciding to block.
    buffer_id: AtomicUsize,
    collisions: CachePadded<AtomicU32>,
    stalls: CachePadded<AtomicU32>,
}

struct SlotState {
    frame: Option<Frame>,
    width: u32,
    height: u32,
    format: PixelFormat,
    new_data: bool,
    /// Dimensions or format changed since the last consumed frame; the reader
    /// must recreate its render target before uploading.
    realloc: bool,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                frame: None,
                width: 0,
                height: 0,
                format: PixelFormat::Mono8,
                new_data: false,
                realloc: false,
            }),
            buffer_id: AtomicUsize::new(0),
            collisions: CachePadded::new(AtomicU32::new(0)),
            stalls: CachePadded::new(AtomicU32::new(0)),
        }
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a freshly delivered frame to the slot. Called from the delivery
    /// context; the display loop never calls this.
    pub fn publish(&self, frame: Frame) {
        if self.buffer_id.load(Ordering::Acquire) == frame.buffer_id() {
            // The backend recycled the buffer the reader may be mid-scan on.
            // Genuine backpressure: wait for the read to finish.
            let mut state = self.lock();
            self.stalls.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("frame_stalls").increment(1);
            self.store(&mut state, frame);
            return;
        }
        match self.state.try_lock() {
            Ok(mut state) => self.store(&mut state, frame),
            Err(TryLockError::WouldBlock) => {
                // Reader mid-scan of an unrelated buffer: drop, don't wait.
                self.collisions.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("frame_collisions").increment(1);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                self.store(&mut poisoned.into_inner(), frame);
            }
        }
    }

    /// Take the reader's view of the slot. The returned guard holds the slot
    /// lock: keep it only for the duration of the upload.
    ///
    /// Consuming clears the new-data flag, and the reallocation flag along
    /// with it when set - the caller is expected to rebuild its render target
    /// before uploading whenever `needs_realloc` reports true.
    pub fn consume(&self) -> SlotRead<'_> {
        let mut state = self.lock();
        let has_new = state.new_data;
        let realloc = has_new && state.realloc;
        if has_new {
            state.new_data = false;
            state.realloc = false;
        }
        SlotRead {
            state,
            has_new,
            realloc,
        }
    }

    /// (collisions, stalls) since the last counter reset.
    pub fn counters(&self) -> (u32, u32) {
        (
            self.collisions.load(Ordering::Relaxed),
            self.stalls.load(Ordering::Relaxed),
        )
    }

    /// Counters restart at zero on every capture start.
    pub fn reset_counters(&self) {
        self.collisions.store(0, Ordering::Relaxed);
        self.stalls.store(0, Ordering::Relaxed);
    }

    fn store(&self, state: &mut SlotState, frame: Frame) {
        let meta = &frame.meta;
        if meta.width != state.width || meta.height != state.height || meta.format != state.format
        {
            state.realloc = true;
        }
        state.width = meta.width;
        state.height = meta.height;
        state.format = meta.format;
        self.buffer_id.store(frame.buffer_id(), Ordering::Release);
        state.frame = Some(frame);
        state.new_data = true;
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reader-side view returned by [`FrameSlot::consume`]. Holds the slot lock
/// for its lifetime, which is what lets the writer distinguish a stalled
/// buffer reuse from an ordinary collision.
pub struct SlotRead<'a> {
    state: MutexGuard<'a, SlotState>,
    has_new: bool,
    realloc: bool,
}

impl SlotRead<'_> {
    /// A frame arrived since the previous consume.
    pub fn has_new_data(&self) -> bool {
        self.has_new
    }

    /// Dimensions or pixel format changed: recreate the render target before
    /// uploading this frame.
    pub fn needs_realloc(&self) -> bool {
        self.realloc
    }

    pub fn width(&self) -> u32 {
        self.state.width
    }

    pub fn height(&self) -> u32 {
        self.state.height
    }

    pub fn format(&self) -> PixelFormat {
        self.state.format
    }

    /// Sample buffer of the held frame, if any frame has ever been published.
    pub fn data(&self) -> Option<&[u8]> {
        self.state.frame.as_ref().map(|f| &f.data[..])
    }

    pub fn sequence(&self) -> Option<u64> {
        self.state.frame.as_ref().map(|f| f.meta.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn frame(seq: u64, width: u32, height: u32, data: Bytes) -> Frame {
        Frame {
            data,
            meta: Arc::new(crate::capture::frame::FrameMetadata {
                sequence: seq,
                width,
                height,
                stride: width,
                format: PixelFormat::Mono8,
            }),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn new_data_reported_exactly_once() {
        let slot = FrameSlot::new();
        slot.publish(frame(1, 4, 4, Bytes::from(vec![1u8; 16])));
        {
            let read = slot.consume();
            assert!(read.has_new_data());
            assert_eq!(read.sequence(), Some(1));
        }
        let read = slot.consume();
        assert!(!read.has_new_data());
        // last-known identity stays available for redraws
        assert_eq!(read.sequence(), Some(1));
        assert_eq!((read.width(), read.height()), (4, 4));
    }

    #[test]
    fn realloc_flag_follows_dimension_changes() {
        let slot = FrameSlot::new();
        slot.publish(frame(1, 640, 480, Bytes::from(vec![0u8; 640 * 480])));
        assert!(slot.consume().needs_realloc());

        slot.publish(frame(2, 1280, 720, Bytes::from(vec![0u8; 1280 * 720])));
        let read = slot.consume();
        assert!(read.has_new_data());
        assert!(read.needs_realloc());
        drop(read);

        slot.publish(frame(3, 1280, 720, Bytes::from(vec![0u8; 1280 * 720])));
        let read = slot.consume();
        assert!(read.has_new_data());
        assert!(!read.needs_realloc());
    }

    #[test]
    fn unrelated_buffer_collision_drops_the_frame() {
        let slot = FrameSlot::new();
        slot.publish(frame(1, 4, 4, Bytes::from(vec![1u8; 16])));
        let read = slot.consume();
        // reader mid-scan; this publish carries a different allocation
        slot.publish(frame(2, 4, 4, Bytes::from(vec![2u8; 16])));
        drop(read);

        assert_eq!(slot.counters(), (1, 0));
        let read = slot.consume();
        assert!(!read.has_new_data(), "collided frame must be dropped");
        assert_eq!(read.sequence(), Some(1));
    }

    #[test]
    fn same_buffer_reuse_stalls_until_read_completes() {
        let slot = Arc::new(FrameSlot::new());
        let data = Bytes::from(vec![7u8; 16]);
        slot.publish(frame(1, 4, 4, data.clone()));
        drop(slot.consume());

        let read = slot.consume();
        let publisher = {
            let slot = Arc::clone(&slot);
            // same allocation as the frame the reader last saw
            let reused = frame(2, 4, 4, data.clone());
            std::thread::spawn(move || slot.publish(reused))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(slot.counters(), (0, 0), "writer must still be blocked");
        drop(read);
        publisher.join().expect("publisher thread");

        assert_eq!(slot.counters(), (0, 1));
        let read = slot.consume();
        assert!(read.has_new_data());
        assert_eq!(read.sequence(), Some(2));
    }

    #[test]
    fn consume_sees_the_most_recent_publish() {
        let slot = FrameSlot::new();
        slot.publish(frame(1, 4, 4, Bytes::from(vec![1u8; 16])));
        slot.publish(frame(2, 4, 4, Bytes::from(vec![2u8; 16])));
        let read = slot.consume();
        assert_eq!(read.sequence(), Some(2));
        assert_eq!(slot.counters(), (0, 0));
    }

    #[test]
    fn counters_reset_for_a_new_capture() {
        let slot = FrameSlot::new();
        slot.publish(frame(1, 4, 4, Bytes::from(vec![1u8; 16])));
        let read = slot.consume();
        slot.publish(frame(2, 4, 4, Bytes::from(vec![2u8; 16])));
        drop(read);
        assert_eq!(slot.counters(), (1, 0));
        slot.reset_counters();
        assert_eq!(slot.counters(), (0, 0));
    }
}
