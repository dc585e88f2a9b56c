//! Per-device session lifecycle

pub mod registry;
pub mod sensors;

pub use registry::{CameraId, DeviceRegistry};
pub use sensors::{SensorPoller, INVALID_READING};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::capture::camera::{CameraHandle, CameraInfo, CameraSystem};
use crate::capture::sink::{CaptureSink, FrameSink};
use crate::dio::arbiter::OutputLineArbiter;
use crate::dio::DigitalOutput;
use crate::error::{Result, ViewerError};

/// Lifecycle of one device window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Known from enumeration, never opened (or an open attempt failed).
    Discovered,
    /// Open in progress.
    Opening,
    /// Device open, idle.
    Open,
    /// Frames being delivered.
    Capturing,
    /// Explicitly closed; can be reopened.
    Closed,
}

/// One camera's session: owns the frame slot, timing statistics and sensor
/// poller, and drives the device through its open/capture lifecycle. All
/// methods run on the display/UI context; only the sink is shared with the
/// delivery context.
pub struct CameraSession {
    id: CameraId,
    info: CameraInfo,
    title: String,
    system: Arc<dyn CameraSystem>,
    state: SessionState,
    shown: bool,
    error: Option<String>,
    sink: Arc<CaptureSink>,
    // poller holds a handle clone; it must join before the handle drops
    poller: Option<SensorPoller>,
    handle: Option<Arc<Mutex<Box<dyn CameraHandle>>>>,
    output_bit: Option<u8>,
    expected_fps: f64,
}

impl CameraSession {
    pub fn new(id: CameraId, info: CameraInfo, system: Arc<dyn CameraSystem>) -> Self {
        let title = format!("{} [{}]", info.name, info.serial);
        Self {
            id,
            info,
            title,
            system,
            state: SessionState::Discovered,
            shown: false,
            error: None,
            sink: Arc::new(CaptureSink::new()),
            poller: None,
            handle: None,
            output_bit: None,
            expected_fps: 0.0,
        }
    }

    /// Open the device. On failure the session returns to `Discovered` with
    /// the error recorded; the user can retry.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            SessionState::Discovered | SessionState::Closed => {}
            _ => return Ok(()),
        }
        self.state = SessionState::Opening;
        match self.try_open() {
            Ok(()) => {
                info!(camera = %self.id, "session open");
                self.state = SessionState::Open;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Discovered;
                self.record_err("open camera", &e);
                Err(e)
            }
        }
    }

    fn try_open(&mut self) -> Result<()> {
        let cfg = crate::CONFIG.load();
        let mut handle = self.system.open(&self.info.id)?;
        handle.alloc_buffers(cfg.capture.buffer_count)?;
        match handle.frame_rate() {
            Ok(fps) => self.expected_fps = fps,
            Err(e) => self.record_err("get framerate", &e),
        }

        let handle = Arc::new(Mutex::new(handle));
        let has_sensors = !lock(&handle).sensor_names().is_empty();
        self.poller = if has_sensors {
            Some(SensorPoller::spawn(
                Arc::clone(&handle),
                Duration::from_millis(cfg.sensors.poll_interval_ms),
            ))
        } else {
            // no sensor list: polling disabled for this session
            None
        };
        self.handle = Some(handle);
        Ok(())
    }

    /// Begin frame delivery. Timing statistics and the collision/stall
    /// counters restart with the capture. The claimed output line, if any,
    /// is driven high.
    pub fn start_capture(&mut self, dio: Option<&mut (dyn DigitalOutput + '_)>) -> Result<()> {
        if self.state == SessionState::Capturing {
            return Ok(());
        }
        if self.state != SessionState::Open {
            return Err(ViewerError::NotOpen);
        }
        self.sink.reset();
        {
            let handle = self.handle.as_ref().ok_or(ViewerError::NotOpen)?;
            let sink: Arc<dyn FrameSink> = Arc::clone(&self.sink) as Arc<dyn FrameSink>;
            lock(handle).start_capture(sink)?;
        }
        self.state = SessionState::Capturing;
        if let (Some(bit), Some(dio)) = (self.output_bit, dio) {
            if let Err(e) = dio.write_bit(bit, true) {
                self.record_err("raise output line", &e);
            }
        }
        Ok(())
    }

    /// Halt frame delivery. The output line is driven low and the claim
    /// released; the delivery context is quiet when this returns.
    pub fn stop_capture(
        &mut self,
        dio: Option<&mut (dyn DigitalOutput + '_)>,
        arbiter: &mut OutputLineArbiter,
    ) -> Result<()> {
        if self.state != SessionState::Capturing {
            return Ok(());
        }
        {
            let handle = self.handle.as_ref().ok_or(ViewerError::NotOpen)?;
            lock(handle).stop_capture()?;
        }
        self.state = SessionState::Open;
        if let Some(bit) = self.output_bit.take() {
            if let Some(dio) = dio {
                if let Err(e) = dio.write_bit(bit, false) {
                    self.record_err("lower output line", &e);
                }
            }
            arbiter.release(self.id);
        }
        Ok(())
    }

    /// Close the device: capture stops first, then the sensor poller joins,
    /// then the handle is released.
    pub fn close(
        &mut self,
        dio: Option<&mut (dyn DigitalOutput + '_)>,
        arbiter: &mut OutputLineArbiter,
    ) -> Result<()> {
        if self.state == SessionState::Capturing {
            self.stop_capture(dio, arbiter)?;
        }
        self.poller = None;
        self.handle = None;
        if self.state != SessionState::Discovered {
            self.state = SessionState::Closed;
        }
        info!(camera = %self.id, "session closed");
        Ok(())
    }

    /// Compound transition: Capturing/Open -> Closed -> Opening -> Open.
    pub fn reset(
        &mut self,
        dio: Option<&mut (dyn DigitalOutput + '_)>,
        arbiter: &mut OutputLineArbiter,
    ) -> Result<()> {
        self.close(dio, arbiter)?;
        self.open()
    }

    // --- acquisition parameters -------------------------------------------

    pub fn image_size(&self) -> Result<(u32, u32)> {
        self.with_handle(|h| h.image_size())
    }

    pub fn set_image_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.guarded_set("set image size", |h| h.set_image_size(width, height))
    }

    pub fn image_offset(&self) -> Result<(u32, u32)> {
        self.with_handle(|h| h.image_offset())
    }

    pub fn set_image_offset(&mut self, x: u32, y: u32) -> Result<()> {
        self.guarded_set("set image offset", |h| h.set_image_offset(x, y))
    }

    pub fn binning(&self) -> Result<u32> {
        self.with_handle(|h| h.binning())
    }

    pub fn set_binning(&mut self, factor: u32) -> Result<()> {
        self.guarded_set("set binning", |h| h.set_binning(factor))
    }

    pub fn exposure_us(&self) -> Result<f64> {
        self.with_handle(|h| h.exposure_us())
    }

    /// Clamped to the device range. A successful update restarts the timing
    /// statistics, since the old period distribution no longer applies.
    /// Unlike the other setters this is allowed during capture.
    pub fn set_exposure_us(&mut self, exposure: f64) -> Result<()> {
        let result = self.with_handle(|h| {
            let (min, max, _step) = h.exposure_range_us()?;
            h.set_exposure_us(exposure.clamp(min, max))
        });
        match result {
            Ok(()) => {
                self.sink.stats().reset();
                Ok(())
            }
            Err(e) => {
                self.record_err("set exposure", &e);
                Err(e)
            }
        }
    }

    pub fn frame_rate(&self) -> Result<f64> {
        self.with_handle(|h| h.frame_rate())
    }

    fn guarded_set(
        &mut self,
        context: &str,
        f: impl FnOnce(&mut Box<dyn CameraHandle>) -> Result<()>,
    ) -> Result<()> {
        if self.state == SessionState::Capturing {
            let e = ViewerError::CaptureActive;
            self.record_err(context, &e);
            return Err(e);
        }
        match self.with_handle(f) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_err(context, &e);
                Err(e)
            }
        }
    }

    fn with_handle<R>(&self, f: impl FnOnce(&mut Box<dyn CameraHandle>) -> Result<R>) -> Result<R> {
        let handle = self.handle.as_ref().ok_or(ViewerError::NotOpen)?;
        f(&mut lock(handle))
    }

    // --- display-loop reads -----------------------------------------------

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            SessionState::Opening | SessionState::Open | SessionState::Capturing
        )
    }

    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Capturing
    }

    /// Open, or displayed in a window: either protects the session from
    /// destruction on a registry refresh.
    pub fn in_use(&self) -> bool {
        self.is_open() || self.shown
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn set_shown(&mut self, shown: bool) {
        self.shown = shown;
    }

    pub fn sink(&self) -> &Arc<CaptureSink> {
        &self.sink
    }

    /// (mean, stddev) of the frame period in microseconds.
    pub fn timing(&self) -> (f64, f64) {
        self.sink.stats().stats()
    }

    /// (collisions, stalls) since capture start.
    pub fn counters(&self) -> (u32, u32) {
        self.sink.slot().counters()
    }

    /// Device-reported acquisition frame rate, read at open.
    pub fn expected_fps(&self) -> f64 {
        self.expected_fps
    }

    /// Latest sensor snapshot, if polling is active for this session.
    pub fn sensors(&self) -> Option<(Vec<String>, Vec<f64>)> {
        self.poller.as_ref().map(SensorPoller::latest)
    }

    pub fn output_bit(&self) -> Option<u8> {
        self.output_bit
    }

    /// Record the arbiter's decision; ownership itself lives in the arbiter.
    pub fn set_output_bit(&mut self, bit: Option<u8>) {
        self.output_bit = bit;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn record_err(&mut self, context: &str, error: &dyn std::fmt::Display) {
        warn!(camera = %self.id, "{context}: {error}");
        self.error = Some(format!("{context}: {error}"));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
