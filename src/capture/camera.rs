//! Camera collaborator boundary
//!
//! The machine-vision protocol itself lives behind these traits. The viewer
//! only relies on enumeration, open/close, acquisition parameters, sensor
//! queries and a per-frame delivery callback; `sim.rs` provides the backend
//! used when no vendor transport is linked in.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capture::frame::PixelFormat;
use crate::capture::sink::FrameSink;
use crate::error::Result;

/// One enumeration entry, as reported by the transport. A changed device is
/// a full record replacement, never a field-by-field patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Vendor identifier string; the registry derives the stable identity
    /// from this and nothing else.
    pub id: String,
    pub name: String,
    pub model: String,
    pub serial: String,
}

/// Trigger source configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    FreeRun,
    Software,
    Line(u8),
}

/// Discovery and session entry point of the camera transport.
pub trait CameraSystem: Send + Sync {
    /// Enumerate every reachable device.
    fn enumerate(&self) -> Result<Vec<CameraInfo>>;

    /// Query a single device by its vendor identifier.
    fn query(&self, id: &str) -> Result<CameraInfo>;

    /// Open a device for parameter access and capture.
    fn open(&self, id: &str) -> Result<Box<dyn CameraHandle>>;
}

/// An open device. Parameter setters fail with `CaptureActive` while frames
/// are being delivered; the delivery context the backend spawns for
/// `start_capture` must be fully halted when `stop_capture` returns.
pub trait CameraHandle: Send {
    fn info(&self) -> &CameraInfo;

    fn image_size(&self) -> Result<(u32, u32)>;
    fn set_image_size(&mut self, width: u32, height: u32) -> Result<()>;

    fn image_offset(&self) -> Result<(u32, u32)>;
    fn set_image_offset(&mut self, x: u32, y: u32) -> Result<()>;

    fn binning(&self) -> Result<u32>;
    fn set_binning(&mut self, factor: u32) -> Result<()>;

    fn pixel_format(&self) -> Result<PixelFormat>;
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()>;
    fn supported_formats(&self) -> Result<Vec<PixelFormat>>;

    /// (min, max, step) in microseconds.
    fn exposure_range_us(&self) -> Result<(f64, f64, f64)>;
    fn exposure_us(&self) -> Result<f64>;
    fn set_exposure_us(&mut self, exposure: f64) -> Result<()>;

    /// Device-reported acquisition frame rate.
    fn frame_rate(&self) -> Result<f64>;
    fn set_frame_rate(&mut self, fps: f64) -> Result<()>;

    fn trigger(&self) -> Result<TriggerMode>;
    fn set_trigger(&mut self, mode: TriggerMode) -> Result<()>;

    /// Link throughput limit in bytes per second.
    fn link_throughput(&self) -> Result<u64>;
    fn set_link_throughput(&mut self, limit: u64) -> Result<()>;

    /// Size the delivery buffer pool. The pool is what makes buffer reuse
    /// (and therefore slot stalls) possible.
    fn alloc_buffers(&mut self, count: usize) -> Result<()>;

    /// Temperature-like sensors exposed by the device.
    fn sensor_names(&self) -> Vec<String>;
    fn sensor_supported(&self, name: &str) -> bool;
    fn sensor_value(&self, name: &str) -> Result<f64>;

    /// Begin frame delivery; the sink is invoked once per captured frame from
    /// the backend's delivery context.
    fn start_capture(&mut self, sink: Arc<dyn FrameSink>) -> Result<()>;

    /// Halt delivery. Must not return before the delivery context has gone
    /// quiet; the sink may be dropped right after this.
    fn stop_capture(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;
}
