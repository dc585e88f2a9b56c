//! Simulated camera backend
//!
//! Stands in for a vendor transport: per-camera delivery thread, a small
//! recycled buffer pool (which is what makes same-buffer stalls reachable),
//! and synthetic temperature sensors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info};

use crate::capture::camera::{CameraHandle, CameraInfo, CameraSystem, TriggerMode};
use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::capture::sink::FrameSink;
use crate::error::{Result, ViewerError};
use crate::CaptureConfig;

const EXPOSURE_MIN_US: f64 = 29.0;
const EXPOSURE_MAX_US: f64 = 1e7;
const EXPOSURE_STEP_US: f64 = 1.0;

/// Simulated transport exposing a fixed set of cameras.
pub struct SimCameraSystem {
    cameras: Vec<CameraInfo>,
    defaults: CaptureConfig,
}

impl SimCameraSystem {
    pub fn new(count: usize, defaults: CaptureConfig) -> Self {
        let cameras = (0..count)
            .map(|i| CameraInfo {
                id: format!("SIM4-{:06}", 1000 + i),
                name: format!("SimCam-{i}"),
                model: "AX-1200SM".into(),
                serial: format!("{:08}", 42_000 + i),
            })
            .collect();
        Self { cameras, defaults }
    }
}

impl CameraSystem for SimCameraSystem {
    fn enumerate(&self) -> Result<Vec<CameraInfo>> {
        Ok(self.cameras.clone())
    }

    fn query(&self, id: &str) -> Result<CameraInfo> {
        self.cameras
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ViewerError::camera("query", format!("no camera with id {id}")))
    }

    fn open(&self, id: &str) -> Result<Box<dyn CameraHandle>> {
        let info = self.query(id)?;
        info!(camera = %info.id, "opening simulated camera");
        Ok(Box::new(SimCameraHandle::new(info, &self.defaults)))
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// One open simulated camera.
pub struct SimCameraHandle {
    info: CameraInfo,
    width: u32,
    height: u32,
    offset: (u32, u32),
    binning: u32,
    format: PixelFormat,
    exposure_us: f64,
    fps: f64,
    trigger: TriggerMode,
    throughput: u64,
    buffer_count: usize,
    opened_at: Instant,
    worker: Option<Worker>,
}

impl SimCameraHandle {
    fn new(info: CameraInfo, defaults: &CaptureConfig) -> Self {
        Self {
            info,
            width: defaults.width,
            height: defaults.height,
            offset: (0, 0),
            binning: 1,
            format: defaults.format,
            exposure_us: 10_000.0,
            fps: defaults.fps,
            trigger: TriggerMode::FreeRun,
            throughput: 450_000_000,
            buffer_count: defaults.buffer_count,
            opened_at: Instant::now(),
            worker: None,
        }
    }

    fn reject_while_capturing(&self) -> Result<()> {
        if self.is_capturing() {
            return Err(ViewerError::CaptureActive);
        }
        Ok(())
    }

    /// Pre-render one pattern phase per pool buffer; cycling through the pool
    /// both animates the image and recycles allocations like a real driver.
    fn render_pool(&self) -> Vec<Bytes> {
        (0..self.buffer_count.max(1))
            .map(|phase| {
                Bytes::from(render_pattern(
                    phase as u32,
                    self.width,
                    self.height,
                    self.format,
                ))
            })
            .collect()
    }
}

impl CameraHandle for SimCameraHandle {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn image_size(&self) -> Result<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn set_image_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.reject_while_capturing()?;
        if width == 0 || height == 0 {
            return Err(ViewerError::camera(
                "set image size",
                format!("invalid dimensions {width} x {height}"),
            ));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn image_offset(&self) -> Result<(u32, u32)> {
        Ok(self.offset)
    }

    fn set_image_offset(&mut self, x: u32, y: u32) -> Result<()> {
        self.reject_while_capturing()?;
        self.offset = (x, y);
        Ok(())
    }

    fn binning(&self) -> Result<u32> {
        Ok(self.binning)
    }

    fn set_binning(&mut self, factor: u32) -> Result<()> {
        self.reject_while_capturing()?;
        if !(1..=8).contains(&factor) {
            return Err(ViewerError::camera(
                "set binning",
                format!("unsupported factor {factor}"),
            ));
        }
        self.binning = factor;
        Ok(())
    }

    fn pixel_format(&self) -> Result<PixelFormat> {
        Ok(self.format)
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        self.reject_while_capturing()?;
        self.format = format;
        Ok(())
    }

    fn supported_formats(&self) -> Result<Vec<PixelFormat>> {
        Ok(vec![
            PixelFormat::Mono8,
            PixelFormat::Mono12,
            PixelFormat::Mono16,
            PixelFormat::Rgb8,
        ])
    }

    fn exposure_range_us(&self) -> Result<(f64, f64, f64)> {
        Ok((EXPOSURE_MIN_US, EXPOSURE_MAX_US, EXPOSURE_STEP_US))
    }

    fn exposure_us(&self) -> Result<f64> {
        Ok(self.exposure_us)
    }

    fn set_exposure_us(&mut self, exposure: f64) -> Result<()> {
        if !(EXPOSURE_MIN_US..=EXPOSURE_MAX_US).contains(&exposure) {
            return Err(ViewerError::camera(
                "set exposure",
                format!("{exposure} us out of range"),
            ));
        }
        self.exposure_us = exposure;
        Ok(())
    }

    fn frame_rate(&self) -> Result<f64> {
        Ok(self.fps)
    }

    fn set_frame_rate(&mut self, fps: f64) -> Result<()> {
        self.reject_while_capturing()?;
        if fps <= 0.0 || fps > 1000.0 {
            return Err(ViewerError::camera("set frame rate", format!("{fps} fps")));
        }
        self.fps = fps;
        Ok(())
    }

    fn trigger(&self) -> Result<TriggerMode> {
        Ok(self.trigger)
    }

    fn set_trigger(&mut self, mode: TriggerMode) -> Result<()> {
        self.reject_while_capturing()?;
        self.trigger = mode;
        Ok(())
    }

    fn link_throughput(&self) -> Result<u64> {
        Ok(self.throughput)
    }

    fn set_link_throughput(&mut self, limit: u64) -> Result<()> {
        self.reject_while_capturing()?;
        self.throughput = limit;
        Ok(())
    }

    fn alloc_buffers(&mut self, count: usize) -> Result<()> {
        self.reject_while_capturing()?;
        if count == 0 {
            return Err(ViewerError::camera("alloc buffers", "pool of zero frames"));
        }
        self.buffer_count = count;
        Ok(())
    }

    fn sensor_names(&self) -> Vec<String> {
        vec!["Sensor".into(), "Mainboard".into()]
    }

    fn sensor_supported(&self, name: &str) -> bool {
        matches!(name, "Sensor" | "Mainboard")
    }

    fn sensor_value(&self, name: &str) -> Result<f64> {
        let base = match name {
            "Sensor" => 38.5,
            "Mainboard" => 45.2,
            _ => {
                return Err(ViewerError::camera(
                    "sensor value",
                    format!("unsupported sensor {name}"),
                ))
            }
        };
        // slow deterministic wobble, good enough for a readout that changes
        let wobble = (self.opened_at.elapsed().as_secs() % 5) as f64 * 0.2 - 0.4;
        Ok(base + wobble)
    }

    fn start_capture(&mut self, sink: Arc<dyn FrameSink>) -> Result<()> {
        if self.is_capturing() {
            return Err(ViewerError::camera("start capture", "already capturing"));
        }
        let pool = self.render_pool();
        let period = Duration::from_secs_f64(1.0 / self.fps);
        let (width, height, format) = (self.width, self.height, self.format);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let camera = self.info.id.clone();

        let join = std::thread::spawn(move || {
            debug!(%camera, "delivery thread started");
            let mut sequence = 0u64;
            loop {
                std::thread::sleep(period);
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                let frame = Frame {
                    data: pool[sequence as usize % pool.len()].clone(),
                    meta: Arc::new(FrameMetadata {
                        sequence,
                        width,
                        height,
                        stride: width,
                        format,
                    }),
                    timestamp: Instant::now(),
                };
                sink.deliver(frame);
                sequence += 1;
            }
            debug!(%camera, delivered = sequence, "delivery thread stopped");
        });

        self.worker = Some(Worker { stop, join });
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            worker
                .join
                .join()
                .map_err(|_| ViewerError::camera("stop capture", "delivery thread panicked"))?;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for SimCameraHandle {
    fn drop(&mut self) {
        // the delivery thread must not outlive the handle
        let _ = self.stop_capture();
    }
}

/// One phase of the synthetic test pattern: a diagonal gradient walking one
/// pool-buffer's worth per phase.
fn render_pattern(phase: u32, width: u32, height: u32, format: PixelFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.buffer_len(width, height));
    let shift_per_phase = (width / 8).max(1);
    for y in 0..height {
        for x in 0..width {
            let ramp = x + y + phase * shift_per_phase;
            match format {
                PixelFormat::Mono8 => out.push((ramp % 256) as u8),
                PixelFormat::Mono10 => out.extend(((ramp % 1024) as u16).to_ne_bytes()),
                PixelFormat::Mono12 => out.extend(((ramp % 4096) as u16).to_ne_bytes()),
                PixelFormat::Mono14 => out.extend(((ramp % 16_384) as u16).to_ne_bytes()),
                PixelFormat::Mono16 => out.extend(((ramp % 65_536) as u16).to_ne_bytes()),
                PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
                    out.push((x * 255 / width.max(1)) as u8);
                    out.push((y * 255 / height.max(1)) as u8);
                    out.push((ramp % 256) as u8);
                }
                PixelFormat::Rgba8 | PixelFormat::Bgra8 => {
                    out.push((x * 255 / width.max(1)) as u8);
                    out.push((y * 255 / height.max(1)) as u8);
                    out.push((ramp % 256) as u8);
                    out.push(255);
                }
                PixelFormat::Rgb16 | PixelFormat::Bgr16 => {
                    out.extend(((x * 65_535 / width.max(1)) as u16).to_ne_bytes());
                    out.extend(((y * 65_535 / height.max(1)) as u16).to_ne_bytes());
                    out.extend(((ramp % 65_536) as u16).to_ne_bytes());
                }
            }
        }
    }
    out
}
