pub mod app;
pub mod capture;
pub mod dio;
pub mod display;
pub mod error;
pub mod session;

use arc_swap::ArcSwap;
use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use app::ViewerApp;
pub use error::{Result, ViewerError};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub sensors: SensorConfig,
    pub dio: DioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Cameras exposed by the simulated transport.
    pub sim_cameras: usize,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: PixelFormat,
    /// Delivery buffer pool size per camera.
    pub buffer_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DioConfig {
    /// Device node minor number.
    pub minor: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sim_cameras: 3,
            width: 640,
            height: 480,
            fps: 30.0,
            format: PixelFormat::Mono8,
            buffer_count: 5,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl Default for DioConfig {
    fn default() -> Self {
        Self { minor: 0 }
    }
}

impl Config {
    /// Load from an optional TOML file with `ARGOS_*` environment overrides;
    /// anything unset falls back to the defaults above.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("ARGOS").separator("__"));
        let loaded = builder.build()?;
        Ok(loaded.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let cfg = Config::default();
        assert_eq!(cfg.capture.buffer_count, 5);
        assert!(cfg.capture.fps > 0.0);
        assert_eq!(cfg.display.width, 1280);
        assert_eq!(cfg.sensors.poll_interval_ms, 1000);
    }

    #[test]
    fn load_without_a_file_yields_defaults() {
        let cfg = Config::load(None).expect("load");
        assert_eq!(cfg.capture.sim_cameras, Config::default().capture.sim_cameras);
    }
}
