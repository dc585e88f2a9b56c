//! Background polling of a device's auxiliary sensors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::capture::camera::CameraHandle;
use crate::error::Result;

/// Sentinel stored for sensors the device does not support or fails to read.
/// Below absolute zero, so it cannot collide with a real temperature.
pub const INVALID_READING: f64 = -274.0;

/// Stop requests are observed at this granularity rather than after a full
/// polling cadence.
const STOP_TICK: Duration = Duration::from_millis(100);

/// The narrow slice of a camera the poller needs.
pub trait SensorSource: Send {
    fn sensor_names(&self) -> Vec<String>;
    fn sensor_supported(&self, name: &str) -> bool;
    fn sensor_value(&self, name: &str) -> Result<f64>;
}

impl SensorSource for Box<dyn CameraHandle> {
    fn sensor_names(&self) -> Vec<String> {
        self.as_ref().sensor_names()
    }

    fn sensor_supported(&self, name: &str) -> bool {
        self.as_ref().sensor_supported(name)
    }

    fn sensor_value(&self, name: &str) -> Result<f64> {
        self.as_ref().sensor_value(name)
    }
}

/// Fixed-cadence background poller for one open device.
///
/// The loop holds the device lock only while reading one round of values;
/// `latest` copies the snapshot out under a short lock of its own. The
/// polling thread is joined before the poller (and thus its owning session)
/// is gone.
pub struct SensorPoller {
    snapshot: Arc<Mutex<Snapshot>>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Snapshot {
    names: Vec<String>,
    values: Vec<f64>,
}

impl SensorPoller {
    /// Start polling immediately. `names` is captured once here; a device
    /// that reports no sensors yields a poller with an empty snapshot.
    pub fn spawn<S: SensorSource + 'static>(source: Arc<Mutex<S>>, cadence: Duration) -> Self {
        let names = lock(&source).sensor_names();
        let snapshot = Arc::new(Mutex::new(Snapshot::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_snapshot = Arc::clone(&snapshot);
        let thread_stop = Arc::clone(&stop);
        let join = std::thread::spawn(move || {
            debug!(sensors = names.len(), "sensor poller started");
            while !thread_stop.load(Ordering::Relaxed) {
                let values: Vec<f64> = {
                    let source = lock(&source);
                    names
                        .iter()
                        .map(|name| {
                            if !source.sensor_supported(name) {
                                return INVALID_READING;
                            }
                            source.sensor_value(name).unwrap_or_else(|e| {
                                warn!(sensor = %name, error = %e, "sensor read failed");
                                INVALID_READING
                            })
                        })
                        .collect()
                };
                {
                    let mut snap = lock(&thread_snapshot);
                    snap.names.clone_from(&names);
                    snap.values = values;
                }

                let mut remaining = cadence;
                while !thread_stop.load(Ordering::Relaxed) && remaining > Duration::ZERO {
                    let tick = remaining.min(STOP_TICK);
                    std::thread::sleep(tick);
                    remaining -= tick;
                }
            }
            debug!("sensor poller stopped");
        });

        Self {
            snapshot,
            stop,
            join: Some(join),
        }
    }

    /// Most recent snapshot; empty until the first poll completes.
    pub fn latest(&self) -> (Vec<String>, Vec<f64>) {
        let snap = lock(&self.snapshot);
        (snap.names.clone(), snap.values.clone())
    }

    /// Signal the loop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("sensor poller thread panicked");
            }
        }
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use std::time::Instant;

    struct StubSource;

    impl SensorSource for StubSource {
        fn sensor_names(&self) -> Vec<String> {
            vec!["Sensor".into(), "Aux".into()]
        }

        fn sensor_supported(&self, name: &str) -> bool {
            name == "Sensor"
        }

        fn sensor_value(&self, name: &str) -> Result<f64> {
            match name {
                "Sensor" => Ok(36.6),
                other => Err(ViewerError::camera("sensor value", other.to_string())),
            }
        }
    }

    #[test]
    fn unsupported_sensors_get_the_sentinel() {
        let source = Arc::new(Mutex::new(StubSource));
        let mut poller = SensorPoller::spawn(source, Duration::from_secs(10));
        std::thread::sleep(Duration::from_millis(100));

        let (names, values) = poller.latest();
        assert_eq!(names, vec!["Sensor".to_string(), "Aux".to_string()]);
        assert_eq!(values[0], 36.6);
        assert_eq!(values[1], INVALID_READING);
        poller.stop();
    }

    #[test]
    fn stop_is_observed_well_before_the_cadence() {
        let source = Arc::new(Mutex::new(StubSource));
        let mut poller = SensorPoller::spawn(source, Duration::from_secs(30));
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        poller.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stop_twice_is_harmless() {
        let source = Arc::new(Mutex::new(StubSource));
        let mut poller = SensorPoller::spawn(source, Duration::from_secs(10));
        poller.stop();
        poller.stop();
    }

    struct EmptySource;

    impl SensorSource for EmptySource {
        fn sensor_names(&self) -> Vec<String> {
            Vec::new()
        }

        fn sensor_supported(&self, _name: &str) -> bool {
            false
        }

        fn sensor_value(&self, name: &str) -> Result<f64> {
            Err(ViewerError::camera("sensor value", name.to_string()))
        }
    }

    #[test]
    fn sensorless_device_yields_empty_snapshots() {
        let source = Arc::new(Mutex::new(EmptySource));
        let mut poller = SensorPoller::spawn(source, Duration::from_secs(10));
        std::thread::sleep(Duration::from_millis(50));
        let (names, values) = poller.latest();
        assert!(names.is_empty());
        assert!(values.is_empty());
        poller.stop();
    }
}
