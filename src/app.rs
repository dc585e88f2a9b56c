//! Top-level viewer state
//!
//! Owns the registry, the output-line arbiter and the DIO device, and runs
//! entirely on the display/UI context. The arbiter and session collection are
//! mutated here and nowhere else, which is what lets them go lockless.

use std::sync::Arc;

use tracing::warn;

use crate::capture::camera::CameraSystem;
use crate::dio::{DigitalOutput, OutputLineArbiter};
use crate::error::ViewerError;
use crate::session::{CameraId, DeviceRegistry};

pub struct ViewerApp {
    system: Arc<dyn CameraSystem>,
    registry: DeviceRegistry,
    arbiter: OutputLineArbiter,
    dio: Option<Box<dyn DigitalOutput>>,
    /// When set, enumeration queries just this camera (command-line filter).
    filter_id: Option<String>,
    error_line: String,
}

impl ViewerApp {
    pub fn new(
        system: Arc<dyn CameraSystem>,
        dio: Option<Box<dyn DigitalOutput>>,
        filter_id: Option<String>,
    ) -> Self {
        let registry = DeviceRegistry::new(Arc::clone(&system));
        Self {
            system,
            registry,
            arbiter: OutputLineArbiter::new(),
            dio,
            filter_id,
            error_line: String::new(),
        }
    }

    /// Re-enumerate and reconcile the device list.
    pub fn refresh(&mut self) {
        let live = match &self.filter_id {
            Some(id) => match self.system.query(id) {
                Ok(info) => vec![info],
                Err(e) => {
                    self.error_line = format!("Could not get camera info for {id}: {e}");
                    return;
                }
            },
            None => match self.system.enumerate() {
                Ok(list) => list,
                Err(e) => {
                    warn!("enumeration failed: {e}");
                    return;
                }
            },
        };
        self.registry.refresh(live);
    }

    /// Show a device's window, opening the device on first show.
    pub fn open_window(&mut self, id: CameraId) {
        let Some(session) = self.registry.session_mut(id) else {
            return;
        };
        session.set_shown(true);
        if session.open().is_err() {
            self.copy_session_error(id);
        }
    }

    /// Hide the window and close the device behind it.
    pub fn close_window(&mut self, id: CameraId) {
        let Some(session) = self.registry.session_mut(id) else {
            return;
        };
        session.set_shown(false);
        if session
            .close(self.dio.as_deref_mut(), &mut self.arbiter)
            .is_err()
        {
            self.copy_session_error(id);
        }
    }

    pub fn start_capture(&mut self, id: CameraId) {
        let Some(session) = self.registry.session_mut(id) else {
            return;
        };
        if session.start_capture(self.dio.as_deref_mut()).is_err() {
            self.copy_session_error(id);
        }
    }

    pub fn stop_capture(&mut self, id: CameraId) {
        let Some(session) = self.registry.session_mut(id) else {
            return;
        };
        if session
            .stop_capture(self.dio.as_deref_mut(), &mut self.arbiter)
            .is_err()
        {
            self.copy_session_error(id);
        }
    }

    /// Close and reopen in one compound transition.
    pub fn reset_session(&mut self, id: CameraId) {
        let Some(session) = self.registry.session_mut(id) else {
            return;
        };
        if session
            .reset(self.dio.as_deref_mut(), &mut self.arbiter)
            .is_err()
        {
            self.copy_session_error(id);
        }
    }

    pub fn start_all(&mut self) {
        for id in self.shown_ids() {
            self.start_capture(id);
        }
    }

    pub fn stop_all(&mut self) {
        for id in self.shown_ids() {
            self.stop_capture(id);
        }
    }

    /// Change a session's output-line selection. `None` clears it. Ignored
    /// while the session is capturing (its line is live). A rejected claim
    /// leaves the session unassigned and reports the conflict.
    pub fn select_bit(&mut self, id: CameraId, selection: Option<u8>) {
        let has_dio = self.dio.is_some();
        let Some(session) = self.registry.session_mut(id) else {
            return;
        };
        if session.is_capturing() {
            return;
        }
        // without DIO hardware every selection collapses to none
        let selection = if has_dio { selection } else { None };
        match selection {
            None => {
                self.arbiter.release(id);
                session.set_output_bit(None);
            }
            Some(bit) => match self.arbiter.claim(id, bit) {
                Ok(()) => session.set_output_bit(Some(bit)),
                Err(e) => {
                    session.set_output_bit(None);
                    let owner_title = match &e {
                        ViewerError::BitConflict { owner, .. } => self
                            .registry
                            .session(*owner)
                            .map(|s| s.title().to_string())
                            .unwrap_or_else(|| owner.to_string()),
                        _ => String::new(),
                    };
                    self.error_line = format!("{e} ({owner_title})");
                }
            },
        }
    }

    fn shown_ids(&self) -> Vec<CameraId> {
        self.registry
            .sessions()
            .filter(|s| s.is_shown())
            .map(|s| s.id())
            .collect()
    }

    fn copy_session_error(&mut self, id: CameraId) {
        if let Some(session) = self.registry.session(id) {
            if let Some(err) = session.error() {
                self.error_line = format!("Device {}: {err}", session.title());
            }
        }
    }

    /// Snapshot of the DIO port, when the hardware is present.
    pub fn debug_port(&mut self) -> Option<u8> {
        let dio = self.dio.as_deref_mut()?;
        match dio.read_port() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("port readback failed: {e}");
                None
            }
        }
    }

    pub fn has_dio(&self) -> bool {
        self.dio.is_some()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn arbiter(&self) -> &OutputLineArbiter {
        &self.arbiter
    }

    pub fn error_line(&self) -> &str {
        &self.error_line
    }

    pub fn clear_error(&mut self) {
        self.error_line.clear();
    }
}
