//! Identity-stable device registry
//!
//! Reconciles each fresh hardware enumeration against the live sessions.
//! Identities are derived from the vendor identifier string alone, so an open
//! window keeps referring to the same session while transient devices come
//! and go elsewhere in the enumeration.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::capture::camera::{CameraInfo, CameraSystem};
use crate::session::CameraSession;

/// Stable identity of a camera across enumeration passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(u32);

impl CameraId {
    /// Deterministic FNV-1a hash of the vendor identifier string.
    pub fn from_vendor_id(id: &str) -> Self {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in id.bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        Self(hash)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// The set of known devices and their sessions.
pub struct DeviceRegistry {
    system: Arc<dyn CameraSystem>,
    sessions: BTreeMap<CameraId, CameraSession>,
    infos: BTreeMap<CameraId, CameraInfo>,
}

impl DeviceRegistry {
    pub fn new(system: Arc<dyn CameraSystem>) -> Self {
        Self {
            system,
            sessions: BTreeMap::new(),
            infos: BTreeMap::new(),
        }
    }

    /// Reconcile a freshly enumerated device list.
    ///
    /// Duplicate identities within one pass are dropped, first occurrence
    /// wins. With no sessions yet, one session per discovered identity is
    /// created. Otherwise sessions absent from the pass are destroyed only
    /// when they are neither open nor displayed; a refresh never force-closes
    /// a session out from under the user.
    pub fn refresh(&mut self, live: Vec<CameraInfo>) {
        self.infos.clear();
        let mut seen = HashSet::new();
        for info in live {
            let id = CameraId::from_vendor_id(&info.id);
            if !seen.insert(id) {
                debug!(%id, vendor = %info.id, "duplicate identity in enumeration, skipped");
                continue;
            }
            self.infos.insert(id, info);
        }

        if self.sessions.is_empty() {
            for (id, info) in &self.infos {
                self.sessions.insert(
                    *id,
                    CameraSession::new(*id, info.clone(), Arc::clone(&self.system)),
                );
            }
            info!(devices = self.sessions.len(), "created sessions");
            return;
        }

        let stale: Vec<CameraId> = self
            .sessions
            .iter()
            .filter(|(id, session)| !self.infos.contains_key(id) && !session.in_use())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            info!(%id, "device gone, destroying session");
            self.sessions.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn session(&self, id: CameraId) -> Option<&CameraSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: CameraId) -> Option<&mut CameraSession> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &CameraSession> {
        self.sessions.values()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut CameraSession> {
        self.sessions.values_mut()
    }

    /// Record from the most recent enumeration pass, if the device was in it.
    pub fn info(&self, id: CameraId) -> Option<&CameraInfo> {
        self.infos.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sim::SimCameraSystem;
    use crate::CaptureConfig;

    fn info(id: &str, name: &str) -> CameraInfo {
        CameraInfo {
            id: id.into(),
            name: name.into(),
            model: "AX".into(),
            serial: "0".into(),
        }
    }

    fn registry() -> (DeviceRegistry, Vec<CameraInfo>) {
        let system = Arc::new(SimCameraSystem::new(3, CaptureConfig::default()));
        let live = system.enumerate().expect("enumerate");
        (DeviceRegistry::new(system), live)
    }

    #[test]
    fn identity_is_stable_and_content_derived() {
        let a = CameraId::from_vendor_id("SIM4-001000");
        let b = CameraId::from_vendor_id("SIM4-001000");
        let c = CameraId::from_vendor_id("SIM4-001001");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn first_refresh_creates_one_session_per_identity() {
        let (mut registry, live) = registry();
        registry.refresh(live);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_identities_first_occurrence_wins() {
        let (mut registry, _) = registry();
        registry.refresh(vec![info("CAM-A", "first"), info("CAM-A", "second")]);
        assert_eq!(registry.len(), 1);
        let id = CameraId::from_vendor_id("CAM-A");
        assert_eq!(registry.info(id).map(|i| i.name.as_str()), Some("first"));
    }

    #[test]
    fn absent_and_idle_sessions_are_destroyed() {
        let (mut registry, live) = registry();
        registry.refresh(live.clone());
        assert_eq!(registry.len(), 3);

        registry.refresh(live[..2].to_vec());
        assert_eq!(registry.len(), 2);
        let gone = CameraId::from_vendor_id(&live[2].id);
        assert!(registry.session(gone).is_none());
    }

    #[test]
    fn open_sessions_survive_disappearing_from_enumeration() {
        let (mut registry, live) = registry();
        registry.refresh(live.clone());

        let kept = CameraId::from_vendor_id(&live[2].id);
        registry
            .session_mut(kept)
            .expect("session")
            .open()
            .expect("open");

        registry.refresh(live[..2].to_vec());
        assert_eq!(registry.len(), 3, "open session must not be torn down");
        assert!(registry.session(kept).is_some());
    }

    #[test]
    fn displayed_sessions_survive_disappearing_from_enumeration() {
        let (mut registry, live) = registry();
        registry.refresh(live.clone());

        let kept = CameraId::from_vendor_id(&live[2].id);
        registry.session_mut(kept).expect("session").set_shown(true);

        registry.refresh(live[..2].to_vec());
        assert!(registry.session(kept).is_some());
    }

    #[test]
    fn refresh_does_not_recreate_existing_sessions() {
        let (mut registry, live) = registry();
        registry.refresh(live.clone());
        let id = CameraId::from_vendor_id(&live[0].id);
        registry.session_mut(id).expect("session").set_shown(true);

        registry.refresh(live);
        // the shown flag proves the session object was retained untouched
        assert!(registry.session(id).expect("session").is_shown());
    }
}
