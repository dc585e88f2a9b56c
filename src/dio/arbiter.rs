//! Exclusive ownership of the digital output lines

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, ViewerError};
use crate::session::registry::CameraId;

/// Maps each output bit to the one session allowed to drive it.
///
/// Mutated only from the display/UI context that services selection input,
/// so the table needs no internal locking. It is owned by the application
/// and passed down by reference, never ambient state.
#[derive(Debug, Default)]
pub struct OutputLineArbiter {
    owners: HashMap<u8, CameraId>,
}

impl OutputLineArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to associate `bit` with `session`.
    ///
    /// A bit held by another session rejects the claim, and the requester
    /// still loses whatever bit it held before: a rejected selection leaves
    /// the session unassigned, not on its old line. Claiming a new bit (or
    /// re-claiming the same one) releases the previous assignment first, so
    /// a session never holds more than one line.
    pub fn claim(&mut self, session: CameraId, bit: u8) -> Result<()> {
        if let Some(&owner) = self.owners.get(&bit) {
            if owner != session {
                self.release(session);
                return Err(ViewerError::BitConflict { bit, owner });
            }
        }
        self.release(session);
        self.owners.insert(bit, session);
        debug!(%session, bit, "output line claimed");
        Ok(())
    }

    /// Drop any assignment held by `session`. Idempotent.
    pub fn release(&mut self, session: CameraId) {
        self.owners.retain(|_, owner| *owner != session);
    }

    pub fn owner_of(&self, bit: u8) -> Option<CameraId> {
        self.owners.get(&bit).copied()
    }

    pub fn assignment(&self, session: CameraId) -> Option<u8> {
        self.owners
            .iter()
            .find(|(_, owner)| **owner == session)
            .map(|(bit, _)| *bit)
    }

    /// Current (bit, owner) table, sorted by bit for display.
    pub fn table(&self) -> Vec<(u8, CameraId)> {
        let mut entries: Vec<_> = self.owners.iter().map(|(b, o)| (*b, *o)).collect();
        entries.sort_by_key(|(bit, _)| *bit);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: &str) -> CameraId {
        CameraId::from_vendor_id(tag)
    }

    #[test]
    fn conflicting_claim_is_rejected_and_owner_kept() {
        let mut arbiter = OutputLineArbiter::new();
        let (a, b) = (id("cam-a"), id("cam-b"));

        arbiter.claim(a, 3).expect("first claim");
        let err = arbiter.claim(b, 3).expect_err("conflict");
        assert!(matches!(err, ViewerError::BitConflict { bit: 3, owner } if owner == a));
        assert_eq!(arbiter.owner_of(3), Some(a));
        assert_eq!(arbiter.assignment(b), None);
    }

    #[test]
    fn rejected_claim_still_releases_the_old_assignment() {
        let mut arbiter = OutputLineArbiter::new();
        let (a, b) = (id("cam-a"), id("cam-b"));

        arbiter.claim(a, 3).expect("claim");
        arbiter.claim(b, 5).expect("claim");
        assert!(arbiter.claim(b, 3).is_err());
        // b lost bit 5 and gained nothing
        assert_eq!(arbiter.assignment(b), None);
        assert_eq!(arbiter.owner_of(5), None);
    }

    #[test]
    fn moving_to_a_new_bit_releases_the_previous_one() {
        let mut arbiter = OutputLineArbiter::new();
        let a = id("cam-a");

        arbiter.claim(a, 3).expect("claim");
        arbiter.claim(a, 5).expect("move");
        assert_eq!(arbiter.owner_of(3), None);
        assert_eq!(arbiter.owner_of(5), Some(a));
        assert_eq!(arbiter.assignment(a), Some(5));
    }

    #[test]
    fn reclaiming_the_same_bit_is_a_no_op() {
        let mut arbiter = OutputLineArbiter::new();
        let a = id("cam-a");
        arbiter.claim(a, 2).expect("claim");
        arbiter.claim(a, 2).expect("re-claim");
        assert_eq!(arbiter.table(), vec![(2, a)]);
    }

    #[test]
    fn release_is_idempotent() {
        let mut arbiter = OutputLineArbiter::new();
        let a = id("cam-a");
        arbiter.claim(a, 1).expect("claim");
        arbiter.release(a);
        arbiter.release(a);
        assert!(arbiter.table().is_empty());
    }

    #[test]
    fn table_is_sorted_by_bit() {
        let mut arbiter = OutputLineArbiter::new();
        arbiter.claim(id("cam-a"), 6).expect("claim");
        arbiter.claim(id("cam-b"), 1).expect("claim");
        let bits: Vec<u8> = arbiter.table().iter().map(|(b, _)| *b).collect();
        assert_eq!(bits, vec![1, 6]);
    }
}
