//! Per-identity mutual exclusion for repository mutations.

use crate::identity::PackageIdentity;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async locks: one mutex per identity, created on demand.
///
/// Holding the guard for an identity serialises `add`, `yank` and `delete`
/// on that identity while leaving every other identity uncontended. Slots
/// nobody holds or waits on are dropped the next time any lock is taken.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    slots: Mutex<HashMap<PackageIdentity, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identity: &PackageIdentity) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(identity.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of identities with a live slot.
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
