//! Per-job processing lease
//!
//! A worker must hold the lease for a job id before running its
//! orchestrator, which guarantees at most one active run per job at any
//! time. The guard releases on drop, so a panicking worker task cannot
//! strand a lease.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct LeaseRegistry {
    held: Mutex<HashSet<Uuid>>,
}

impl LeaseRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to take the lease; `None` when another worker already holds it
    pub fn acquire(self: &Arc<Self>, id: Uuid) -> Option<LeaseGuard> {
        let mut held = self.held.lock().expect("lease registry poisoned");
        if !held.insert(id) {
            return None;
        }
        Some(LeaseGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    pub fn is_held(&self, id: Uuid) -> bool {
        self.held.lock().expect("lease registry poisoned").contains(&id)
    }
}

/// RAII lease token
pub struct LeaseGuard {
    registry: Arc<LeaseRegistry>,
    id: Uuid,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.registry
            .held
            .lock()
            .expect("lease registry poisoned")
            .remove(&self.id);
    }
}
